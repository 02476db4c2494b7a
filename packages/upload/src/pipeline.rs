//! The per-file upload sequence and the batch driver around it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use field_sync_mapping::{
    MappingError, MappingPrompt, MappingSource, SampleLimits, apply_mapping, resolve_mapping,
};
use field_sync_match::{CandidateFingerprint, MatchThresholds, find_match};
use field_sync_models::{
    CacheEntry, DatasetFingerprint, FieldMapping, MatchReason, StoredMapping, UploadEvent,
};
use field_sync_remote::{
    BoundaryApi, ChunkPolicy, IngestTarget, ProgressCallback, ingest_chunked, null_progress,
};
use field_sync_session::{Reconciler, Session};
use field_sync_store::CacheStore;
use field_sync_vector::parse_path;
use uuid::Uuid;

use crate::UploadError;
use crate::sink::{LayerSink, null_sink};

/// What became of one successfully processed file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    /// The dataset name the upload landed under.
    pub name: String,
    /// How the upload matched an existing dataset, when it did.
    pub matched: Option<MatchReason>,
    /// Whether the mapped collection reached the remote hierarchy.
    pub cloud_stored: bool,
    /// Features dropped by the mapping for missing required values.
    pub dropped: u64,
    /// Features delivered to the sink.
    pub feature_count: usize,
}

/// Aggregate result of a multi-file upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Files attempted (a cancelled mapping leaves the rest unattempted).
    pub processed: usize,
    /// Files that made it through the whole sequence.
    pub succeeded: usize,
    /// Files whose features reached the remote hierarchy.
    pub cloud_stored: usize,
    /// Features dropped by mapping across the batch.
    pub dropped_features: u64,
    /// Per-file failures as `(filename, reason)`, in input order.
    pub failures: Vec<(String, String)>,
}

/// Drives uploads over injected capabilities.
///
/// The uploader owns no state of its own; everything session-scoped lives
/// on the [`Session`] passed to each call, and everything durable behind
/// the store and the remote API.
pub struct Uploader<'a> {
    store: &'a CacheStore,
    api: &'a dyn BoundaryApi,
    prompt: &'a dyn MappingPrompt,
    policy: ChunkPolicy,
    thresholds: MatchThresholds,
    limits: SampleLimits,
    replace_missing: bool,
    sink: Arc<dyn LayerSink>,
    progress: Arc<dyn ProgressCallback>,
}

impl<'a> Uploader<'a> {
    /// Creates an uploader with default thresholds, limits, and chunking,
    /// a null sink, and no progress reporting.
    #[must_use]
    pub fn new(
        store: &'a CacheStore,
        api: &'a dyn BoundaryApi,
        prompt: &'a dyn MappingPrompt,
    ) -> Self {
        Self {
            store,
            api,
            prompt,
            policy: ChunkPolicy::default(),
            thresholds: MatchThresholds::default(),
            limits: SampleLimits::default(),
            replace_missing: false,
            sink: null_sink(),
            progress: null_progress(),
        }
    }

    /// Replaces the chunking bounds used for remote ingestion.
    #[must_use]
    pub const fn with_policy(mut self, policy: ChunkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the match thresholds.
    #[must_use]
    pub const fn with_thresholds(mut self, thresholds: MatchThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Replaces the property-sampling limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: SampleLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the sink that receives mapped collections.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LayerSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Asks the remote to remove hierarchy rows absent from the payload.
    /// Only honored when the payload fits in a single remote call.
    #[must_use]
    pub const fn with_replace_missing(mut self, replace_missing: bool) -> Self {
        self.replace_missing = replace_missing;
        self
    }

    /// Replaces the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs one file through the full upload sequence.
    ///
    /// # Errors
    ///
    /// [`UploadError::Parse`] when the file cannot be read or understood,
    /// [`UploadError::EmptyResult`] when nothing usable survives parsing or
    /// mapping, and [`UploadError::Mapping`] when mapping resolution fails
    /// or is declined. Remote and cache failures during persistence are
    /// logged and reflected in the outcome, not returned.
    pub async fn process_file(
        &self,
        session: &mut Session,
        path: &Path,
    ) -> Result<FileOutcome, UploadError> {
        self.process_file_inner(session, path, &BTreeSet::new()).await
    }

    /// Runs every file in order, recording failures instead of stopping,
    /// except for a cancelled mapping which leaves the remaining files
    /// unattempted. The end-of-batch summary is always logged.
    pub async fn process_batch(&self, session: &mut Session, paths: &[PathBuf]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let mut taken: BTreeSet<String> = BTreeSet::new();

        for path in paths {
            let filename = display_name(path);
            summary.processed += 1;

            match self.process_file_inner(session, path, &taken).await {
                Ok(outcome) => {
                    log::info!(
                        "Uploaded {filename} as \"{}\" ({} feature(s))",
                        outcome.name,
                        outcome.feature_count
                    );
                    summary.succeeded += 1;
                    summary.cloud_stored += usize::from(outcome.cloud_stored);
                    summary.dropped_features += outcome.dropped;
                    taken.insert(outcome.name);
                }
                Err(e @ UploadError::Mapping(MappingError::Cancelled)) => {
                    log::info!("Mapping cancelled at {filename}; skipping the remaining files");
                    summary.failures.push((filename, e.to_string()));
                    break;
                }
                Err(e) => {
                    log::error!("{filename} failed: {e}");
                    summary.failures.push((filename, e.to_string()));
                }
            }
        }

        log::info!(
            "Batch finished: {}/{} file(s) succeeded, {} cloud-stored, {} feature(s) dropped",
            summary.succeeded,
            summary.processed,
            summary.cloud_stored,
            summary.dropped_features
        );
        summary
    }

    async fn process_file_inner(
        &self,
        session: &mut Session,
        path: &Path,
        extra_taken: &BTreeSet<String>,
    ) -> Result<FileOutcome, UploadError> {
        let filename = display_name(path);
        self.progress.set_message(format!("Uploading {filename}"));

        let collection = parse_path(path).await?;
        if collection.features.is_empty() {
            return Err(UploadError::EmptyResult { filename });
        }

        let fingerprints = self.reconciler().fingerprints(session).await;
        let stem = file_stem(path);
        let candidate = CandidateFingerprint::from_collection(&stem, &collection);
        let matched = find_match(&candidate, &fingerprints, &self.thresholds);
        let name = matched.as_ref().map_or_else(
            || allocate_name(&stem, &fingerprints, extra_taken),
            |hit| hit.dataset_name.clone(),
        );

        let remembered = self.remembered_mapping(session).await;
        let resolved =
            resolve_mapping(&collection, remembered.as_ref(), self.prompt, &self.limits).await?;
        if resolved.source == MappingSource::Prompted {
            session.remember_mapping(resolved.mapping.clone());
            if resolved.remember {
                let record = StoredMapping {
                    mapping: resolved.mapping.clone(),
                    remember: true,
                };
                if let Err(e) = self.store.save_mapping(&record).await {
                    log::warn!("Could not persist the confirmed mapping: {e}");
                }
            }
        }

        let mapped = apply_mapping(collection, &resolved.mapping);
        if mapped.collection.features.is_empty() {
            return Err(UploadError::EmptyResult { filename });
        }
        if mapped.dropped > 0 {
            log::warn!(
                "{} feature(s) in {filename} lacked required attributes and were dropped",
                mapped.dropped
            );
        }

        let feature_count = mapped.collection.features.len();
        let event = UploadEvent {
            name: name.clone(),
            geojson: mapped.collection,
            source_filename: filename,
            matched_dataset_id: matched.as_ref().map(|hit| hit.dataset_id.clone()),
            match_reason: matched.as_ref().map(|hit| hit.reason),
        };
        self.sink.layer_ready(&event);
        session.record_open_layer(&name);

        let cloud_stored = self.persist(session, &event).await;

        Ok(FileOutcome {
            name,
            matched: event.match_reason,
            cloud_stored,
            dropped: mapped.dropped,
            feature_count,
        })
    }

    /// Persists a rendered upload. Failures here never undo the render;
    /// they log and show up as `cloud_stored = false`.
    async fn persist(&self, session: &mut Session, event: &UploadEvent) -> bool {
        if let Some(owner_id) = session.owner_id().map(ToString::to_string) {
            let target = IngestTarget::Hierarchy {
                owner_id,
                replace_missing: self.replace_missing,
            };
            match ingest_chunked(self.api, &target, &event.geojson, self.policy, &self.progress)
                .await
            {
                Ok(count) => {
                    log::info!("Ingested {count} row(s) from \"{}\"", event.name);
                    session.invalidate_fingerprints();
                    if let Err(e) = self.reconciler().refresh(session).await {
                        log::warn!("Ingest succeeded but the snapshot refresh failed: {e}");
                    }
                    true
                }
                Err(e) => {
                    log::warn!("\"{}\" is rendered locally but not cloud-stored: {e}", event.name);
                    if e.inserted > 0 {
                        session.invalidate_fingerprints();
                    }
                    false
                }
            }
        } else {
            let entry = CacheEntry {
                id: event
                    .matched_dataset_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                name: event.name.clone(),
                geojson: event.geojson.clone(),
                updated_at: Utc::now(),
                feature_count: event.geojson.features.len(),
            };
            match self.store.put_anonymous(&entry).await {
                Ok(()) => session.invalidate_fingerprints(),
                Err(e) => log::warn!("Could not save \"{}\" to the local cache: {e}", event.name),
            }
            false
        }
    }

    /// The mapping to try before prompting: session memory first, then the
    /// persisted record. Store failures degrade to no memory.
    async fn remembered_mapping(&self, session: &Session) -> Option<FieldMapping> {
        if let Some(mapping) = session.remembered_mapping() {
            return Some(mapping.clone());
        }
        match self.store.load_mapping().await {
            Ok(stored) => stored.map(|record| record.mapping),
            Err(e) => {
                log::warn!("Could not read the stored mapping: {e}");
                None
            }
        }
    }

    fn reconciler(&self) -> Reconciler<'a> {
        Reconciler::new(self.store, self.api, self.policy)
    }
}

/// First dataset name derived from `stem` that collides with neither the
/// known datasets nor the names already taken by this batch.
fn allocate_name(
    stem: &str,
    existing: &[DatasetFingerprint],
    extra_taken: &BTreeSet<String>,
) -> String {
    let taken: BTreeSet<&str> = existing
        .iter()
        .map(|fingerprint| fingerprint.name.as_str())
        .chain(extra_taken.iter().map(String::as_str))
        .collect();

    if !taken.contains(stem) {
        return stem.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n})");
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map_or_else(
        || "upload".to_string(),
        |stem| stem.to_string_lossy().into_owned(),
    )
}
