//! Login, logout, and refresh transitions between the local cache scopes
//! and the remote hierarchy.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use field_sync_models::{
    CacheEntry, DatasetFingerprint, DatasetListing, FarmRow, FieldRow, GrowerRow,
    HierarchySnapshot, Provenance, canonical,
};
use field_sync_remote::{
    BoundaryApi, ChunkPolicy, IngestTarget, ProgressCallback, ingest_chunked, null_progress,
};
use field_sync_store::CacheStore;
use geojson::{Feature, FeatureCollection, JsonValue};

use crate::{LoginReport, Session, SessionError};

/// Coordinates the local cache scopes with the remote hierarchy across the
/// session lifecycle.
pub struct Reconciler<'a> {
    store: &'a CacheStore,
    api: &'a dyn BoundaryApi,
    policy: ChunkPolicy,
    progress: Arc<dyn ProgressCallback>,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler over the given store and remote API.
    #[must_use]
    pub fn new(store: &'a CacheStore, api: &'a dyn BoundaryApi, policy: ChunkPolicy) -> Self {
        Self {
            store,
            api,
            policy,
            progress: null_progress(),
        }
    }

    /// Replaces the progress sink used for migration ingests.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Signs the session in as `owner_id`.
    ///
    /// Every anonymous entry is migrated through the chunked
    /// hierarchy-ingest path and removed locally only after the ingest
    /// succeeds. A failure on one entry logs and continues with the rest;
    /// failed entries stay local for a later login. The cloud snapshot is
    /// then refreshed, leniently: a refresh failure leaves the session
    /// signed in and is recovered by the read path's cache fallback.
    pub async fn login(&self, session: &mut Session, owner_id: &str) -> LoginReport {
        let mut report = LoginReport::default();

        let pending = match self.store.list_anonymous().await {
            Ok(pending) => pending,
            Err(e) => {
                log::warn!("Could not read the anonymous cache; skipping migration: {e}");
                Vec::new()
            }
        };

        let target = IngestTarget::Hierarchy {
            owner_id: owner_id.to_string(),
            replace_missing: false,
        };
        for entry in pending {
            match ingest_chunked(
                self.api,
                &target,
                &entry.geojson,
                self.policy,
                &self.progress,
            )
            .await
            {
                Ok(count) => {
                    log::info!("Migrated dataset \"{}\" ({count} rows)", entry.name);
                    if let Err(e) = self.store.remove_anonymous(&entry.name).await {
                        log::warn!(
                            "Migrated \"{}\" but could not remove the local copy: {e}",
                            entry.name
                        );
                        report.failed += 1;
                    } else {
                        report.migrated += 1;
                    }
                }
                Err(e) => {
                    log::warn!("Could not migrate dataset \"{}\": {e}", entry.name);
                    report.failed += 1;
                }
            }
        }

        session.set_authenticated(owner_id);

        if let Err(e) = self.refresh(session).await {
            log::warn!("Signed in, but the first snapshot refresh failed: {e}");
        }

        report
    }

    /// Fetches the remote hierarchy, reconstructs dataset groupings, and
    /// replaces the owner's cloud snapshot wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] for anonymous sessions,
    /// or the remote/store failure that prevented the refresh. On failure
    /// the previous snapshot is left untouched.
    pub async fn refresh(&self, session: &mut Session) -> Result<Vec<CacheEntry>, SessionError> {
        let owner_id = session
            .owner_id()
            .ok_or(SessionError::NotAuthenticated)?
            .to_string();

        let snapshot = self.api.fetch_hierarchy(&owner_id).await?;
        let entries = reconstruct_datasets(&snapshot);
        self.store.replace_cloud_snapshot(&owner_id, &entries).await?;
        session.invalidate_fingerprints();

        log::info!(
            "Refreshed cloud snapshot for owner {owner_id} ({} datasets)",
            entries.len()
        );
        Ok(entries)
    }

    /// Signs the session out: clears the owner's cloud snapshot and every
    /// session cache. Open-layer references are dropped here; un-rendering
    /// them is the display layer's concern.
    pub async fn logout(&self, session: &mut Session) {
        if let Some(owner_id) = session.owner_id().map(ToString::to_string) {
            if let Err(e) = self.store.clear_cloud_snapshot(&owner_id).await {
                log::warn!("Could not clear the cloud snapshot for {owner_id}: {e}");
            }
        }
        session.set_anonymous();
    }

    /// Lists datasets with a provenance label.
    ///
    /// Authenticated sessions prefer a live fetch and fall back to the
    /// last cloud snapshot when the remote is unreachable; anonymous
    /// sessions read the local scope only. Store failures degrade to an
    /// empty listing rather than erroring.
    pub async fn datasets(&self, session: &mut Session) -> DatasetListing {
        if session.is_authenticated() {
            match self.refresh(session).await {
                Ok(datasets) => DatasetListing {
                    datasets,
                    provenance: Provenance::Cloud,
                },
                Err(e) => {
                    log::warn!("Live dataset fetch failed; trying the cached snapshot: {e}");
                    self.cached_datasets(session).await
                }
            }
        } else {
            match self.store.list_anonymous().await {
                Ok(datasets) => DatasetListing {
                    datasets,
                    provenance: Provenance::Local,
                },
                Err(e) => {
                    log::warn!("Could not read the anonymous cache: {e}");
                    DatasetListing {
                        datasets: Vec::new(),
                        provenance: Provenance::Error,
                    }
                }
            }
        }
    }

    async fn cached_datasets(&self, session: &Session) -> DatasetListing {
        let Some(owner_id) = session.owner_id() else {
            return DatasetListing {
                datasets: Vec::new(),
                provenance: Provenance::Error,
            };
        };

        match self.store.list_cloud(owner_id).await {
            Ok(datasets) => DatasetListing {
                datasets,
                provenance: Provenance::Cache,
            },
            Err(e) => {
                log::warn!("Could not read the cloud snapshot cache: {e}");
                DatasetListing {
                    datasets: Vec::new(),
                    provenance: Provenance::Error,
                }
            }
        }
    }

    /// Fingerprints of the listable datasets, cached on the session until
    /// the next invalidation.
    pub async fn fingerprints(&self, session: &mut Session) -> Vec<DatasetFingerprint> {
        if let Some(cached) = session.fingerprints() {
            return cached.to_vec();
        }

        let listing = self.datasets(session).await;
        let fingerprints: Vec<DatasetFingerprint> = listing
            .datasets
            .iter()
            .map(|entry| DatasetFingerprint {
                id: entry.id.clone(),
                name: entry.name.clone(),
                signature: field_sync_match::signature(&entry.geojson),
                feature_count: entry.feature_count,
            })
            .collect();
        session.set_fingerprints(fingerprints.clone());
        fingerprints
    }
}

/// Reconstructs displayable datasets from hierarchy rows.
///
/// Fields group by their farm's grower id, falling back to the farm id for
/// farms without a grower, and each group materializes as a `CacheEntry`
/// whose features carry the canonical names plus the stored per-field
/// properties. The result is derived state; the rows stay authoritative.
#[must_use]
pub fn reconstruct_datasets(snapshot: &HierarchySnapshot) -> Vec<CacheEntry> {
    let growers: BTreeMap<&str, &GrowerRow> = snapshot
        .growers
        .iter()
        .map(|grower| (grower.id.as_str(), grower))
        .collect();
    let farms: BTreeMap<&str, &FarmRow> = snapshot
        .farms
        .iter()
        .map(|farm| (farm.id.as_str(), farm))
        .collect();

    let mut groups: BTreeMap<String, Vec<(&FarmRow, &FieldRow)>> = BTreeMap::new();
    for field in &snapshot.fields {
        let Some(farm) = farms.get(field.farm_id.as_str()) else {
            log::debug!(
                "field {} references unknown farm {}; skipping",
                field.id,
                field.farm_id
            );
            continue;
        };
        let key = farm
            .grower_id
            .clone()
            .unwrap_or_else(|| farm.id.clone());
        groups.entry(key).or_default().push((*farm, field));
    }

    groups
        .into_iter()
        .map(|(id, members)| {
            let name = growers
                .get(id.as_str())
                .map(|grower| grower.name.clone())
                .or_else(|| farms.get(id.as_str()).map(|farm| farm.name.clone()))
                .unwrap_or_else(|| id.clone());

            let features: Vec<Feature> = members
                .iter()
                .map(|(farm, field)| field_feature(&growers, farm, field))
                .collect();
            let feature_count = features.len();

            let updated_at = members
                .iter()
                .map(|(_, field)| field.updated_at)
                .max()
                .unwrap_or_else(Utc::now);

            CacheEntry {
                id,
                name,
                geojson: FeatureCollection {
                    bbox: None,
                    features,
                    foreign_members: None,
                },
                updated_at,
                feature_count,
            }
        })
        .collect()
}

/// Materializes one field row as a display feature.
fn field_feature(
    growers: &BTreeMap<&str, &GrowerRow>,
    farm: &FarmRow,
    field: &FieldRow,
) -> Feature {
    let mut properties = field.properties.clone().unwrap_or_default();

    let grower_name = farm
        .grower_id
        .as_deref()
        .and_then(|id| growers.get(id))
        .map_or_else(|| farm.name.clone(), |grower| grower.name.clone());

    properties.insert(
        canonical::GROWER_NAME.to_string(),
        JsonValue::String(grower_name),
    );
    properties.insert(
        canonical::FARM_NAME.to_string(),
        JsonValue::String(farm.name.clone()),
    );
    properties.insert(
        canonical::FIELD_NAME.to_string(),
        JsonValue::String(field.name.clone()),
    );
    if let Some(area) = field.area.and_then(number) {
        properties.insert("area".to_string(), area);
    }
    if let Some(perimeter) = field.perimeter.and_then(number) {
        properties.insert("perimeter".to_string(), perimeter);
    }

    Feature {
        bbox: None,
        geometry: Some(field.boundary.clone()),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn number(value: f64) -> Option<JsonValue> {
    serde_json::Number::from_f64(value).map(JsonValue::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use field_sync_models::IngestSummary;
    use field_sync_remote::RemoteError;
    use geojson::{Geometry, Value};
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn temp_store(name: &str) -> (CacheStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("field_sync_session_{name}"));
        let _ = fs::remove_dir_all(&root);
        (CacheStore::new(&root), root)
    }

    fn point() -> Geometry {
        Geometry::new(Value::Point(vec![0.0, 0.0]))
    }

    fn grower(id: &str, name: &str) -> GrowerRow {
        GrowerRow {
            id: id.to_string(),
            name: name.to_string(),
            mnet: false,
        }
    }

    fn farm(id: &str, name: &str, grower_id: Option<&str>) -> FarmRow {
        FarmRow {
            id: id.to_string(),
            name: name.to_string(),
            grower_id: grower_id.map(ToString::to_string),
        }
    }

    fn field_row(id: &str, farm_id: &str, name: &str, day: u32) -> FieldRow {
        FieldRow {
            id: id.to_string(),
            farm_id: farm_id.to_string(),
            name: name.to_string(),
            boundary: point(),
            area: Some(12.5),
            perimeter: None,
            properties: Some(
                serde_json::from_value(json!({ "soil": "loam" })).expect("object"),
            ),
            updated_at: Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).single().expect("valid date"),
        }
    }

    fn anonymous_entry(name: &str, features: usize) -> CacheEntry {
        CacheEntry {
            id: format!("local-{name}"),
            name: name.to_string(),
            geojson: FeatureCollection {
                bbox: None,
                features: (0..features)
                    .map(|i| Feature {
                        bbox: None,
                        geometry: Some(point()),
                        id: None,
                        properties: serde_json::from_value(json!({
                            "grower_name": "Acme",
                            "farm_name": "North",
                            "field_name": format!("A{i}"),
                        }))
                        .ok(),
                        foreign_members: None,
                    })
                    .collect(),
                foreign_members: None,
            },
            updated_at: Utc::now(),
            feature_count: features,
        }
    }

    /// Scripted remote with switchable failure modes.
    struct ScriptedApi {
        snapshot: HierarchySnapshot,
        fail_fetch: bool,
        fail_ingest: bool,
        hierarchy_calls: Mutex<Vec<(String, usize, bool)>>,
        fetches: Mutex<usize>,
    }

    impl ScriptedApi {
        fn new(snapshot: HierarchySnapshot) -> Self {
            Self {
                snapshot,
                fail_fetch: false,
                fail_ingest: false,
                hierarchy_calls: Mutex::new(Vec::new()),
                fetches: Mutex::new(0),
            }
        }

        fn failure() -> RemoteError {
            RemoteError::Api {
                status: 500,
                code: None,
                message: "server exploded".to_string(),
            }
        }
    }

    #[async_trait]
    impl BoundaryApi for ScriptedApi {
        async fn ingest_hierarchy(
            &self,
            payload: &FeatureCollection,
            owner_id: &str,
            replace_missing: bool,
        ) -> Result<IngestSummary, RemoteError> {
            if self.fail_ingest {
                return Err(Self::failure());
            }
            self.hierarchy_calls.lock().unwrap().push((
                owner_id.to_string(),
                payload.features.len(),
                replace_missing,
            ));
            Ok(IngestSummary {
                fields_inserted: payload.features.len() as u64,
                ..IngestSummary::default()
            })
        }

        async fn ingest_dataset(
            &self,
            _dataset_id: &str,
            _layer_id: &str,
            _payload: &FeatureCollection,
        ) -> Result<u64, RemoteError> {
            unreachable!("dataset ingest not exercised")
        }

        async fn fetch_hierarchy(&self, _owner_id: &str) -> Result<HierarchySnapshot, RemoteError> {
            if self.fail_fetch {
                return Err(Self::failure());
            }
            *self.fetches.lock().unwrap() += 1;
            Ok(self.snapshot.clone())
        }
    }

    fn two_grower_snapshot() -> HierarchySnapshot {
        HierarchySnapshot {
            growers: vec![grower("g1", "Acme"), grower("g2", "Beta")],
            farms: vec![farm("f1", "North", Some("g1")), farm("f2", "South", Some("g2"))],
            fields: vec![
                field_row("p1", "f1", "A1", 1),
                field_row("p2", "f1", "A2", 3),
                field_row("p3", "f2", "B1", 2),
            ],
        }
    }

    #[test]
    fn reconstruction_groups_fields_by_grower() {
        let datasets = reconstruct_datasets(&two_grower_snapshot());

        assert_eq!(datasets.len(), 2);
        let acme = datasets.iter().find(|d| d.name == "Acme").unwrap();
        assert_eq!(acme.id, "g1");
        assert_eq!(acme.feature_count, 2);

        let props = acme.geojson.features[0].properties.as_ref().unwrap();
        assert_eq!(props["grower_name"], json!("Acme"));
        assert_eq!(props["farm_name"], json!("North"));
        assert_eq!(props["field_name"], json!("A1"));
        assert_eq!(props["soil"], json!("loam"));
        assert_eq!(props["area"], json!(12.5));
    }

    #[test]
    fn farms_without_growers_anchor_their_own_dataset() {
        let snapshot = HierarchySnapshot {
            growers: vec![],
            farms: vec![farm("f9", "Standalone", None)],
            fields: vec![field_row("p1", "f9", "Z1", 1)],
        };
        let datasets = reconstruct_datasets(&snapshot);

        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].id, "f9");
        assert_eq!(datasets[0].name, "Standalone");
        let props = datasets[0].geojson.features[0].properties.as_ref().unwrap();
        assert_eq!(props["grower_name"], json!("Standalone"));
    }

    #[test]
    fn fields_with_unknown_farms_are_skipped() {
        let snapshot = HierarchySnapshot {
            growers: vec![grower("g1", "Acme")],
            farms: vec![farm("f1", "North", Some("g1"))],
            fields: vec![field_row("p1", "f1", "A1", 1), field_row("p2", "gone", "X", 1)],
        };
        let datasets = reconstruct_datasets(&snapshot);

        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].feature_count, 1);
    }

    #[test]
    fn dataset_updated_at_is_the_newest_member_field() {
        let datasets = reconstruct_datasets(&two_grower_snapshot());
        let acme = datasets.iter().find(|d| d.name == "Acme").unwrap();
        assert_eq!(
            acme.updated_at,
            Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).single().unwrap()
        );
    }

    #[tokio::test]
    async fn login_migrates_anonymous_entries_and_removes_them_locally() {
        let (store, root) = temp_store("login_migrates");
        store.put_anonymous(&anonymous_entry("Smith Farm", 3)).await.unwrap();

        let api = ScriptedApi::new(HierarchySnapshot::default());
        let reconciler = Reconciler::new(&store, &api, ChunkPolicy::default());
        let mut session = Session::new();

        let report = reconciler.login(&mut session, "owner-1").await;

        assert_eq!(report.migrated, 1);
        assert_eq!(report.failed, 0);
        assert!(session.is_authenticated());
        assert!(store.list_anonymous().await.unwrap().is_empty());

        let calls = api.hierarchy_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("owner-1".to_string(), 3, false));

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failed_migration_keeps_the_local_entry() {
        let (store, root) = temp_store("login_failure");
        store.put_anonymous(&anonymous_entry("Smith Farm", 2)).await.unwrap();

        let mut api = ScriptedApi::new(HierarchySnapshot::default());
        api.fail_ingest = true;
        let reconciler = Reconciler::new(&store, &api, ChunkPolicy::default());
        let mut session = Session::new();

        let report = reconciler.login(&mut session, "owner-1").await;

        assert_eq!(report.migrated, 0);
        assert_eq!(report.failed, 1);
        assert!(session.is_authenticated());
        assert_eq!(store.list_anonymous().await.unwrap().len(), 1);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn refresh_replaces_the_cloud_snapshot_wholesale() {
        let (store, root) = temp_store("refresh");
        store
            .replace_cloud_snapshot("owner-1", &[anonymous_entry("Stale", 1)])
            .await
            .unwrap();

        let api = ScriptedApi::new(two_grower_snapshot());
        let reconciler = Reconciler::new(&store, &api, ChunkPolicy::default());
        let mut session = Session::new();
        session.set_authenticated("owner-1");

        let entries = reconciler.refresh(&mut session).await.unwrap();
        assert_eq!(entries.len(), 2);

        let cached = store.list_cloud("owner-1").await.unwrap();
        assert_eq!(cached.len(), 2);
        assert!(cached.iter().all(|entry| entry.name != "Stale"));

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn logout_clears_the_cloud_scope_and_session() {
        let (store, root) = temp_store("logout");
        store
            .replace_cloud_snapshot("owner-1", &[anonymous_entry("Mine", 1)])
            .await
            .unwrap();

        let api = ScriptedApi::new(HierarchySnapshot::default());
        let reconciler = Reconciler::new(&store, &api, ChunkPolicy::default());
        let mut session = Session::new();
        session.set_authenticated("owner-1");
        session.record_open_layer("Mine");

        reconciler.logout(&mut session).await;

        assert!(!session.is_authenticated());
        assert!(session.open_layers().is_empty());
        assert!(store.list_cloud("owner-1").await.unwrap().is_empty());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn datasets_fall_back_to_the_cached_snapshot() {
        let (store, root) = temp_store("datasets_fallback");
        store
            .replace_cloud_snapshot("owner-1", &[anonymous_entry("Cached", 1)])
            .await
            .unwrap();

        let mut api = ScriptedApi::new(HierarchySnapshot::default());
        api.fail_fetch = true;
        let reconciler = Reconciler::new(&store, &api, ChunkPolicy::default());
        let mut session = Session::new();
        session.set_authenticated("owner-1");

        let listing = reconciler.datasets(&mut session).await;
        assert_eq!(listing.provenance, Provenance::Cache);
        assert_eq!(listing.datasets.len(), 1);
        assert_eq!(listing.datasets[0].name, "Cached");

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fallback_to_an_empty_cache_keeps_cache_provenance() {
        let (store, root) = temp_store("datasets_empty_cache");

        let mut api = ScriptedApi::new(HierarchySnapshot::default());
        api.fail_fetch = true;
        let reconciler = Reconciler::new(&store, &api, ChunkPolicy::default());
        let mut session = Session::new();
        session.set_authenticated("owner-1");

        let listing = reconciler.datasets(&mut session).await;
        assert_eq!(listing.provenance, Provenance::Cache);
        assert!(listing.datasets.is_empty());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn unreadable_scope_reports_error_provenance() {
        let (store, root) = temp_store("datasets_unreadable");
        // A regular file where the scope directory belongs makes listing fail
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("anonymous"), b"not a directory").unwrap();

        let api = ScriptedApi::new(HierarchySnapshot::default());
        let reconciler = Reconciler::new(&store, &api, ChunkPolicy::default());
        let mut session = Session::new();

        let listing = reconciler.datasets(&mut session).await;
        assert_eq!(listing.provenance, Provenance::Error);
        assert!(listing.datasets.is_empty());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn anonymous_listings_come_from_the_local_scope() {
        let (store, root) = temp_store("datasets_anon");
        store.put_anonymous(&anonymous_entry("Mine", 2)).await.unwrap();

        let api = ScriptedApi::new(HierarchySnapshot::default());
        let reconciler = Reconciler::new(&store, &api, ChunkPolicy::default());
        let mut session = Session::new();

        let listing = reconciler.datasets(&mut session).await;
        assert_eq!(listing.provenance, Provenance::Local);
        assert_eq!(listing.datasets.len(), 1);
        assert_eq!(*api.fetches.lock().unwrap(), 0);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fingerprints_are_cached_until_invalidated() {
        let (store, root) = temp_store("fingerprints");

        let api = ScriptedApi::new(two_grower_snapshot());
        let reconciler = Reconciler::new(&store, &api, ChunkPolicy::default());
        let mut session = Session::new();
        session.set_authenticated("owner-1");

        let first = reconciler.fingerprints(&mut session).await;
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|fp| !fp.signature.is_empty()));
        assert_eq!(*api.fetches.lock().unwrap(), 1);

        let again = reconciler.fingerprints(&mut session).await;
        assert_eq!(again.len(), 2);
        assert_eq!(*api.fetches.lock().unwrap(), 1);

        session.invalidate_fingerprints();
        reconciler.fingerprints(&mut session).await;
        assert_eq!(*api.fetches.lock().unwrap(), 2);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn anonymous_upload_then_login_round_trip() {
        let (store, root) = temp_store("e2e_migration");

        // Anonymous upload lands in the local scope and is retrievable
        store.put_anonymous(&anonymous_entry("Smith Farm", 3)).await.unwrap();
        assert!(store.get_anonymous("Smith Farm").await.unwrap().is_some());

        // Login migrates it remotely and removes the local copy
        let api = ScriptedApi::new(HierarchySnapshot::default());
        let reconciler = Reconciler::new(&store, &api, ChunkPolicy::default());
        let mut session = Session::new();
        let report = reconciler.login(&mut session, "owner-1").await;

        assert_eq!(report.migrated, 1);
        assert!(store.get_anonymous("Smith Farm").await.unwrap().is_none());
        assert_eq!(api.hierarchy_calls.lock().unwrap().len(), 1);

        let _ = fs::remove_dir_all(&root);
    }
}
