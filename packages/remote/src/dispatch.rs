//! Size-adaptive chunked ingestion.
//!
//! Both ingest operations are all-or-nothing per call and run under a
//! server-side statement timeout whose trigger is data-dependent (geometry
//! complexity as much as row count), so no fixed batch size is safe up
//! front. The dispatcher starts at a ceiling batch size and, when the
//! server cancels a call, bisects the failing slice and halves the working
//! batch size until calls fit the server's time budget or the floor is
//! reached.
//!
//! Retry state lives in an explicit work stack of feature ranges rather
//! than recursion, which bounds depth and keeps the policy testable
//! against a scripted remote.

use std::sync::Arc;

use geojson::FeatureCollection;

use crate::progress::ProgressCallback;
use crate::{BoundaryApi, RemoteError};

/// Bounds on per-call payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    /// Largest number of features sent in one call.
    pub ceiling: usize,
    /// Batch size at or below which a timeout is no longer retried.
    pub floor: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            ceiling: 500,
            floor: 50,
        }
    }
}

/// Which remote ingest operation to dispatch to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestTarget {
    /// The grower/farm/field hierarchy decomposition.
    Hierarchy {
        /// Owner the rows belong to.
        owner_id: String,
        /// Whether the server should remove the owner's fields absent
        /// from the payload.
        replace_missing: bool,
    },
    /// The legacy per-dataset ingest.
    Dataset {
        /// Target dataset id.
        dataset_id: String,
        /// Target layer id.
        layer_id: String,
    },
}

/// A failed dispatch, carrying the rows already written by earlier slices.
/// Those rows are live on the server; callers need the count to report
/// honestly.
#[derive(Debug, thiserror::Error)]
#[error("ingestion aborted after {inserted} inserted row(s): {source}")]
pub struct DispatchError {
    /// Rows written by slices that completed before the failure.
    pub inserted: u64,
    /// The failure that stopped the dispatch.
    pub source: RemoteError,
}

/// One pending feature range on the work stack.
#[derive(Debug, Clone, Copy)]
struct Slice {
    start: usize,
    end: usize,
    batch_size: usize,
}

/// Ingests `collection` through `api` in bounded batches, returning the
/// total inserted-row count.
///
/// Slices are processed sequentially in input order with one in-flight
/// call at a time. On a statement timeout with the batch size above the
/// floor and more than one feature in the slice, the slice is bisected at
/// its midpoint and the batch size halves. When a hierarchy ingest is
/// split across more than one call, `replace_missing` is forced off for
/// every call, since a partial payload must not delete absent rows.
///
/// # Errors
///
/// Returns [`DispatchError`] when a non-timeout failure occurs or a
/// timeout persists at the floor batch size. Rows written by completed
/// slices are retained server-side and reported in the error.
pub async fn ingest_chunked(
    api: &dyn BoundaryApi,
    target: &IngestTarget,
    collection: &FeatureCollection,
    policy: ChunkPolicy,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<u64, DispatchError> {
    let total = collection.features.len();
    if total == 0 {
        return Ok(0);
    }

    let ceiling = policy.ceiling.max(1);
    progress.set_total(total as u64);

    // Ceiling-sized slices, pushed in reverse so the first range pops
    // first and processing stays in input order.
    let mut stack: Vec<Slice> = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + ceiling).min(total);
        stack.push(Slice {
            start,
            end,
            batch_size: ceiling,
        });
        start = end;
    }
    stack.reverse();

    let mut inserted: u64 = 0;
    while let Some(slice) = stack.pop() {
        let payload = subset(collection, slice.start, slice.end);
        // Only a call carrying the whole payload may honor replace_missing
        let covers_all = slice.start == 0 && slice.end == total;

        match call(api, target, &payload, covers_all).await {
            Ok(count) => {
                inserted += count;
                progress.inc((slice.end - slice.start) as u64);
            }
            Err(source)
                if source.is_statement_timeout()
                    && slice.batch_size > policy.floor
                    && slice.end - slice.start > 1 =>
            {
                let mid = usize::midpoint(slice.start, slice.end);
                let batch_size = (slice.batch_size / 2).max(policy.floor);
                log::warn!(
                    "statement timeout on features {}..{}; retrying in batches of at most {batch_size}",
                    slice.start,
                    slice.end
                );
                progress.set_message(format!("retrying in batches of {batch_size}"));
                // Second half first, so the first half pops next
                stack.push(Slice {
                    start: mid,
                    end: slice.end,
                    batch_size,
                });
                stack.push(Slice {
                    start: slice.start,
                    end: mid,
                    batch_size,
                });
            }
            Err(source) => return Err(DispatchError { inserted, source }),
        }
    }

    Ok(inserted)
}

async fn call(
    api: &dyn BoundaryApi,
    target: &IngestTarget,
    payload: &FeatureCollection,
    covers_all: bool,
) -> Result<u64, RemoteError> {
    match target {
        IngestTarget::Hierarchy {
            owner_id,
            replace_missing,
        } => {
            let summary = api
                .ingest_hierarchy(payload, owner_id, *replace_missing && covers_all)
                .await?;
            Ok(summary.inserted_fields())
        }
        IngestTarget::Dataset {
            dataset_id,
            layer_id,
        } => api.ingest_dataset(dataset_id, layer_id, payload).await,
    }
}

/// Clones the half-open feature range `start..end` into its own
/// collection.
fn subset(collection: &FeatureCollection, start: usize, end: usize) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: collection.features[start..end].to_vec(),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::null_progress;
    use async_trait::async_trait;
    use field_sync_models::{HierarchySnapshot, IngestSummary};
    use geojson::Feature;
    use serde_json::json;
    use std::sync::Mutex;

    fn collection(count: usize) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: (0..count)
                .map(|i| {
                    let mut properties = geojson::JsonObject::new();
                    properties.insert("i".to_string(), json!(i));
                    Feature {
                        bbox: None,
                        geometry: None,
                        id: None,
                        properties: Some(properties),
                        foreign_members: None,
                    }
                })
                .collect(),
            foreign_members: None,
        }
    }

    fn first_index(payload: &FeatureCollection) -> u64 {
        payload.features[0].properties.as_ref().unwrap()["i"]
            .as_u64()
            .unwrap()
    }

    fn hierarchy(replace_missing: bool) -> IngestTarget {
        IngestTarget::Hierarchy {
            owner_id: "owner-1".to_string(),
            replace_missing,
        }
    }

    fn policy(ceiling: usize, floor: usize) -> ChunkPolicy {
        ChunkPolicy { ceiling, floor }
    }

    /// A call the stub observed: payload size, first feature index, and
    /// the `replace_missing` flag it was given.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct SeenCall {
        size: usize,
        first: u64,
        replace_missing: bool,
    }

    /// Remote stub that times out for any payload larger than `max_batch`
    /// and records every call.
    struct TimeoutAbove {
        max_batch: usize,
        calls: Mutex<Vec<SeenCall>>,
        accepted: Mutex<u64>,
    }

    impl TimeoutAbove {
        fn new(max_batch: usize) -> Self {
            Self {
                max_batch,
                calls: Mutex::new(Vec::new()),
                accepted: Mutex::new(0),
            }
        }

        fn timeout() -> RemoteError {
            RemoteError::Api {
                status: 500,
                code: Some("57014".to_string()),
                message: "canceling statement due to statement timeout".to_string(),
            }
        }

        fn accepted_calls(&self) -> Vec<SeenCall> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .copied()
                .filter(|call| call.size <= self.max_batch)
                .collect()
        }

        fn observe(
            &self,
            payload: &FeatureCollection,
            replace_missing: bool,
        ) -> Result<u64, RemoteError> {
            let size = payload.features.len();
            self.calls.lock().unwrap().push(SeenCall {
                size,
                first: first_index(payload),
                replace_missing,
            });
            if size > self.max_batch {
                return Err(Self::timeout());
            }
            *self.accepted.lock().unwrap() += size as u64;
            Ok(size as u64)
        }
    }

    #[async_trait]
    impl BoundaryApi for TimeoutAbove {
        async fn ingest_hierarchy(
            &self,
            payload: &FeatureCollection,
            _owner_id: &str,
            replace_missing: bool,
        ) -> Result<IngestSummary, RemoteError> {
            let count = self.observe(payload, replace_missing)?;
            Ok(IngestSummary {
                fields_inserted: count,
                ..IngestSummary::default()
            })
        }

        async fn ingest_dataset(
            &self,
            _dataset_id: &str,
            _layer_id: &str,
            payload: &FeatureCollection,
        ) -> Result<u64, RemoteError> {
            self.observe(payload, false)
        }

        async fn fetch_hierarchy(&self, _owner_id: &str) -> Result<HierarchySnapshot, RemoteError> {
            Ok(HierarchySnapshot::default())
        }
    }

    /// Remote stub that accepts a fixed number of calls, then fails with a
    /// non-timeout error.
    struct FatalAfter {
        remaining: Mutex<usize>,
    }

    #[async_trait]
    impl BoundaryApi for FatalAfter {
        async fn ingest_hierarchy(
            &self,
            payload: &FeatureCollection,
            _owner_id: &str,
            _replace_missing: bool,
        ) -> Result<IngestSummary, RemoteError> {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining == 0 {
                return Err(RemoteError::Api {
                    status: 403,
                    code: None,
                    message: "permission denied".to_string(),
                });
            }
            *remaining -= 1;
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
            Ok(HierarchySnapshot::default())
        }
    }

    #[tokio::test]
    async fn empty_collection_is_a_no_op() {
        let api = TimeoutAbove::new(100);
        let inserted = ingest_chunked(
            &api,
            &hierarchy(true),
            &collection(0),
            ChunkPolicy::default(),
            &null_progress(),
        )
        .await
        .unwrap();
        assert_eq!(inserted, 0);
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn small_payload_goes_in_one_call_honoring_replace_missing() {
        let api = TimeoutAbove::new(1000);
        let inserted = ingest_chunked(
            &api,
            &hierarchy(true),
            &collection(10),
            ChunkPolicy::default(),
            &null_progress(),
        )
        .await
        .unwrap();

        assert_eq!(inserted, 10);
        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].replace_missing);
    }

    #[tokio::test]
    async fn large_payload_splits_into_ceiling_slices_in_order() {
        let api = TimeoutAbove::new(1000);
        let inserted = ingest_chunked(
            &api,
            &hierarchy(true),
            &collection(1050),
            policy(500, 50),
            &null_progress(),
        )
        .await
        .unwrap();

        assert_eq!(inserted, 1050);
        let calls = api.calls.lock().unwrap();
        assert_eq!(
            calls.iter().map(|c| c.size).collect::<Vec<_>>(),
            [500, 500, 50]
        );
        assert_eq!(
            calls.iter().map(|c| c.first).collect::<Vec<_>>(),
            [0, 500, 1000]
        );
        // A split payload must never delete rows it does not carry
        assert!(calls.iter().all(|c| !c.replace_missing));
    }

    #[tokio::test]
    async fn inserted_counts_sum_across_halved_batches() {
        let api = TimeoutAbove::new(130);
        let inserted = ingest_chunked(
            &api,
            &hierarchy(false),
            &collection(1000),
            policy(500, 50),
            &null_progress(),
        )
        .await
        .unwrap();

        assert_eq!(inserted, 1000);
        assert_eq!(inserted, *api.accepted.lock().unwrap());

        let accepted = api.accepted_calls();
        assert!(accepted.iter().all(|c| c.size <= 130));
        // Depth-first halving still delivers features in input order
        let firsts: Vec<u64> = accepted.iter().map(|c| c.first).collect();
        assert_eq!(firsts, [0, 125, 250, 375, 500, 625, 750, 875]);
    }

    #[tokio::test]
    async fn timeout_at_the_floor_is_fatal() {
        let api = TimeoutAbove::new(10);
        let err = ingest_chunked(
            &api,
            &hierarchy(false),
            &collection(400),
            policy(400, 200),
            &null_progress(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.inserted, 0);
        assert!(err.source.is_statement_timeout());
    }

    #[tokio::test]
    async fn single_feature_timeout_is_fatal() {
        let api = TimeoutAbove::new(0);
        let err = ingest_chunked(
            &api,
            &hierarchy(false),
            &collection(1),
            ChunkPolicy::default(),
            &null_progress(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.inserted, 0);
        assert!(err.source.is_statement_timeout());
    }

    #[tokio::test]
    async fn fatal_error_keeps_earlier_slice_counts() {
        let api = FatalAfter {
            remaining: Mutex::new(2),
        };
        let err = ingest_chunked(
            &api,
            &hierarchy(false),
            &collection(150),
            policy(50, 10),
            &null_progress(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.inserted, 100);
        assert!(!err.source.is_statement_timeout());
    }
}
