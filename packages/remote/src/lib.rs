#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Remote boundary API and chunked ingestion.
//!
//! The server exposes two bulk-ingest operations (the grower/farm/field
//! hierarchy decomposition, and a legacy per-dataset variant) plus a
//! hierarchy query. Both ingest calls are all-or-nothing per call and run
//! under a server-side statement timeout, so large feature sets go through
//! [`dispatch::ingest_chunked`], which splits them into bounded batches and
//! halves the batch size when the server signals a timeout.

pub mod dispatch;
pub mod http;
pub mod progress;

use async_trait::async_trait;
use field_sync_models::{HierarchySnapshot, IngestSummary};
use geojson::FeatureCollection;

pub use dispatch::{ChunkPolicy, DispatchError, IngestTarget, ingest_chunked};
pub use http::HttpBoundaryApi;
pub use progress::{NullProgress, ProgressCallback, null_progress};

/// Errors from remote boundary calls.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// HTTP request failed before a response was decoded.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A response body could not be decoded.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The endpoint rejected the call.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error code from the endpoint's error envelope, when present.
        code: Option<String>,
        /// Human-readable message.
        message: String,
    },
}

impl RemoteError {
    /// Whether this failure is the server cancelling a statement for
    /// exceeding its time budget. These are the only failures the
    /// dispatcher recovers from (by halving the batch size); everything
    /// else is fatal for the slice.
    #[must_use]
    pub fn is_statement_timeout(&self) -> bool {
        match self {
            Self::Api { code, message, .. } => {
                if code.as_deref() == Some("57014") {
                    return true;
                }
                let message = message.to_lowercase();
                message.contains("statement timeout") || message.contains("canceling statement")
            }
            Self::Http(_) | Self::Json(_) => false,
        }
    }
}

/// The remote boundary-ingestion service.
///
/// Implemented over HTTP by [`HttpBoundaryApi`]; tests substitute scripted
/// implementations.
#[async_trait]
pub trait BoundaryApi: Send + Sync {
    /// Decomposes `payload` into grower/farm/field rows for `owner_id`.
    /// When `replace_missing` is set, fields of the owner absent from the
    /// payload are removed server-side.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the call fails; the call is
    /// all-or-nothing, so a failure means no rows were written.
    async fn ingest_hierarchy(
        &self,
        payload: &FeatureCollection,
        owner_id: &str,
        replace_missing: bool,
    ) -> Result<IngestSummary, RemoteError>;

    /// Legacy per-dataset ingest; returns the inserted-row count.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the call fails.
    async fn ingest_dataset(
        &self,
        dataset_id: &str,
        layer_id: &str,
        payload: &FeatureCollection,
    ) -> Result<u64, RemoteError>;

    /// Fetches the owner's full grower/farm/field rows.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the call fails.
    async fn fetch_hierarchy(&self, owner_id: &str) -> Result<HierarchySnapshot, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: Option<&str>, message: &str) -> RemoteError {
        RemoteError::Api {
            status: 500,
            code: code.map(ToString::to_string),
            message: message.to_string(),
        }
    }

    #[test]
    fn timeout_classification_by_code() {
        assert!(api_error(Some("57014"), "query failed").is_statement_timeout());
        assert!(!api_error(Some("23505"), "duplicate key").is_statement_timeout());
    }

    #[test]
    fn timeout_classification_by_message() {
        assert!(api_error(None, "ERROR: canceling statement due to statement timeout")
            .is_statement_timeout());
        assert!(api_error(None, "Statement Timeout exceeded").is_statement_timeout());
        assert!(!api_error(None, "permission denied").is_statement_timeout());
    }
}
