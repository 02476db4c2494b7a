#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The upload pipeline: parse, match, map, render, persist.
//!
//! [`Uploader::process_file`] runs one vector file through a strict
//! sequence: parse and normalize, fingerprint-match against the known
//! datasets, resolve and apply the attribute mapping, hand the result to
//! the [`LayerSink`], and finally persist it to the cloud (authenticated)
//! or the anonymous cache. [`Uploader::process_batch`] drives a list of
//! files through the same path, stopping early only on a cancelled
//! mapping.

use thiserror::Error;

pub mod pipeline;
pub mod sink;

pub use pipeline::{BatchSummary, FileOutcome, Uploader};
pub use sink::{LayerSink, NullSink, null_sink};

/// Errors that fail a single file's upload.
///
/// Remote and cache failures do not appear here: persistence runs after
/// the sink has rendered the layer, and those paths degrade to warnings
/// on the file's outcome instead of failing it.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The file could not be read or understood.
    #[error(transparent)]
    Parse(#[from] field_sync_vector::VectorError),

    /// Parsing or mapping left nothing to render or ingest.
    #[error("no usable features in {filename}")]
    EmptyResult {
        /// The offending file.
        filename: String,
    },

    /// Mapping resolution failed or was declined.
    #[error(transparent)]
    Mapping(#[from] field_sync_mapping::MappingError),
}
