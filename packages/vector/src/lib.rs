#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Vector file parsing and feature normalization.
//!
//! Accepts the upload formats the pipeline supports (`GeoJSON`, KML, KMZ,
//! zipped Shapefile), converts each to a [`geojson::FeatureCollection`],
//! and normalizes the result: every feature ends up with a non-null,
//! non-collection geometry, with `GeometryCollection` members expanded
//! into sibling features.

use std::path::PathBuf;

use thiserror::Error;

pub mod normalize;
pub mod parse;

pub use normalize::{flatten, normalize};
pub use parse::{parse_bytes, parse_path};

/// Errors from reading or interpreting a vector file.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Filesystem failure reading the upload.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path (or archive member name) that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The `.zip`/`.kmz` container could not be opened.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// The file is not valid JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The JSON is not valid `GeoJSON`.
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),

    /// The KML document could not be parsed.
    #[error(transparent)]
    Kml(#[from] kml::Error),

    /// The shapefile member could not be read.
    #[error(transparent)]
    Shapefile(#[from] shapefile::Error),

    /// The `.dbf` attribute table could not be read.
    #[error(transparent)]
    Dbase(#[from] shapefile::dbase::Error),

    /// The file extension is not one of the supported upload formats.
    #[error("unsupported file extension: {extension:?}")]
    UnsupportedExtension {
        /// The rejected (lowercased) extension.
        extension: String,
    },

    /// Parsed content that cannot be interpreted as features.
    #[error("unrecognized vector input: {message}")]
    InvalidInput {
        /// What was found instead of a recognizable shape.
        message: String,
    },
}
