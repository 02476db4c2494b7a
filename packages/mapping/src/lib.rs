#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Attribute mapping of source property keys onto the canonical fields.
//!
//! When an upload does not carry grower/farm/field attributes under known
//! names, the pipeline asks for a mapping from the file's observed property
//! keys to the required semantic fields. The ask goes through an injected
//! [`MappingPrompt`] capability so the pipeline stays UI-agnostic; a
//! remembered mapping that still fits the file is reused without prompting.
//! Applying a confirmed mapping rewrites properties to the canonical names
//! and filters out features that cannot be fully mapped.

use thiserror::Error;

pub mod apply;
pub mod resolve;
pub mod sample;

pub use apply::{MappedCollection, apply_mapping};
pub use resolve::{
    MappingDecision, MappingPrompt, MappingSource, ResolvedMapping, resolve_mapping,
};
pub use sample::{ObservedKey, PropertySample, SampleLimits, sample_properties};

/// Errors from resolving an attribute mapping.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The user declined to complete the mapping. Aborts the file (and the
    /// rest of its batch) as a deliberate no-op.
    #[error("attribute mapping cancelled")]
    Cancelled,

    /// The prompt implementation itself failed (terminal went away, etc.).
    #[error("mapping prompt failed: {message}")]
    Prompt {
        /// Underlying failure description.
        message: String,
    },

    /// A confirmed mapping referenced keys the upload does not have.
    #[error("mapping refers to keys not present in the upload: {missing:?}")]
    UnusableMapping {
        /// The required keys that did not resolve.
        missing: Vec<String>,
    },
}
