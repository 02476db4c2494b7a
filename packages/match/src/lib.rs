#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dataset fingerprinting and similarity matching.
//!
//! Uploads are frequently re-exports of the same logical field set with
//! drifting property keys. This crate builds a content signature from each
//! feature's grower/farm/field-like attribute values and scores it against
//! the signatures of known datasets to decide "same logical dataset,
//! re-uploaded" versus "new dataset."

pub mod matcher;
pub mod signature;

pub use matcher::{CandidateFingerprint, MatchResult, MatchThresholds, find_match};
pub use signature::{feature_token, normalize_name, signature};
