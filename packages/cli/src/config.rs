//! Configuration for the `field_sync` binary.
//!
//! Settings come from an optional `field-sync.toml` in the working
//! directory, overlaid with `FIELD_SYNC_*` environment variables for the
//! deploy-sensitive values. Every setting is optional; anything unset
//! falls back to a compiled default, so a bare invocation works against a
//! local service with no file at all.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use field_sync_mapping::SampleLimits;
use field_sync_match::MatchThresholds;
use field_sync_remote::ChunkPolicy;
use serde::Deserialize;

/// Base URL used when neither the file nor the environment names one.
const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Cache/session directory used when none is configured.
const DEFAULT_DATA_DIR: &str = ".field-sync";

/// Tunable settings for the binary. All fields are optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    /// Base URL of the boundary service.
    pub api_url: Option<String>,
    /// Bearer token sent with every API call.
    pub api_key: Option<String>,
    /// Directory holding the cache scopes and the session file.
    pub data_dir: Option<PathBuf>,
    /// Owner to sign in as when `login` is run without an argument.
    pub owner_id: Option<String>,
    /// Shared-token count at which an upload matches an existing dataset
    /// regardless of score.
    pub match_overlap: Option<usize>,
    /// Mean precision/recall at which an upload matches regardless of
    /// overlap.
    pub match_score: Option<f64>,
    /// Number of features inspected when sampling properties for the
    /// mapping prompt.
    pub sample_features: Option<usize>,
    /// Distinct example values kept per observed property key.
    pub sample_values: Option<usize>,
    /// Largest feature count sent in one ingest call.
    pub chunk_ceiling: Option<usize>,
    /// Chunk size at which a statement timeout stops being retried.
    pub chunk_floor: Option<usize>,
}

/// Parses a [`Config`] from TOML text.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or a value has the wrong
/// type.
pub fn parse_config(text: &str) -> Result<Config, String> {
    toml::de::from_str(text).map_err(|e| e.to_string())
}

/// Loads configuration from `path`.
///
/// A missing file yields the default (empty) configuration so that the
/// binary runs without one; any other read failure, and malformed TOML,
/// is an error.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<Config, String> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(format!("could not read {}: {e}", path.display())),
    }
}

impl Config {
    /// Overlays `FIELD_SYNC_*` environment variables on the file values.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("FIELD_SYNC_API_URL") {
            self.api_url = Some(url);
        }
        if let Ok(key) = std::env::var("FIELD_SYNC_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(dir) = std::env::var("FIELD_SYNC_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(owner) = std::env::var("FIELD_SYNC_OWNER") {
            self.owner_id = Some(owner);
        }
    }

    /// The boundary service base URL.
    #[must_use]
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// The cache/session directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    /// Match thresholds with any configured overrides applied.
    #[must_use]
    pub fn thresholds(&self) -> MatchThresholds {
        let mut thresholds = MatchThresholds::default();
        if let Some(overlap) = self.match_overlap {
            thresholds.min_overlap = overlap;
        }
        if let Some(score) = self.match_score {
            thresholds.min_score = score;
        }
        thresholds
    }

    /// Property-sampling limits with any configured overrides applied.
    #[must_use]
    pub fn limits(&self) -> SampleLimits {
        let mut limits = SampleLimits::default();
        if let Some(features) = self.sample_features {
            limits.max_features = features;
        }
        if let Some(values) = self.sample_values {
            limits.max_values_per_key = values;
        }
        limits
    }

    /// Ingest chunking bounds with any configured overrides applied.
    #[must_use]
    pub fn chunk_policy(&self) -> ChunkPolicy {
        let mut policy = ChunkPolicy::default();
        if let Some(ceiling) = self.chunk_ceiling {
            policy.ceiling = ceiling;
        }
        if let Some(floor) = self.chunk_floor {
            policy.floor = floor;
        }
        policy
    }
}
