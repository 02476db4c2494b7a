//! Mapping resolution: recognized names, remembered config, or a prompt.

use async_trait::async_trait;
use field_sync_match::signature::{FARM_KEYS, FIELD_KEYS, GROWER_KEYS};
use field_sync_models::FieldMapping;
use geojson::FeatureCollection;

use crate::MappingError;
use crate::sample::{PropertySample, SampleLimits, sample_properties};

/// Attribute names recognized as carrying the crop type, in priority order.
pub const CROP_KEYS: [&str; 4] = ["crop", "crop_type", "croptype", "variety"];

/// Outcome of asking the user (or a scripted caller) for a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingDecision {
    /// The caller assigned keys to the required fields.
    Confirmed {
        /// The chosen key correspondence.
        mapping: FieldMapping,
        /// Whether to persist it for reuse across uploads.
        remember: bool,
    },
    /// The caller declined; the file's ingestion is aborted.
    Cancelled,
}

/// Capability for asking an external party to assign observed keys to the
/// required fields. Injected so the pipeline itself stays UI-agnostic and
/// tests can script the decision.
#[async_trait]
pub trait MappingPrompt: Send + Sync {
    /// Presents the observed keys (with example values) and any remembered
    /// mapping, and returns the caller's decision.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Prompt`] when the prompt itself fails
    /// (for example, the terminal went away).
    async fn request_mapping(
        &self,
        sample: &PropertySample,
        remembered: Option<&FieldMapping>,
    ) -> Result<MappingDecision, MappingError>;
}

/// How a mapping was obtained, for logging and persistence decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    /// Canonical or well-known attribute names were already present.
    Recognized,
    /// A remembered mapping fit the upload and was reused silently.
    Remembered,
    /// The prompt was shown and confirmed.
    Prompted,
}

/// A usable mapping together with how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    /// The key correspondence to apply.
    pub mapping: FieldMapping,
    /// Where it came from.
    pub source: MappingSource,
    /// Whether the caller asked for it to be persisted (only ever true for
    /// prompted mappings).
    pub remember: bool,
}

/// Resolves the attribute mapping for an upload.
///
/// Tries, in order: well-known attribute names already present in the
/// sampled properties; a remembered mapping whose three required keys are
/// all observed; the injected prompt.
///
/// # Errors
///
/// Returns [`MappingError::Cancelled`] when the prompt is declined,
/// [`MappingError::UnusableMapping`] when a confirmed mapping references
/// keys the upload does not have, and [`MappingError::Prompt`] when the
/// prompt itself fails.
pub async fn resolve_mapping(
    collection: &FeatureCollection,
    remembered: Option<&FieldMapping>,
    prompt: &dyn MappingPrompt,
    limits: &SampleLimits,
) -> Result<ResolvedMapping, MappingError> {
    let sample = sample_properties(collection, limits);

    if let Some(mapping) = recognized_mapping(&sample) {
        log::debug!("upload carries recognizable attribute names; skipping mapping prompt");
        return Ok(ResolvedMapping {
            mapping,
            source: MappingSource::Recognized,
            remember: false,
        });
    }

    if let Some(mapping) = remembered {
        if missing_keys(mapping, &sample).is_empty() {
            log::debug!("reusing remembered attribute mapping");
            return Ok(ResolvedMapping {
                mapping: mapping.clone(),
                source: MappingSource::Remembered,
                remember: false,
            });
        }
        log::debug!("remembered mapping does not fit this upload; prompting");
    }

    match prompt.request_mapping(&sample, remembered).await? {
        MappingDecision::Confirmed { mapping, remember } => {
            let missing = missing_keys(&mapping, &sample);
            if missing.is_empty() {
                Ok(ResolvedMapping {
                    mapping,
                    source: MappingSource::Prompted,
                    remember,
                })
            } else {
                Err(MappingError::UnusableMapping { missing })
            }
        }
        MappingDecision::Cancelled => Err(MappingError::Cancelled),
    }
}

/// Builds a mapping from well-known attribute names when all three
/// required groups resolve to an observed key.
fn recognized_mapping(sample: &PropertySample) -> Option<FieldMapping> {
    let grower = recognized_key(sample, &GROWER_KEYS)?;
    let farm = recognized_key(sample, &FARM_KEYS)?;
    let field = recognized_key(sample, &FIELD_KEYS)?;
    let crop = recognized_key(sample, &CROP_KEYS);

    Some(FieldMapping {
        grower,
        farm,
        field,
        crop,
    })
}

/// Finds the first group key that matches an observed key name
/// (case-insensitive on trimmed names), returning the observed name
/// verbatim so the mapping applies exactly.
fn recognized_key(sample: &PropertySample, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        sample
            .keys
            .iter()
            .find(|observed| observed.name.trim().eq_ignore_ascii_case(key))
            .map(|observed| observed.name.clone())
    })
}

/// The required keys of `mapping` that the sample did not observe.
fn missing_keys(mapping: &FieldMapping, sample: &PropertySample) -> Vec<String> {
    mapping
        .required_keys()
        .into_iter()
        .filter(|key| !sample.contains_key(key))
        .map(ToString::to_string)
        .collect()
}
