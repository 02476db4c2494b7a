//! Interactive attribute-mapping prompt built on `dialoguer`.
//!
//! Shown when an upload's property keys cannot be recognized and no
//! remembered mapping fits them. Each canonical field is assigned with an
//! arrow-key selection over the observed keys; Esc on any selection
//! cancels the upload.

use async_trait::async_trait;
use dialoguer::{Confirm, Select};
use field_sync_mapping::{MappingDecision, MappingError, MappingPrompt, PropertySample};
use field_sync_models::FieldMapping;

/// Terminal implementation of [`MappingPrompt`].
pub struct DialoguerPrompt;

#[async_trait]
impl MappingPrompt for DialoguerPrompt {
    async fn request_mapping(
        &self,
        sample: &PropertySample,
        remembered: Option<&FieldMapping>,
    ) -> Result<MappingDecision, MappingError> {
        if sample.keys.is_empty() {
            return Err(MappingError::Prompt {
                message: "the upload has no property keys to assign".to_string(),
            });
        }

        println!(
            "Attribute names were not recognized; assign them from {} sampled feature(s).",
            sample.sampled_features
        );

        let labels = key_labels(sample);

        let Some(grower) = select_key(
            sample,
            &labels,
            "Which column holds the grower name?",
            remembered.map(|mapping| mapping.grower.as_str()),
        )?
        else {
            return Ok(MappingDecision::Cancelled);
        };
        let Some(farm) = select_key(
            sample,
            &labels,
            "Which column holds the farm name?",
            remembered.map(|mapping| mapping.farm.as_str()),
        )?
        else {
            return Ok(MappingDecision::Cancelled);
        };
        let Some(field) = select_key(
            sample,
            &labels,
            "Which column holds the field name?",
            remembered.map(|mapping| mapping.field.as_str()),
        )?
        else {
            return Ok(MappingDecision::Cancelled);
        };
        let Some(crop) = select_crop(
            sample,
            &labels,
            remembered.and_then(|mapping| mapping.crop.as_deref()),
        )?
        else {
            return Ok(MappingDecision::Cancelled);
        };

        let remember = Confirm::new()
            .with_prompt("Remember this mapping for future uploads?")
            .default(false)
            .interact_opt()
            .map_err(prompt_error)?
            .unwrap_or(false);

        Ok(MappingDecision::Confirmed {
            mapping: FieldMapping {
                grower,
                farm,
                field,
                crop,
            },
            remember,
        })
    }
}

/// One label per observed key, with example values when the sampler saw any.
fn key_labels(sample: &PropertySample) -> Vec<String> {
    sample
        .keys
        .iter()
        .map(|observed| {
            if observed.examples.is_empty() {
                observed.name.clone()
            } else {
                format!("{} (e.g. {})", observed.name, observed.examples.join(", "))
            }
        })
        .collect()
}

/// Index of `key` among the observed keys, falling back to the first entry.
/// Used to pre-select the remembered assignment.
fn position_of(sample: &PropertySample, key: Option<&str>) -> usize {
    key.and_then(|key| {
        sample
            .keys
            .iter()
            .position(|observed| observed.name == key)
    })
    .unwrap_or(0)
}

/// Runs one key selection. `Ok(None)` means the user cancelled.
fn select_key(
    sample: &PropertySample,
    labels: &[String],
    prompt: &str,
    remembered: Option<&str>,
) -> Result<Option<String>, MappingError> {
    let choice = Select::new()
        .with_prompt(prompt)
        .items(labels)
        .default(position_of(sample, remembered))
        .interact_opt()
        .map_err(prompt_error)?;
    Ok(choice.map(|idx| sample.keys[idx].name.clone()))
}

/// Runs the optional crop selection, with `(none)` as the first item.
/// The outer `None` means the user cancelled.
#[allow(clippy::option_option)]
fn select_crop(
    sample: &PropertySample,
    labels: &[String],
    remembered: Option<&str>,
) -> Result<Option<Option<String>>, MappingError> {
    let mut items = Vec::with_capacity(labels.len() + 1);
    items.push("(none)".to_string());
    items.extend_from_slice(labels);

    let default = remembered
        .and_then(|key| {
            sample
                .keys
                .iter()
                .position(|observed| observed.name == key)
        })
        .map_or(0, |pos| pos + 1);

    let choice = Select::new()
        .with_prompt("Which column holds the crop type? (optional)")
        .items(&items)
        .default(default)
        .interact_opt()
        .map_err(prompt_error)?;

    Ok(choice.map(|idx| {
        if idx == 0 {
            None
        } else {
            Some(sample.keys[idx - 1].name.clone())
        }
    }))
}

fn prompt_error(e: dialoguer::Error) -> MappingError {
    MappingError::Prompt {
        message: e.to_string(),
    }
}
