//! Rewrites feature properties through a resolved mapping.

use field_sync_models::{FieldMapping, canonical};
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};

/// A collection whose features carry the canonical keys, plus the count of
/// features that were dropped for missing a required value.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedCollection {
    /// The surviving, rewritten features.
    pub collection: FeatureCollection,
    /// Features removed because grower, farm, or field had no usable value.
    pub dropped: u64,
}

/// Applies `mapping` to every feature: mapped source keys are removed and
/// their values re-inserted under the canonical keys, all other properties
/// and the geometry are preserved. Features where any of the three required
/// values is missing or empty after coercion are dropped and counted.
#[must_use]
pub fn apply_mapping(collection: FeatureCollection, mapping: &FieldMapping) -> MappedCollection {
    let mut kept = Vec::with_capacity(collection.features.len());
    let mut dropped = 0;

    for feature in collection.features {
        match map_feature(feature, mapping) {
            Some(feature) => kept.push(feature),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        log::debug!("dropped {dropped} feature(s) with no usable grower/farm/field values");
    }

    MappedCollection {
        collection: FeatureCollection {
            bbox: collection.bbox,
            features: kept,
            foreign_members: collection.foreign_members,
        },
        dropped,
    }
}

/// Rewrites one feature, or drops it when a required value is missing.
fn map_feature(mut feature: Feature, mapping: &FieldMapping) -> Option<Feature> {
    let mut properties = feature.properties.take().unwrap_or_default();

    let grower = lookup(&properties, &mapping.grower);
    let farm = lookup(&properties, &mapping.farm);
    let field = lookup(&properties, &mapping.field);
    let crop = mapping
        .crop
        .as_deref()
        .and_then(|key| lookup(&properties, key));

    let (Some(grower), Some(farm), Some(field)) = (grower, farm, field) else {
        return None;
    };

    for name in consumed_names(&properties, mapping) {
        properties.remove(&name);
    }

    properties.insert(
        canonical::GROWER_NAME.to_string(),
        JsonValue::String(grower),
    );
    properties.insert(canonical::FARM_NAME.to_string(), JsonValue::String(farm));
    properties.insert(canonical::FIELD_NAME.to_string(), JsonValue::String(field));
    if let Some(crop) = crop {
        properties.insert(canonical::CROP_TYPE.to_string(), JsonValue::String(crop));
    }

    feature.properties = Some(properties);
    Some(feature)
}

/// Looks up `key` (case-insensitive on trimmed names) and coerces its value
/// to trimmed text.
fn lookup(properties: &JsonObject, key: &str) -> Option<String> {
    properties.iter().find_map(|(name, value)| {
        if name.trim().eq_ignore_ascii_case(key) {
            coerced(value)
        } else {
            None
        }
    })
}

/// Property names consumed by the mapping, resolved against the actual
/// (possibly differently-cased) names in this feature.
fn consumed_names(properties: &JsonObject, mapping: &FieldMapping) -> Vec<String> {
    let mut keys: Vec<&str> = mapping.required_keys().to_vec();
    if let Some(crop) = mapping.crop.as_deref() {
        keys.push(crop);
    }

    properties
        .keys()
        .filter(|name| keys.iter().any(|key| name.trim().eq_ignore_ascii_case(key)))
        .cloned()
        .collect()
}

/// Renders a scalar value as trimmed text; non-scalars and empty strings
/// yield nothing.
fn coerced(value: &JsonValue) -> Option<String> {
    let text = match value {
        JsonValue::String(text) => text.trim().to_string(),
        JsonValue::Number(number) => number.to_string(),
        JsonValue::Bool(flag) => flag.to_string(),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}
