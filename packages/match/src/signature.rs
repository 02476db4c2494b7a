//! Signature construction from feature attribute values.
//!
//! Applied symmetrically to uploads and to stored datasets, so that the
//! same field set produces the same tokens regardless of which side it is
//! on. Attribute names are matched case-insensitively after trimming;
//! values are trimmed and lowercased.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use geojson::{FeatureCollection, JsonObject, JsonValue};
use regex::Regex;

/// Attribute names recognized as carrying the grower (client/owner) name,
/// in priority order.
pub const GROWER_KEYS: [&str; 6] = [
    "grower",
    "grower_name",
    "growername",
    "client",
    "client_name",
    "owner",
];

/// Attribute names recognized as carrying the farm name, in priority order.
pub const FARM_KEYS: [&str; 4] = ["farm", "farm_name", "farmname", "ranch"];

/// Attribute names recognized as carrying the field name, in priority order.
pub const FIELD_KEYS: [&str; 4] = ["field", "field_name", "fieldname", "paddock"];

/// Generic identifying attribute names, used only when fewer than two of
/// the specific groups resolve.
pub const FALLBACK_KEYS: [&str; 6] = ["name", "title", "label", "id", "fid", "objectid"];

/// Regex to strip every character that does not contribute to name
/// equality.
static NON_ALPHANUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

/// Normalizes a dataset name for the exact-name match short-circuit:
/// lowercase, then strip every non-alphanumeric character.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    NON_ALPHANUMERIC_RE
        .replace_all(&name.to_lowercase(), "")
        .into_owned()
}

/// Builds the signature of a feature collection: the set of per-feature
/// tokens (duplicates collapse).
#[must_use]
pub fn signature(collection: &FeatureCollection) -> BTreeSet<String> {
    collection
        .features
        .iter()
        .filter_map(|feature| feature_token(feature.properties.as_ref()))
        .collect()
}

/// Derives one signature token from a feature's properties.
///
/// Resolves the first non-empty value per attribute-name group. When at
/// least two of the grower/farm/field groups resolve, the token joins the
/// resolved `{group index}:{lowercased value}` parts; otherwise a resolved
/// fallback group yields a weaker `3:`-prefixed token; otherwise the
/// feature contributes nothing.
#[must_use]
pub fn feature_token(properties: Option<&JsonObject>) -> Option<String> {
    let properties = properties?;

    let grower = resolve_group(properties, &GROWER_KEYS);
    let farm = resolve_group(properties, &FARM_KEYS);
    let field = resolve_group(properties, &FIELD_KEYS);

    let resolved = [&grower, &farm, &field]
        .into_iter()
        .filter(|value| value.is_some())
        .count();

    if resolved >= 2 {
        let parts: Vec<String> = [(0, grower), (1, farm), (2, field)]
            .into_iter()
            .filter_map(|(index, value)| value.map(|text| format!("{index}:{}", text.to_lowercase())))
            .collect();
        return Some(parts.join("|"));
    }

    resolve_group(properties, &FALLBACK_KEYS).map(|text| format!("3:{}", text.to_lowercase()))
}

/// Finds the first key of `keys` present in `properties` (case-insensitive
/// on trimmed names) with a non-empty scalar value.
pub(crate) fn resolve_group(properties: &JsonObject, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        properties.iter().find_map(|(name, value)| {
            if name.trim().eq_ignore_ascii_case(key) {
                scalar_text(value)
            } else {
                None
            }
        })
    })
}

/// Renders a scalar property value as trimmed text; non-scalars and empty
/// strings resolve to nothing.
fn scalar_text(value: &JsonValue) -> Option<String> {
    let text = match value {
        JsonValue::String(text) => text.trim().to_string(),
        JsonValue::Number(number) => number.to_string(),
        JsonValue::Bool(flag) => flag.to_string(),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}
