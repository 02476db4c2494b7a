//! Property sampling for the mapping prompt.
//!
//! Only a bounded prefix of the collection is inspected, and only a few
//! distinct example values are kept per key. Large uploads would otherwise
//! make the prompt unusable (and the sampling pass quadratic).

use geojson::{FeatureCollection, JsonValue};

/// Caps on how much of an upload the sampler inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleLimits {
    /// Maximum number of features whose properties are sampled.
    pub max_features: usize,
    /// Maximum number of distinct example values kept per observed key.
    pub max_values_per_key: usize,
}

impl Default for SampleLimits {
    fn default() -> Self {
        Self {
            max_features: 200,
            max_values_per_key: 5,
        }
    }
}

/// One observed property key with a few of its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedKey {
    /// The key exactly as it appears in the upload.
    pub name: String,
    /// Up to [`SampleLimits::max_values_per_key`] distinct example values,
    /// in first-seen order.
    pub examples: Vec<String>,
}

/// The keys observed across the sampled features, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySample {
    /// Observed keys with example values.
    pub keys: Vec<ObservedKey>,
    /// How many features were actually inspected.
    pub sampled_features: usize,
}

impl PropertySample {
    /// Whether `name` was observed (exact match; mappings store source
    /// keys verbatim).
    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.keys.iter().any(|observed| observed.name == name)
    }

    /// The observed key names, in first-seen order.
    #[must_use]
    pub fn key_names(&self) -> Vec<&str> {
        self.keys.iter().map(|observed| observed.name.as_str()).collect()
    }
}

/// Samples the collection's property keys and example values under the
/// given limits.
#[must_use]
pub fn sample_properties(collection: &FeatureCollection, limits: &SampleLimits) -> PropertySample {
    let mut sample = PropertySample::default();

    for feature in collection.features.iter().take(limits.max_features) {
        sample.sampled_features += 1;

        let Some(properties) = feature.properties.as_ref() else {
            continue;
        };

        for (key, value) in properties {
            let index = sample
                .keys
                .iter()
                .position(|entry| entry.name == *key)
                .unwrap_or_else(|| {
                    sample.keys.push(ObservedKey {
                        name: key.clone(),
                        examples: Vec::new(),
                    });
                    sample.keys.len() - 1
                });
            let observed = &mut sample.keys[index];

            if observed.examples.len() >= limits.max_values_per_key {
                continue;
            }
            if let Some(example) = example_text(value) {
                if !observed.examples.contains(&example) {
                    observed.examples.push(example);
                }
            }
        }
    }

    sample
}

/// Renders a scalar value for display next to its key in the prompt.
fn example_text(value: &JsonValue) -> Option<String> {
    let text = match value {
        JsonValue::String(text) => text.trim().to_string(),
        JsonValue::Number(number) => number.to_string(),
        JsonValue::Bool(flag) => flag.to_string(),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::Feature;
    use serde_json::json;

    fn feature_with(properties: JsonValue) -> Feature {
        Feature {
            bbox: None,
            geometry: None,
            id: None,
            properties: match properties {
                JsonValue::Object(map) => Some(map),
                other => panic!("expected object, got {other:?}"),
            },
            foreign_members: None,
        }
    }

    fn collection(features: Vec<Feature>) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    #[test]
    fn observes_keys_in_first_seen_order() {
        let fc = collection(vec![
            feature_with(json!({ "b": 1, "a": 2 })),
            feature_with(json!({ "c": 3 })),
        ]);
        let sample = sample_properties(&fc, &SampleLimits::default());
        // serde_json maps iterate sorted, so "a" precedes "b" within the
        // first feature; "c" arrives with the second
        assert_eq!(sample.key_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn caps_sampled_features() {
        let fc = collection(
            (0..50)
                .map(|i| {
                    let mut properties = geojson::JsonObject::new();
                    properties.insert(format!("k{i}"), json!(i));
                    Feature {
                        bbox: None,
                        geometry: None,
                        id: None,
                        properties: Some(properties),
                        foreign_members: None,
                    }
                })
                .collect(),
        );
        let limits = SampleLimits {
            max_features: 10,
            max_values_per_key: 5,
        };
        let sample = sample_properties(&fc, &limits);
        assert_eq!(sample.sampled_features, 10);
        assert_eq!(sample.keys.len(), 10);
    }

    #[test]
    fn caps_distinct_example_values() {
        let fc = collection(
            (0..20)
                .map(|i| feature_with(json!({ "field": format!("F{i}") })))
                .collect(),
        );
        let sample = sample_properties(&fc, &SampleLimits::default());
        assert_eq!(sample.keys[0].examples.len(), 5);
    }

    #[test]
    fn duplicate_values_count_once() {
        let fc = collection(
            (0..8)
                .map(|_| feature_with(json!({ "grower": "Acme" })))
                .collect(),
        );
        let sample = sample_properties(&fc, &SampleLimits::default());
        assert_eq!(sample.keys[0].examples, vec!["Acme".to_string()]);
    }

    #[test]
    fn non_scalar_values_observed_without_examples() {
        let fc = collection(vec![feature_with(json!({ "nested": { "x": 1 } }))]);
        let sample = sample_properties(&fc, &SampleLimits::default());
        assert!(sample.contains_key("nested"));
        assert!(sample.keys[0].examples.is_empty());
    }
}
