//! Normalization of parsed vector data into a canonical feature collection.
//!
//! Parser output arrives in one of a handful of top-level shapes: a full
//! `FeatureCollection`, a single `Feature`, an array of features, or a bare
//! geometry. [`normalize`] tries each recognized shape in priority order and
//! short-circuits on the first that fits; anything else is rejected as
//! invalid input. The accepted collection is then [`flatten`]ed:
//! `GeometryCollection` geometries become sibling features (one per child,
//! each carrying a copy of the parent's properties) and features without a
//! geometry are dropped.

use std::collections::VecDeque;

use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::Value as JsonValue;

use crate::VectorError;

/// `GeoJSON` geometry type names, for recognizing a bare geometry object.
const GEOMETRY_TYPES: [&str; 7] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

/// Interprets arbitrary parsed JSON as a canonical feature collection.
///
/// Recognized shapes, in priority order: `FeatureCollection`, single
/// `Feature`, array of features, bare geometry. The result is flattened
/// (see [`flatten`]), so normalizing an already-canonical collection
/// returns an equivalent collection.
///
/// # Errors
///
/// Returns [`VectorError::InvalidInput`] when the value matches none of the
/// recognized shapes.
pub fn normalize(value: JsonValue) -> Result<FeatureCollection, VectorError> {
    let collection = as_feature_collection(&value)
        .or_else(|| as_single_feature(&value))
        .or_else(|| as_feature_array(&value))
        .or_else(|| as_bare_geometry(&value))
        .ok_or_else(|| VectorError::InvalidInput {
            message: describe_shape(&value),
        })?;

    Ok(flatten(collection))
}

/// Expands `GeometryCollection` geometries into sibling features and drops
/// features without a geometry.
///
/// Each child geometry becomes its own feature carrying a copy of the
/// parent's properties; nested collections are expanded in place via an
/// explicit work queue, preserving child order. Features whose geometry is
/// not a collection pass through untouched.
#[must_use]
pub fn flatten(collection: FeatureCollection) -> FeatureCollection {
    let mut features = Vec::with_capacity(collection.features.len());

    for mut feature in collection.features {
        let Some(geometry) = feature.geometry.take() else {
            // No geometry, nothing to render or ingest
            continue;
        };

        match geometry {
            Geometry {
                value: Value::GeometryCollection(children),
                ..
            } => {
                let mut queue = VecDeque::from(children);
                while let Some(child) = queue.pop_front() {
                    match child.value {
                        Value::GeometryCollection(nested) => {
                            // Nested children take the parent's position
                            for (offset, nested_child) in nested.into_iter().enumerate() {
                                queue.insert(offset, nested_child);
                            }
                        }
                        value => features.push(Feature {
                            bbox: None,
                            geometry: Some(Geometry::new(value)),
                            id: None,
                            properties: feature.properties.clone(),
                            foreign_members: None,
                        }),
                    }
                }
            }
            other => {
                feature.geometry = Some(other);
                features.push(feature);
            }
        }
    }

    FeatureCollection {
        bbox: collection.bbox,
        features,
        foreign_members: collection.foreign_members,
    }
}

fn as_feature_collection(value: &JsonValue) -> Option<FeatureCollection> {
    if type_name(value) != Some("FeatureCollection") {
        return None;
    }
    FeatureCollection::try_from(value.clone()).ok()
}

fn as_single_feature(value: &JsonValue) -> Option<FeatureCollection> {
    if !looks_like_feature(value) {
        return None;
    }
    Feature::try_from(value.clone()).ok().map(single)
}

fn as_feature_array(value: &JsonValue) -> Option<FeatureCollection> {
    let array = value.as_array()?;
    if !looks_like_feature(array.first()?) {
        return None;
    }

    // Lenient past the first element: entries that fail to parse as
    // features are skipped rather than failing the whole array.
    let features = array
        .iter()
        .filter_map(|entry| Feature::try_from(entry.clone()).ok())
        .collect();

    Some(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn as_bare_geometry(value: &JsonValue) -> Option<FeatureCollection> {
    let name = type_name(value)?;
    if !GEOMETRY_TYPES.contains(&name) {
        return None;
    }

    let geometry = Geometry::try_from(value.clone()).ok()?;
    Some(single(Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: None,
        foreign_members: None,
    }))
}

fn single(feature: Feature) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: None,
    }
}

fn looks_like_feature(value: &JsonValue) -> bool {
    type_name(value) == Some("Feature")
}

fn type_name(value: &JsonValue) -> Option<&str> {
    value.get("type").and_then(JsonValue::as_str)
}

fn describe_shape(value: &JsonValue) -> String {
    match value {
        JsonValue::Object(_) => type_name(value).map_or_else(
            || "object without a \"type\" member".to_string(),
            |name| format!("object of type {name:?}"),
        ),
        JsonValue::Array(_) => "array whose first element is not a Feature".to_string(),
        JsonValue::String(_) => "bare string".to_string(),
        JsonValue::Number(_) => "bare number".to_string(),
        JsonValue::Bool(_) => "bare boolean".to_string(),
        JsonValue::Null => "null".to_string(),
    }
}
