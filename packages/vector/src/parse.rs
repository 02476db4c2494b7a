//! Upload format parsers, dispatched on file extension.
//!
//! `.geojson`/`.json` are parsed as literal JSON and run through the
//! normalizer ladder. `.kml` and `.kmz` go through the KML document tree,
//! lifting Placemark names and `ExtendedData` into feature properties.
//! `.zip` is treated as a zipped Shapefile: the first `.shp` member is
//! read together with its sibling `.dbf` attribute table. There is no
//! content sniffing; an unrecognized extension is rejected outright.

use std::io::{Cursor, Read as _};
use std::path::{Path, PathBuf};

use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use kml::types::{Element, Geometry as KmlGeometry, Placemark};
use kml::Kml;
use shapefile::dbase::FieldValue;

use crate::{normalize, VectorError};

/// Reads and parses a vector file into a normalized feature collection.
///
/// # Errors
///
/// Returns [`VectorError::Io`] when the file cannot be read,
/// [`VectorError::UnsupportedExtension`] for unknown extensions, and the
/// format-specific variants when the content is malformed.
pub async fn parse_path(path: &Path) -> Result<FeatureCollection, VectorError> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| VectorError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    parse_bytes(&extension, &bytes)
}

/// Parses already-read file content according to its (lowercased) extension.
///
/// # Errors
///
/// Same as [`parse_path`], minus the file read.
pub fn parse_bytes(extension: &str, bytes: &[u8]) -> Result<FeatureCollection, VectorError> {
    match extension {
        "geojson" | "json" => {
            let value: JsonValue = serde_json::from_slice(bytes)?;
            normalize::normalize(value)
        }
        "kml" => parse_kml_str(&String::from_utf8_lossy(bytes)),
        "kmz" => parse_kmz(bytes),
        "zip" => parse_shapefile_archive(bytes),
        other => Err(VectorError::UnsupportedExtension {
            extension: other.to_string(),
        }),
    }
}

// ── KML / KMZ ────────────────────────────────────────────────────────────────

fn parse_kml_str(text: &str) -> Result<FeatureCollection, VectorError> {
    let document: Kml<f64> = text.parse()?;

    let mut features = Vec::new();
    collect_kml_features(&document, &mut features);

    Ok(normalize::flatten(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }))
}

fn parse_kmz(bytes: &[u8]) -> Result<FeatureCollection, VectorError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    // First .kml member wins
    let member_name = archive
        .file_names()
        .find(|name| name.to_ascii_lowercase().ends_with(".kml"))
        .map(ToString::to_string)
        .ok_or_else(|| VectorError::InvalidInput {
            message: "kmz archive contains no .kml member".to_string(),
        })?;

    let member_bytes = read_member(&mut archive, &member_name)?;
    parse_kml_str(&String::from_utf8_lossy(&member_bytes))
}

fn collect_kml_features(node: &Kml<f64>, features: &mut Vec<Feature>) {
    match node {
        Kml::KmlDocument(document) => {
            for child in &document.elements {
                collect_kml_features(child, features);
            }
        }
        Kml::Document { elements, .. } | Kml::Folder { elements, .. } => {
            for child in elements {
                collect_kml_features(child, features);
            }
        }
        Kml::Placemark(placemark) => {
            if let Some(feature) = placemark_feature(placemark) {
                features.push(feature);
            }
        }
        Kml::Point(point) => push_bare_geometry(KmlGeometry::Point(point.clone()), features),
        Kml::LineString(line) => {
            push_bare_geometry(KmlGeometry::LineString(line.clone()), features);
        }
        Kml::LinearRing(ring) => {
            push_bare_geometry(KmlGeometry::LinearRing(ring.clone()), features);
        }
        Kml::Polygon(polygon) => {
            push_bare_geometry(KmlGeometry::Polygon(polygon.clone()), features);
        }
        Kml::MultiGeometry(multi) => {
            push_bare_geometry(KmlGeometry::MultiGeometry(multi.clone()), features);
        }
        _ => {}
    }
}

fn placemark_feature(placemark: &Placemark<f64>) -> Option<Feature> {
    let geometry = convert_kml_geometry(placemark.geometry.clone()?)?;

    let mut properties = JsonObject::new();
    if let Some(name) = non_empty(placemark.name.as_deref()) {
        properties.insert("name".to_string(), JsonValue::String(name));
    }
    if let Some(description) = non_empty(placemark.description.as_deref()) {
        properties.insert("description".to_string(), JsonValue::String(description));
    }
    extend_with_extended_data(&placemark.children, &mut properties);

    Some(Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    })
}

fn push_bare_geometry(geometry: KmlGeometry<f64>, features: &mut Vec<Feature>) {
    if let Some(geometry) = convert_kml_geometry(geometry) {
        features.push(Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: Some(JsonObject::new()),
            foreign_members: None,
        });
    }
}

fn convert_kml_geometry(geometry: KmlGeometry<f64>) -> Option<geojson::Geometry> {
    match geo_types::Geometry::<f64>::try_from(geometry) {
        Ok(converted) => Some(geojson::Geometry::new(geojson::Value::from(&converted))),
        Err(error) => {
            log::debug!("skipping KML geometry with no GeoJSON form: {error}");
            None
        }
    }
}

/// Lifts `<ExtendedData>` entries (both untyped `<Data>` and
/// `<SchemaData>/<SimpleData>`) into feature properties.
fn extend_with_extended_data(children: &[Element], properties: &mut JsonObject) {
    for extended in children.iter().filter(|e| e.name == "ExtendedData") {
        for entry in &extended.children {
            match entry.name.as_str() {
                "Data" => {
                    if let (Some(key), Some(value)) = (entry.attrs.get("name"), data_value(entry)) {
                        properties.insert(key.clone(), JsonValue::String(value));
                    }
                }
                "SchemaData" => {
                    for simple in entry.children.iter().filter(|e| e.name == "SimpleData") {
                        if let (Some(key), Some(value)) =
                            (simple.attrs.get("name"), simple.content.clone())
                        {
                            properties.insert(key.clone(), JsonValue::String(value));
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn data_value(data: &Element) -> Option<String> {
    data.children
        .iter()
        .find(|child| child.name == "value")
        .and_then(|child| child.content.clone())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

// ── Zipped Shapefile ─────────────────────────────────────────────────────────

fn parse_shapefile_archive(bytes: &[u8]) -> Result<FeatureCollection, VectorError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let shp_name = archive
        .file_names()
        .find(|name| {
            name.to_ascii_lowercase().ends_with(".shp") && !name.starts_with("__MACOSX/")
        })
        .map(ToString::to_string)
        .ok_or_else(|| VectorError::InvalidInput {
            message: "zip archive contains no .shp member".to_string(),
        })?;

    // The .dbf attribute table shares the .shp member's stem
    let stem = shp_name[..shp_name.len() - 4].to_ascii_lowercase();
    let dbf_name = archive
        .file_names()
        .find(|name| {
            let lower = name.to_ascii_lowercase();
            lower.ends_with(".dbf") && lower[..lower.len() - 4] == stem
        })
        .map(ToString::to_string);

    let shp_bytes = read_member(&mut archive, &shp_name)?;
    let dbf_bytes = dbf_name
        .map(|name| read_member(&mut archive, &name))
        .transpose()?;

    let shape_reader = shapefile::ShapeReader::new(Cursor::new(shp_bytes))?;

    let mut features = Vec::new();
    match dbf_bytes {
        Some(dbf) => {
            let dbase_reader = shapefile::dbase::Reader::new(Cursor::new(dbf))?;
            let mut reader = shapefile::Reader::new(shape_reader, dbase_reader);
            for entry in reader.iter_shapes_and_records() {
                let (shape, record) = entry?;
                if let Some(geometry) = convert_shape(shape) {
                    features.push(shape_feature(geometry, record_properties(record)));
                }
            }
        }
        None => {
            log::debug!("archive has no .dbf for {shp_name}; features will carry no attributes");
            for shape in shape_reader.read()? {
                if let Some(geometry) = convert_shape(shape) {
                    features.push(shape_feature(geometry, JsonObject::new()));
                }
            }
        }
    }

    Ok(normalize::flatten(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }))
}

fn convert_shape(shape: shapefile::Shape) -> Option<geojson::Geometry> {
    match geo_types::Geometry::<f64>::try_from(shape) {
        Ok(converted) => Some(geojson::Geometry::new(geojson::Value::from(&converted))),
        Err(error) => {
            log::debug!("skipping shape with no GeoJSON form: {error:?}");
            None
        }
    }
}

fn shape_feature(geometry: geojson::Geometry, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn record_properties(record: shapefile::dbase::Record) -> JsonObject {
    let mut properties = JsonObject::new();
    for (key, value) in record {
        if let Some(json) = dbase_value_to_json(value) {
            properties.insert(key, json);
        }
    }
    properties
}

fn dbase_value_to_json(value: FieldValue) -> Option<JsonValue> {
    match value {
        FieldValue::Character(text) => text.map(JsonValue::String),
        FieldValue::Numeric(number) => number.and_then(float_value),
        FieldValue::Float(number) => number.and_then(|f| float_value(f64::from(f))),
        FieldValue::Double(number) => float_value(number),
        FieldValue::Currency(number) => float_value(number),
        FieldValue::Integer(number) => Some(JsonValue::from(number)),
        FieldValue::Logical(flag) => flag.map(JsonValue::Bool),
        FieldValue::Date(date) => date.map(|d| {
            JsonValue::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }),
        _ => None,
    }
}

fn float_value(number: f64) -> Option<JsonValue> {
    serde_json::Number::from_f64(number).map(JsonValue::Number)
}

fn read_member(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, VectorError> {
    let mut member = archive.by_name(name)?;
    let mut bytes = Vec::new();
    member
        .read_to_end(&mut bytes)
        .map_err(|source| VectorError::Io {
            path: PathBuf::from(name),
            source,
        })?;
    Ok(bytes)
}
