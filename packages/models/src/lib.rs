#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared dataset, hierarchy, and cache types for the field sync pipeline.
//!
//! Every format parser and sync layer converges on these types: uploads
//! become [`geojson::FeatureCollection`]s whose features carry the canonical
//! property names in [`canonical`], the remote store is described by the
//! grower/farm/field row types, and locally cached datasets are
//! [`CacheEntry`] records.

use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum_macros::{AsRefStr, Display, EnumString};

/// Canonical feature property names produced by attribute mapping.
///
/// After a collection passes through the mapper, every submitted feature is
/// guaranteed to carry non-empty values for the first three; `CROP_TYPE` is
/// optional.
pub mod canonical {
    /// Grower (client/owner) display name.
    pub const GROWER_NAME: &str = "grower_name";
    /// Farm display name.
    pub const FARM_NAME: &str = "farm_name";
    /// Field display name.
    pub const FIELD_NAME: &str = "field_name";
    /// Optional crop type annotation.
    pub const CROP_TYPE: &str = "crop_type";
}

// ── Remote hierarchy rows ────────────────────────────────────────────────────

/// A grower row as returned by the hierarchy endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowerRow {
    /// Remote primary key.
    pub id: String,
    /// Grower display name.
    pub name: String,
    /// Whether the grower is managed through the machine network.
    pub mnet: bool,
}

/// A farm row as returned by the hierarchy endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmRow {
    /// Remote primary key.
    pub id: String,
    /// Farm display name.
    pub name: String,
    /// Owning grower. `None` for orphaned farms, which then anchor their
    /// own dataset grouping.
    pub grower_id: Option<String>,
}

/// A field row as returned by the hierarchy endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRow {
    /// Remote primary key.
    pub id: String,
    /// Owning farm.
    pub farm_id: String,
    /// Field display name.
    pub name: String,
    /// Field boundary geometry.
    pub boundary: geojson::Geometry,
    /// Computed area, if the remote store has one.
    pub area: Option<f64>,
    /// Computed perimeter, if the remote store has one.
    pub perimeter: Option<f64>,
    /// Free-form per-field properties preserved from the original upload.
    pub properties: Option<geojson::JsonObject>,
    /// Last modification time of the row.
    pub updated_at: DateTime<Utc>,
}

/// The full grower/farm/field state for one owner, as fetched in a single
/// hierarchy query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchySnapshot {
    /// All grower rows for the owner.
    pub growers: Vec<GrowerRow>,
    /// All farm rows for the owner.
    pub farms: Vec<FarmRow>,
    /// All field rows for the owner.
    pub fields: Vec<FieldRow>,
}

/// Row-count summary returned by the bulk hierarchy-ingest procedure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Growers created by this call.
    pub growers_inserted: u64,
    /// Growers updated by this call.
    pub growers_updated: u64,
    /// Farms created by this call.
    pub farms_inserted: u64,
    /// Farms updated by this call.
    pub farms_updated: u64,
    /// Fields created by this call.
    pub fields_inserted: u64,
    /// Fields updated by this call.
    pub fields_updated: u64,
    /// Fields removed because they were absent from a replacing payload.
    pub fields_removed: u64,
}

impl IngestSummary {
    /// Number of field rows the call accepted (created or updated), which
    /// is the per-feature count the dispatcher aggregates.
    #[must_use]
    pub const fn inserted_fields(&self) -> u64 {
        self.fields_inserted + self.fields_updated
    }
}

// ── Local cache ──────────────────────────────────────────────────────────────

/// One locally cached dataset, in either the anonymous or the cloud-snapshot
/// namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Dataset id: a remote grower/farm grouping id for cloud entries, a
    /// locally minted id for anonymous ones.
    pub id: String,
    /// Dataset display name.
    pub name: String,
    /// The dataset's feature collection.
    pub geojson: FeatureCollection,
    /// Last time the dataset changed.
    pub updated_at: DateTime<Utc>,
    /// Number of features in `geojson`.
    pub feature_count: usize,
}

/// Where a dataset listing came from, so callers can warn appropriately
/// when showing possibly stale data.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "lowercase")]
pub enum Provenance {
    /// Live remote fetch succeeded.
    Cloud,
    /// Remote fetch failed; served from the last cloud snapshot.
    Cache,
    /// Neither remote nor cache was readable.
    Error,
    /// Anonymous session; local store only.
    Local,
}

/// A dataset listing with its provenance label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetListing {
    /// The datasets, name-sorted.
    pub datasets: Vec<CacheEntry>,
    /// Where the listing came from.
    pub provenance: Provenance,
}

// ── Fingerprints & matching ──────────────────────────────────────────────────

/// Content signature of a stored dataset, used to recognize re-uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFingerprint {
    /// Dataset id the signature belongs to.
    pub id: String,
    /// Dataset display name (compared after normalization for the exact
    /// name short-circuit).
    pub name: String,
    /// Set of normalized attribute tokens, one per distinct feature identity.
    pub signature: BTreeSet<String>,
    /// Feature count of the fingerprinted dataset.
    pub feature_count: usize,
}

/// Why an upload was matched to an existing dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase", tag = "kind", rename_all_fields = "camelCase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchReason {
    /// Exact normalized-name equality. Authoritative; skips scoring.
    Name,
    /// Signature similarity cleared the thresholds.
    Attributes {
        /// Mean of precision and recall against the matched dataset.
        score: f64,
        /// Shared signature token count.
        overlap: usize,
    },
}

// ── Attribute mapping ────────────────────────────────────────────────────────

/// Correspondence from source property keys to the canonical fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    /// Source key holding the grower name.
    pub grower: String,
    /// Source key holding the farm name.
    pub farm: String,
    /// Source key holding the field name.
    pub field: String,
    /// Source key holding the crop type, when one was assigned.
    pub crop: Option<String>,
}

impl FieldMapping {
    /// The three source keys that must resolve for the mapping to be usable.
    #[must_use]
    pub fn required_keys(&self) -> [&str; 3] {
        [&self.grower, &self.farm, &self.field]
    }
}

/// The persisted attribute-mapping record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMapping {
    /// The remembered key correspondence.
    pub mapping: FieldMapping,
    /// Whether the user asked for it to persist across sessions.
    pub remember: bool,
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Hand-off emitted after every successful normalize+map, consumed by the
/// rendering layer and the local-save bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    /// Resolved dataset name (matched dataset's name, or a de-duplicated
    /// new name).
    pub name: String,
    /// The mapped feature collection.
    pub geojson: FeatureCollection,
    /// File the collection came from.
    pub source_filename: String,
    /// Id of the matched dataset, when the upload was recognized as an
    /// update.
    pub matched_dataset_id: Option<String>,
    /// How the match was made, when one was.
    pub match_reason: Option<MatchReason>,
}
