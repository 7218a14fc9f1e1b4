//! Records returned in the `data` field of API responses, and the filter
//! objects shared by several request payloads.
//!
//! Field names follow the Inventory API data model (camelCase on the wire).
//! Nearly everything is optional: the service omits fields freely depending on
//! the dataset and on request flags such as `includeSpatial`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub east: f64,
    pub south: f64,
    pub west: f64,
}

/// `grid2ll` result: a centre point or the corners of a polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GridShape {
    Shape { coordinates: Vec<Coordinate> },
    Points(Vec<Coordinate>),
}

impl GridShape {
    pub fn coordinates(&self) -> &[Coordinate] {
        match self {
            GridShape::Shape { coordinates } => coordinates,
            GridShape::Points(points) => points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filterType", rename_all = "lowercase")]
pub enum SpatialFilter {
    /// Minimum bounding rectangle.
    #[serde(rename_all = "camelCase")]
    Mbr {
        lower_left: Coordinate,
        upper_right: Coordinate,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalFilter {
    pub start_date: String,
    pub end_date: String,
    /// Only used by `deletionsearch` (`"deleted"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_field: Option<String>,
}

/// Metadata criteria for `search`, `hits` and `deletionsearch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filterType", rename_all = "lowercase")]
pub enum SearchFilter {
    #[serde(rename_all = "camelCase")]
    And { child_filters: Vec<SearchFilter> },
    #[serde(rename_all = "camelCase")]
    Or { child_filters: Vec<SearchFilter> },
    #[serde(rename_all = "camelCase")]
    Between {
        field_id: i64,
        first_value: String,
        second_value: String,
    },
    #[serde(rename_all = "camelCase")]
    Value {
        field_id: i64,
        value: String,
        #[serde(default)]
        operand: Operand,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Operand {
    #[default]
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = "like")]
    Like,
}

// Anything other than "like" is sent as "=".
impl<'de> Deserialize<'de> for Operand {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(if s.trim().eq_ignore_ascii_case("like") {
            Operand::Like
        } else {
            Operand::Equals
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub build_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub dataset_name: String,
    #[serde(default)]
    pub dataset_full_name: Option<String>,
    #[serde(default)]
    pub idn_entry_id: Option<String>,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub last_modified_date: Option<String>,
    #[serde(default)]
    pub support_cloud_cover: Option<bool>,
    #[serde(default)]
    pub support_deletion_inventory: Option<bool>,
    #[serde(default)]
    pub support_download: Option<bool>,
    #[serde(default)]
    pub support_bulk_download: Option<bool>,
    #[serde(default)]
    pub bulk_download_order_limit: Option<i64>,
    #[serde(default)]
    pub support_order: Option<bool>,
    #[serde(default)]
    pub order_limit: Option<i64>,
    #[serde(default)]
    pub total_scenes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetField {
    pub field_id: i64,
    pub name: String,
    #[serde(default)]
    pub field_link: Option<String>,
    #[serde(default)]
    pub value_list: Vec<Value>,
}

/// `idlookup` result: input ID -> translated ID.
pub type IdLookupResult = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub number_returned: u64,
    #[serde(default)]
    pub total_hits: u64,
    #[serde(default)]
    pub first_record: u64,
    #[serde(default)]
    pub last_record: u64,
    #[serde(default)]
    pub next_record: u64,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

impl SearchResponse {
    pub fn entity_ids(&self) -> Vec<String> {
        self.results
            .iter()
            .map(|r| match r {
                SearchResult::EntityId(id) => id.clone(),
                SearchResult::Scene(scene) => scene.entity_id.clone(),
            })
            .collect()
    }
}

/// `responseFormat: sceneList` returns bare entity IDs instead of scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchResult {
    EntityId(String),
    Scene(Box<Scene>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub entity_id: String,
    #[serde(default)]
    pub display_id: Option<String>,
    #[serde(default)]
    pub acquisition_date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub modified_date: Option<String>,
    #[serde(default)]
    pub spatial_footprint: Option<Value>,
    #[serde(default)]
    pub scene_bounds: Option<String>,
    #[serde(default)]
    pub browse_url: Option<String>,
    #[serde(default)]
    pub data_access_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub metadata_url: Option<String>,
    #[serde(default)]
    pub fgdc_metadata_url: Option<String>,
    #[serde(default)]
    pub order_url: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionSearchResponse {
    #[serde(default)]
    pub number_returned: u64,
    #[serde(default)]
    pub total_hits: u64,
    #[serde(default)]
    pub first_record: u64,
    #[serde(default)]
    pub last_record: u64,
    #[serde(default)]
    pub next_record: u64,
    #[serde(default)]
    pub results: Vec<DeletedScene>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedScene {
    pub entity_id: String,
    #[serde(default)]
    pub display_id: Option<String>,
    #[serde(default)]
    pub acquisition_date: Option<String>,
    #[serde(default)]
    pub deletion_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataAccess {
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub order_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataField {
    pub field_name: String,
    #[serde(default)]
    pub description_link: Option<String>,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMetadata {
    #[serde(flatten)]
    pub scene: Scene,
    #[serde(default)]
    pub data_access: Option<DataAccess>,
    #[serde(default)]
    pub metadata_fields: Vec<MetadataField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDownloadOptions {
    pub entity_id: String,
    #[serde(default)]
    pub download_options: Vec<DownloadOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOption {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub download_code: Option<String>,
    #[serde(default)]
    pub product_code: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub storage_location: Option<String>,
}

/// One entry of the `download` response: a resolved URL for one product of
/// one scene. This is what the bulk downloader consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadRecord {
    /// Product type of the record (`FR_BUND`, `STANDARD`, ...).
    pub fn product_type(&self) -> Option<&str> {
        self.product.as_deref().or(self.product_code.as_deref())
    }
}
