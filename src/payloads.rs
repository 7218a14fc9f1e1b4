//! Request payloads, one record per API method.
//!
//! Payloads never carry the API key themselves: the client injects it
//! according to the configured request style. They deserialize from the same
//! camelCase keys they serialize to, so a YAML request file can be loaded
//! straight into the matching record.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{SearchFilter, SpatialFilter, TemporalFilter};

fn default_catalog_id() -> String {
    "EE".to_string()
}

fn default_auth_type() -> String {
    "EROS".to_string()
}

fn default_max_results() -> u32 {
    10
}

fn default_starting_number() -> u32 {
    1
}

fn default_sort_order() -> String {
    "ASC".to_string()
}

fn default_sort_field() -> String {
    "acquisitionDate".to_string()
}

fn default_response_format() -> String {
    "standard".to_string()
}

fn default_input_field() -> String {
    "entityId".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_cloud_cover() -> u8 {
    100
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default = "default_catalog_id")]
    pub catalog_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_context: Option<String>,
    #[serde(default = "default_auth_type")]
    pub auth_type: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            catalog_id: default_catalog_id(),
            application_context: None,
            auth_type: default_auth_type(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("catalog_id", &self.catalog_id)
            .field("application_context", &self.application_context)
            .field("auth_type", &self.auth_type)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datasets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_filter: Option<SpatialFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_filter: Option<TemporalFilter>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub public_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionSearch {
    pub dataset_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_filter: Option<TemporalFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_criteria: Option<SearchFilter>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_starting_number")]
    pub starting_number: u32,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
}

impl DeletionSearch {
    pub fn new(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            temporal_filter: None,
            additional_criteria: None,
            max_results: default_max_results(),
            starting_number: default_starting_number(),
            sort_order: default_sort_order(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grid2ll {
    /// `WRS1` or `WRS2`.
    pub grid_type: String,
    /// `point` or `polygon`.
    pub response_shape: String,
    pub path: u32,
    pub row: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdLookup {
    pub dataset_name: String,
    pub id_list: Vec<String>,
    /// `entityId` or `displayId`.
    #[serde(default = "default_input_field")]
    pub input_field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub dataset_name: String,
    pub entity_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub include_data_access: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_false")]
    pub include_browse: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_false")]
    pub include_spatial: bool,
}

impl Metadata {
    pub fn new(dataset_name: impl Into<String>, entity_ids: Vec<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            entity_ids,
            include_data_access: false,
            include_browse: true,
            include_spatial: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Search {
    pub dataset_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_filter: Option<SpatialFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_filter: Option<TemporalFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_update_filter: Option<TemporalFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<u8>>,
    #[serde(default = "default_true")]
    pub include_browse: bool,
    #[serde(default = "default_true")]
    pub include_spatial: bool,
    #[serde(default = "default_true")]
    pub include_unknown_cloud_cover: bool,
    #[serde(default)]
    pub min_cloud_cover: u8,
    #[serde(default = "default_max_cloud_cover")]
    pub max_cloud_cover: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_criteria: Option<SearchFilter>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// `standard` or `sceneList`.
    #[serde(default = "default_response_format")]
    pub response_format: String,
    #[serde(default = "default_starting_number")]
    pub starting_number: u32,
    #[serde(default = "default_sort_field")]
    pub sort_field: String,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
}

impl Search {
    pub fn new(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            spatial_filter: None,
            temporal_filter: None,
            metadata_update_filter: None,
            months: None,
            include_browse: true,
            include_spatial: true,
            include_unknown_cloud_cover: true,
            min_cloud_cover: 0,
            max_cloud_cover: default_max_cloud_cover(),
            additional_criteria: None,
            max_results: default_max_results(),
            response_format: default_response_format(),
            starting_number: default_starting_number(),
            sort_field: default_sort_field(),
            sort_order: default_sort_order(),
        }
    }

    /// Criteria of this search without the paging/sorting parameters.
    pub fn hits(&self) -> Hits {
        Hits {
            dataset_name: self.dataset_name.clone(),
            spatial_filter: self.spatial_filter.clone(),
            temporal_filter: self.temporal_filter.clone(),
            metadata_update_filter: self.metadata_update_filter.clone(),
            months: self.months.clone(),
            include_unknown_cloud_cover: self.include_unknown_cloud_cover,
            min_cloud_cover: self.min_cloud_cover,
            max_cloud_cover: self.max_cloud_cover,
            additional_criteria: self.additional_criteria.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hits {
    pub dataset_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_filter: Option<SpatialFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_filter: Option<TemporalFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_update_filter: Option<TemporalFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<u8>>,
    #[serde(default = "default_true")]
    pub include_unknown_cloud_cover: bool,
    #[serde(default)]
    pub min_cloud_cover: u8,
    #[serde(default = "default_max_cloud_cover")]
    pub max_cloud_cover: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_criteria: Option<SearchFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Download {
    pub dataset_name: String,
    pub entity_ids: Vec<String>,
    /// Product types to resolve, e.g. `STANDARD` or `FR_BUND`.
    pub products: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    pub dataset_name: String,
    pub entity_ids: Vec<String>,
}
