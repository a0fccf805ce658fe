//! Cloud image metadata types.

use serde::{Deserialize, Serialize};

/// Attributes that describe an image, as opposed to identifying it.
///
/// Everything here except `version` and `root_storage_size` feeds the
/// natural key; `version` is derived from `series`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MetadataAttributes {
    /// Where the image comes from, e.g. "public" or "custom".
    pub source: String,
    /// e.g. "released" or "daily".
    pub stream: String,
    pub region: String,
    /// OS version, e.g. "14.04". Filled in from `series` when saving.
    pub version: String,
    /// OS series, e.g. "trusty". Required.
    pub series: String,
    pub arch: String,
    /// e.g. "pv", "hvm".
    pub virt_type: String,
    /// e.g. "ebs", "instance".
    pub root_storage_type: String,
    /// Root storage size in gigabytes.
    pub root_storage_size: Option<u64>,
}

/// One image record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Metadata {
    #[serde(flatten)]
    pub attributes: MetadataAttributes,
    /// Higher numbers rank first.
    pub priority: i32,
    pub image_id: String,
}

/// Criteria for finding image metadata.
///
/// Empty fields match everything. Source and size do not discriminate images,
/// so they cannot be filtered on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MetadataFilter {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arches: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stream: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub virt_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root_storage_type: String,
}
