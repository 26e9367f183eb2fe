//! Canonical index definitions
//!
//! User-supplied definitions arrive as loose JSON and are validated and
//! canonicalized by the registry before anything is created. The
//! canonical form is what the engine persists and exchanges.

use serde::{Deserialize, Serialize};

/// A validated, canonical index definition.
///
/// `fields` is an ordered list of attribute paths; its arity is
/// enforced per index type by the registry normalizers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    #[serde(rename = "type")]
    pub type_name: String,
    pub fields: Vec<String>,
    pub unique: bool,
    pub sparse: bool,
    pub deduplicate: bool,
    /// Geo indexes over a single field: whether the field holds
    /// GeoJSON-style [lon, lat] data
    #[serde(rename = "geoJson", skip_serializing_if = "Option::is_none")]
    pub geo_json: Option<bool>,
    /// Fulltext indexes: minimum word length
    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    /// Geo indexes in coordinator contexts only
    #[serde(rename = "ignoreNull", skip_serializing_if = "Option::is_none")]
    pub ignore_null: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<bool>,
}

impl IndexDefinition {
    /// A bare definition with defaults for the optional flags
    pub fn new(type_name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
            unique: false,
            sparse: false,
            deduplicate: true,
            geo_json: None,
            min_length: None,
            ignore_null: None,
            constraint: None,
        }
    }

    /// Render the exchange-format JSON value
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("index definition serializes")
    }
}
