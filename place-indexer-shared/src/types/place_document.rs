//! Place document types for the search index.
//!
//! This module defines the flattened document structure that is indexed in the search engine.

use serde::{Deserialize, Serialize};

use crate::types::geo::{BoundingBox, Centroid};
use crate::types::names::Names;
use crate::types::place::OsmType;

/// Document representation for the search index.
///
/// A place with its address hierarchy resolved into flat per-language fields. Documents
/// are only ever replaced as a whole, keyed by `place_id`.
///
/// # Fields
///
/// - `place_id`: Stable gazetteer identifier, also the index document id
/// - `osm_type`, `osm_id`, `osm_key`, `osm_value`: Source element and its main tag
/// - `names`: Per-language names of the place itself
/// - `house_number`, `postcode`: Addressing values
/// - `country`, `state`, `city`, `street`: Names of the nearest qualifying ancestor of each class
/// - `context`: Other named areas of the hierarchy, nearest first
/// - `centroid`, `extent`: Geometry
/// - `importance`: Relevance prior
/// - `rank_address`: Address rank of the place
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceDocument {
    pub place_id: i64,
    pub osm_type: OsmType,
    pub osm_id: i64,
    pub osm_key: String,
    pub osm_value: String,
    #[serde(default, skip_serializing_if = "Names::is_empty")]
    pub names: Names,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<Names>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Names>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<Names>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<Names>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Names>,
    pub centroid: Centroid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<BoundingBox>,
    pub importance: f64,
    pub rank_address: i32,
}

impl PlaceDocument {
    /// Generate the document ID used in the search index.
    pub fn document_id(&self) -> String {
        self.place_id.to_string()
    }

    /// Returns true if none of the ancestor class slots is set.
    pub fn has_no_address(&self) -> bool {
        self.country.is_none() && self.state.is_none() && self.city.is_none() && self.street.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(value: &str) -> Names {
        let mut names = Names::new();
        names.insert("default".to_string(), value.to_string());
        names
    }

    fn sample() -> PlaceDocument {
        PlaceDocument {
            place_id: 7,
            osm_type: OsmType::Way,
            osm_id: 1234,
            osm_key: "tourism".to_string(),
            osm_value: "attraction".to_string(),
            names: names("berlin"),
            house_number: None,
            postcode: Some("10117".to_string()),
            country_code: Some("de".to_string()),
            country: Some(names("Deutschland")),
            state: None,
            city: Some(names("Berlin")),
            street: None,
            context: vec![],
            centroid: Centroid::new(52.51704, 13.38886),
            extent: None,
            importance: 0.5,
            rank_address: 30,
        }
    }

    #[test]
    fn test_document_id() {
        assert_eq!(sample().document_id(), "7");
    }

    #[test]
    fn test_serialization_skips_unset_fields() {
        let json = serde_json::to_value(sample()).unwrap();

        assert_eq!(json["osm_type"], "way");
        assert_eq!(json["city"]["default"], "Berlin");
        assert!(json.get("state").is_none());
        assert!(json.get("street").is_none());
        assert!(json.get("context").is_none());
        assert!(json.get("extent").is_none());
        assert_eq!(json["centroid"]["lat"], 52.51704);
    }

    #[test]
    fn test_deserialization_from_index_source() {
        let doc = sample();
        let json = serde_json::to_string(&doc).unwrap();
        let back: PlaceDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }

    #[test]
    fn test_has_no_address() {
        let mut doc = sample();
        assert!(!doc.has_no_address());
        doc.country = None;
        doc.city = None;
        assert!(doc.has_no_address());
    }
}
