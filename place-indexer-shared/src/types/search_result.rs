//! Search result types for the geocoding surface.
//!
//! This module defines the response structures returned from forward and reverse searches,
//! and their GeoJSON rendering.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::geo::Centroid;
use crate::types::names::{localized, Names};
use crate::types::place::OsmType;
use crate::types::place_document::PlaceDocument;

/// A single search result item.
///
/// All name fields are already resolved to the requested language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub place_id: i64,
    pub osm_type: OsmType,
    pub osm_id: i64,
    pub osm_key: String,
    pub osm_value: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub housenumber: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countrycode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<[f64; 4]>,

    pub centroid: Centroid,

    /// Relevance score from the search engine.
    /// Higher scores indicate better matches.
    pub relevance_score: f64,

    /// Distance from the query point in metres (reverse search only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

impl SearchResult {
    /// Resolve a stored document into a result for the given language.
    pub fn from_document(
        doc: &PlaceDocument,
        language: Option<&str>,
        relevance_score: f64,
        distance_m: Option<f64>,
    ) -> Self {
        let pick = |names: &Option<Names>| {
            names
                .as_ref()
                .and_then(|n| localized(n, language))
                .map(str::to_string)
        };

        Self {
            place_id: doc.place_id,
            osm_type: doc.osm_type,
            osm_id: doc.osm_id,
            osm_key: doc.osm_key.clone(),
            osm_value: doc.osm_value.clone(),
            name: localized(&doc.names, language).map(str::to_string),
            housenumber: doc.house_number.clone(),
            street: pick(&doc.street),
            city: pick(&doc.city),
            state: pick(&doc.state),
            country: pick(&doc.country),
            postcode: doc.postcode.clone(),
            countrycode: doc.country_code.as_ref().map(|cc| cc.to_ascii_uppercase()),
            extent: doc.extent.map(|bbox| bbox.to_extent()),
            centroid: doc.centroid,
            relevance_score,
            distance_m,
        }
    }

    fn properties(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        properties.insert("osm_type".to_string(), json!(self.osm_type.as_str()));
        properties.insert("osm_id".to_string(), json!(self.osm_id));
        properties.insert("osm_key".to_string(), json!(self.osm_key));
        properties.insert("osm_value".to_string(), json!(self.osm_value));

        let optional = [
            ("name", &self.name),
            ("housenumber", &self.housenumber),
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("country", &self.country),
            ("postcode", &self.postcode),
            ("countrycode", &self.countrycode),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                properties.insert(key.to_string(), json!(value));
            }
        }

        if let Some(extent) = self.extent {
            properties.insert("extent".to_string(), json!(extent));
        }
        properties
    }

    /// Render as a GeoJSON `Feature`.
    pub fn to_feature(&self) -> Value {
        json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": [self.centroid.lon, self.centroid.lat],
            },
            "properties": self.properties(),
        })
    }
}

/// Complete search response with results and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    /// The list of search results, ordered by relevance (or distance for reverse search).
    pub results: Vec<SearchResult>,

    /// Total number of matching documents.
    pub total: u64,

    /// Time taken to execute the search in milliseconds.
    pub took_ms: u64,
}

impl SearchResponse {
    /// Create an empty search response.
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            total: 0,
            took_ms: 0,
        }
    }

    /// Create a new search response.
    pub fn new(results: Vec<SearchResult>, total: u64, took_ms: u64) -> Self {
        Self {
            results,
            total,
            took_ms,
        }
    }

    /// Returns true if there are no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns the number of results in this response.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Render as a GeoJSON `FeatureCollection`.
    pub fn to_feature_collection(&self) -> Value {
        json!({
            "type": "FeatureCollection",
            "features": self.results.iter().map(SearchResult::to_feature).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::geo::BoundingBox;

    fn names(pairs: &[(&str, &str)]) -> Names {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn document() -> PlaceDocument {
        PlaceDocument {
            place_id: 11,
            osm_type: OsmType::Node,
            osm_id: 240109189,
            osm_key: "place".to_string(),
            osm_value: "city".to_string(),
            names: names(&[("default", "München"), ("en", "Munich")]),
            house_number: None,
            postcode: Some("80331".to_string()),
            country_code: Some("de".to_string()),
            country: Some(names(&[("default", "Deutschland"), ("en", "Germany")])),
            state: Some(names(&[("default", "Bayern"), ("en", "Bavaria")])),
            city: None,
            street: None,
            context: vec![],
            centroid: Centroid::new(48.137, 11.575),
            extent: Some(BoundingBox {
                min_lat: 48.06,
                min_lon: 11.36,
                max_lat: 48.25,
                max_lon: 11.72,
            }),
            importance: 0.8,
            rank_address: 16,
        }
    }

    #[test]
    fn test_search_response_empty() {
        let response = SearchResponse::empty();
        assert!(response.is_empty());
        assert_eq!(response.len(), 0);
        assert_eq!(response.total, 0);
    }

    #[test]
    fn test_from_document_localizes() {
        let result = SearchResult::from_document(&document(), Some("en"), 2.0, None);
        assert_eq!(result.name.as_deref(), Some("Munich"));
        assert_eq!(result.state.as_deref(), Some("Bavaria"));
        assert_eq!(result.country.as_deref(), Some("Germany"));
        assert_eq!(result.countrycode.as_deref(), Some("DE"));

        let result = SearchResult::from_document(&document(), Some("fr"), 2.0, None);
        assert_eq!(result.name.as_deref(), Some("München"));
    }

    #[test]
    fn test_feature_collection_shape() {
        let result = SearchResult::from_document(&document(), None, 1.0, None);
        let response = SearchResponse::new(vec![result], 1, 3);
        let geojson = response.to_feature_collection();

        assert_eq!(geojson["type"], "FeatureCollection");
        let feature = &geojson["features"][0];
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["geometry"]["coordinates"][0], 11.575);
        assert_eq!(feature["geometry"]["coordinates"][1], 48.137);
        assert_eq!(feature["properties"]["osm_type"], "node");
        assert_eq!(feature["properties"]["name"], "München");
        assert_eq!(feature["properties"]["postcode"], "80331");
        assert_eq!(feature["properties"]["extent"][0], 11.36);
        assert!(feature["properties"].get("street").is_none());
    }
}
