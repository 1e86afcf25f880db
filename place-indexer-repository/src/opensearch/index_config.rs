//! OpenSearch index configuration and mappings.
//!
//! This module defines the index settings and mappings for the place index and its
//! companion metadata index.

use serde_json::{json, Map, Value};

/// Configuration for the search index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// The alias name for the search index (used for all reads and writes).
    pub alias: String,
    /// The version number for the index generation (e.g., 0 for "places_v0").
    pub version: u32,
}

impl IndexConfig {
    /// Create a new index configuration.
    ///
    /// # Arguments
    ///
    /// * `alias` - The index alias name
    /// * `version` - The generation number
    pub fn new(alias: impl Into<String>, version: u32) -> Self {
        Self {
            alias: alias.into(),
            version,
        }
    }

    /// Name of the concrete index behind the alias.
    pub fn versioned_index_name(&self) -> String {
        get_versioned_index_name(&self.alias, Some(self.version))
    }

    /// Name of the index holding pipeline metadata (the update marker).
    pub fn meta_index_name(&self) -> String {
        format!("{}_meta", self.alias)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_ALIAS, 0)
    }
}

/// The default alias of the place index.
pub const DEFAULT_INDEX_ALIAS: &str = "places";

/// Document id of the marker record in the metadata index.
pub const MARKER_DOCUMENT_ID: &str = "update_marker";

/// Object fields holding per-language names.
pub const NAME_FIELDS: [&str; 6] = ["names", "country", "state", "city", "street", "context"];

/// Get the versioned index name.
///
/// # Arguments
///
/// * `alias` - The alias the generation is published under
/// * `version` - The version number (defaults to 0 if None)
///
/// # Returns
///
/// The versioned index name (e.g., "places_v0")
pub fn get_versioned_index_name(alias: &str, version: Option<u32>) -> String {
    let v = version.unwrap_or(0);
    format!("{}_v{}", alias, v)
}

/// Dynamic templates mapping every string under a name object to analysed text.
fn name_templates() -> Vec<Value> {
    NAME_FIELDS
        .iter()
        .map(|field| {
            let mut template = Map::new();
            template.insert(
                format!("{}_names", field),
                json!({
                    "path_match": format!("{}.*", field),
                    "match_mapping_type": "string",
                    "mapping": {
                        "type": "text",
                        "analyzer": "place_name"
                    }
                }),
            );
            Value::Object(template)
        })
        .collect()
}

/// Get the index settings and mappings for the place index.
///
/// The configuration includes:
/// - **place_name analyzer**: lowercase + ASCII folding, so "Zürich" matches "zurich"
/// - **Dynamic name objects**: one text field per language under each name object
/// - **geo_point centroid**: for reverse search and location bias
/// - **Keyword fields**: OSM identifiers, postcode, country code
///
/// # Sharding Configuration
///
/// - 1 primary shard
/// - 1 replica for redundancy
pub fn get_index_settings() -> Value {
    let mut properties = Map::new();
    properties.insert("place_id".to_string(), json!({ "type": "long" }));
    properties.insert("osm_type".to_string(), json!({ "type": "keyword" }));
    properties.insert("osm_id".to_string(), json!({ "type": "long" }));
    properties.insert("osm_key".to_string(), json!({ "type": "keyword" }));
    properties.insert("osm_value".to_string(), json!({ "type": "keyword" }));
    for field in NAME_FIELDS {
        properties.insert(field.to_string(), json!({ "type": "object", "dynamic": true }));
    }
    properties.insert(
        "house_number".to_string(),
        json!({ "type": "text", "analyzer": "place_name", "fields": { "raw": { "type": "keyword" } } }),
    );
    properties.insert("postcode".to_string(), json!({ "type": "keyword" }));
    properties.insert("country_code".to_string(), json!({ "type": "keyword" }));
    properties.insert("centroid".to_string(), json!({ "type": "geo_point" }));
    properties.insert(
        "extent".to_string(),
        json!({ "type": "object", "enabled": false }),
    );
    properties.insert("importance".to_string(), json!({ "type": "float" }));
    properties.insert("rank_address".to_string(), json!({ "type": "integer" }));

    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1,
            "analysis": {
                "analyzer": {
                    "place_name": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lowercase", "asciifolding"]
                    }
                }
            }
        },
        "mappings": {
            "dynamic_templates": name_templates(),
            "properties": properties
        }
    })
}

/// Get the settings for the metadata index.
pub fn get_meta_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "properties": {
                "sequence": { "type": "long" },
                "rebuilding": { "type": "boolean" },
                "recorded_at": { "type": "date" }
            }
        }
    })
}
