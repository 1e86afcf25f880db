//! Query construction and response parsing for the place index.
//!
//! Kept free of I/O so the request bodies can be tested without a cluster.

use serde_json::{json, Value};

use place_indexer_shared::types::names::DEFAULT_LANGUAGE;
use place_indexer_shared::{ForwardQuery, PlaceDocument, ReverseQuery, SearchResponse, SearchResult};

use crate::errors::SearchIndexError;
use crate::opensearch::index_config::NAME_FIELDS;

/// Boost applied to the subject's own names over ancestor names.
const NAMES_BOOST: u32 = 3;

/// Extra boost for the requested language.
const LANGUAGE_BOOST: u32 = 5;

/// Distance at which the location bias halves its contribution.
const BIAS_SCALE: &str = "50km";

/// Matching strictness of a forward search tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    /// Every term must match, no typos.
    Strict,
    /// Typo tolerant; used only when the strict tier found nothing.
    Fuzzy,
}

/// Fields the forward query matches against.
pub fn forward_fields(language: Option<&str>) -> Vec<String> {
    let mut fields = Vec::new();
    for field in NAME_FIELDS {
        if field == "names" {
            fields.push(format!("names.*^{}", NAMES_BOOST));
        } else {
            fields.push(format!("{}.*", field));
        }
    }
    if let Some(language) = language.filter(|l| *l != DEFAULT_LANGUAGE) {
        fields.push(format!("names.{}^{}", language, LANGUAGE_BOOST));
    }
    fields.push("house_number".to_string());
    fields.push("postcode".to_string());
    fields
}

/// Build the search body for one forward tier.
///
/// The text score is multiplied by the place importance; a gauss decay around the bias
/// point is added when one is supplied.
pub fn build_forward_query(query: &ForwardQuery, tier: MatchTier) -> Value {
    let fields = forward_fields(query.language.as_deref());

    let text_query = match tier {
        MatchTier::Strict => json!({
            "multi_match": {
                "query": query.query.trim(),
                "fields": fields,
                "type": "cross_fields",
                "operator": "and"
            }
        }),
        MatchTier::Fuzzy => json!({
            "multi_match": {
                "query": query.query.trim(),
                "fields": fields,
                "type": "best_fields",
                "fuzziness": "AUTO",
                "prefix_length": 1,
                "operator": "or",
                "minimum_should_match": "2<75%"
            }
        }),
    };

    let mut functions = vec![json!({
        "field_value_factor": {
            "field": "importance",
            "modifier": "log2p",
            "missing": 0.0
        }
    })];

    if let Some(bias) = &query.bias {
        functions.push(json!({
            "gauss": {
                "centroid": {
                    "origin": { "lat": bias.lat, "lon": bias.lon },
                    "scale": BIAS_SCALE,
                    "decay": 0.5
                }
            },
            "weight": 0.5
        }));
    }

    json!({
        "size": query.effective_limit(),
        "track_total_hits": true,
        "query": {
            "function_score": {
                "query": text_query,
                "functions": functions,
                "score_mode": "sum",
                "boost_mode": "multiply"
            }
        }
    })
}

/// Build the search body for a reverse query.
pub fn build_reverse_query(query: &ReverseQuery) -> Result<Value, SearchIndexError> {
    let point = query
        .point()
        .ok_or_else(|| SearchIndexError::validation("Reverse query requires lat and lon"))?;

    let origin = json!({ "lat": point.lat, "lon": point.lon });

    Ok(json!({
        "size": query.limit,
        "track_total_hits": true,
        "query": {
            "bool": {
                "filter": {
                    "geo_distance": {
                        "distance": format!("{}km", query.radius_km),
                        "centroid": origin
                    }
                }
            }
        },
        "sort": [
            {
                "_geo_distance": {
                    "centroid": origin,
                    "order": "asc",
                    "unit": "m"
                }
            }
        ]
    }))
}

/// Parse a `_search` response body into a search response.
///
/// `with_distance` reads the distance from the first sort value (reverse search).
pub fn parse_search_response(
    body: &Value,
    language: Option<&str>,
    with_distance: bool,
) -> Result<SearchResponse, SearchIndexError> {
    let hits = body["hits"]["hits"]
        .as_array()
        .ok_or_else(|| SearchIndexError::parse("Search response has no hits array"))?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let source = hit
            .get("_source")
            .ok_or_else(|| SearchIndexError::parse("Search hit without _source"))?;
        let doc: PlaceDocument = serde_json::from_value(source.clone())
            .map_err(|e| SearchIndexError::parse(format!("Invalid document in hit: {}", e)))?;

        let score = hit["_score"].as_f64().unwrap_or(0.0);
        let distance = if with_distance {
            hit["sort"].get(0).and_then(Value::as_f64)
        } else {
            None
        };

        results.push(SearchResult::from_document(&doc, language, score, distance));
    }

    let total = body["hits"]["total"]["value"]
        .as_u64()
        .unwrap_or(results.len() as u64);
    let took_ms = body["took"].as_u64().unwrap_or(0);

    Ok(SearchResponse::new(results, total, took_ms))
}
