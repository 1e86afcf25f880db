//! Query types of the geocoding surface.
//!
//! This module defines the forward (text) and reverse (coordinate) query structures.

use serde::{Deserialize, Serialize};

use crate::types::geo::Centroid;

/// Default number of forward results.
pub const DEFAULT_FORWARD_LIMIT: usize = 15;

/// Hard cap on forward results.
pub const MAX_FORWARD_LIMIT: usize = 50;

/// Default reverse search radius in kilometres.
pub const DEFAULT_REVERSE_RADIUS_KM: f64 = 1.0;

/// Hard cap on the reverse search radius in kilometres.
pub const MAX_REVERSE_RADIUS_KM: f64 = 100.0;

/// Forward geocoding request.
///
/// Matches the free text against the place names, the ancestor names and the context
/// names. When a bias point is given, results closer to it score higher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwardQuery {
    /// The free-text query.
    pub query: String,

    /// Maximum number of results to return.
    /// Default is 15, maximum is 50.
    #[serde(default = "default_forward_limit")]
    pub limit: usize,

    /// Preferred language for matching boosts and result names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Location bias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<Centroid>,
}

fn default_forward_limit() -> usize {
    DEFAULT_FORWARD_LIMIT
}

impl ForwardQuery {
    /// Create a new forward query with default limit and no language or bias.
    ///
    /// # Example
    ///
    /// ```
    /// use place_indexer_shared::ForwardQuery;
    ///
    /// let query = ForwardQuery::new("berlin").with_limit(500);
    /// assert_eq!(query.limit, 50);
    /// ```
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_FORWARD_LIMIT,
            language: None,
            bias: None,
        }
    }

    /// Set the limit for results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_FORWARD_LIMIT);
        self
    }

    /// Set the preferred language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the location bias.
    pub fn with_bias(mut self, lat: f64, lon: f64) -> Self {
        self.bias = Some(Centroid::new(lat, lon));
        self
    }

    /// Limit clamped into `1..=MAX_FORWARD_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_FORWARD_LIMIT)
    }

    /// Validate the query parameters.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("Query string cannot be empty".to_string());
        }

        if self.limit == 0 {
            return Err("Limit must be at least 1".to_string());
        }

        if let Some(bias) = &self.bias {
            if !bias.is_valid() {
                return Err(format!(
                    "Bias coordinate out of range: lat={}, lon={}",
                    bias.lat, bias.lon
                ));
            }
        }

        Ok(())
    }
}

/// Reverse geocoding request.
///
/// Both coordinates are optional at the type level so that a request missing one of them
/// can be rejected with a proper validation message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReverseQuery {
    #[serde(default)]
    pub lat: Option<f64>,

    #[serde(default)]
    pub lon: Option<f64>,

    /// Search radius in kilometres.
    #[serde(default = "default_reverse_radius")]
    pub radius_km: f64,

    /// Maximum number of results. Default is 1.
    #[serde(default = "default_reverse_limit")]
    pub limit: usize,

    /// Language for result names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

fn default_reverse_radius() -> f64 {
    DEFAULT_REVERSE_RADIUS_KM
}

fn default_reverse_limit() -> usize {
    1
}

impl ReverseQuery {
    /// Create a reverse query around a point.
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            lat: Some(lat),
            lon: Some(lon),
            radius_km: DEFAULT_REVERSE_RADIUS_KM,
            limit: default_reverse_limit(),
            language: None,
        }
    }

    /// Set the search radius.
    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    /// Set the limit for results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_FORWARD_LIMIT);
        self
    }

    /// Set the result language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// The query point, if both coordinates are present.
    pub fn point(&self) -> Option<Centroid> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Centroid::new(lat, lon)),
            _ => None,
        }
    }

    /// Validate the query parameters.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        let point = match self.point() {
            Some(point) => point,
            None => return Err("Both lat and lon are required".to_string()),
        };

        if !point.is_valid() {
            return Err(format!(
                "Coordinate out of range: lat={}, lon={}",
                point.lat, point.lon
            ));
        }

        if !self.radius_km.is_finite() || self.radius_km <= 0.0 {
            return Err("Radius must be a positive number".to_string());
        }

        if self.radius_km > MAX_REVERSE_RADIUS_KM {
            return Err(format!(
                "Radius cannot exceed {} km",
                MAX_REVERSE_RADIUS_KM
            ));
        }

        if self.limit == 0 || self.limit > MAX_FORWARD_LIMIT {
            return Err(format!("Limit must be between 1 and {}", MAX_FORWARD_LIMIT));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_query_defaults() {
        let query = ForwardQuery::new("berlin");
        assert_eq!(query.limit, 15);
        assert!(query.language.is_none());
        assert!(query.bias.is_none());
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_forward_query_deserialize_defaults() {
        let query: ForwardQuery = serde_json::from_str(r#"{"query":"paris"}"#).unwrap();
        assert_eq!(query.limit, DEFAULT_FORWARD_LIMIT);
    }

    #[test]
    fn test_forward_query_validation() {
        assert!(ForwardQuery::new("").validate().is_err());
        assert!(ForwardQuery::new("   ").validate().is_err());

        let mut query = ForwardQuery::new("berlin");
        query.limit = 0;
        assert!(query.validate().is_err());

        let query = ForwardQuery::new("berlin").with_bias(95.0, 13.0);
        assert!(query.validate().is_err());

        let query = ForwardQuery::new("berlin").with_bias(52.5, 13.4);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_forward_effective_limit_caps() {
        let mut query = ForwardQuery::new("berlin");
        query.limit = 1000;
        assert_eq!(query.effective_limit(), 50);
    }

    #[test]
    fn test_reverse_requires_both_coordinates() {
        let query: ReverseQuery = serde_json::from_str(r#"{"lat": 52.5}"#).unwrap();
        assert!(query.point().is_none());
        assert!(query.validate().is_err());

        let query: ReverseQuery = serde_json::from_str(r#"{"lat": 52.5, "lon": 13.4}"#).unwrap();
        assert_eq!(query.radius_km, 1.0);
        assert_eq!(query.limit, 1);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_reverse_validation_ranges() {
        assert!(ReverseQuery::at(-91.0, 0.0).validate().is_err());
        assert!(ReverseQuery::at(0.0, 200.0).validate().is_err());
        assert!(ReverseQuery::at(0.0, 0.0).with_radius_km(0.0).validate().is_err());
        assert!(ReverseQuery::at(0.0, 0.0).with_radius_km(500.0).validate().is_err());
        assert!(ReverseQuery::at(0.0, 0.0).with_radius_km(2.5).validate().is_ok());
    }
}
