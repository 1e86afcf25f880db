//! Geographic primitives shared by rows, documents and queries.

use serde::{Deserialize, Serialize};

/// A WGS84 point.
///
/// Serialises as `{"lat": .., "lon": ..}`, which OpenSearch accepts for `geo_point` fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
}

impl Centroid {
    /// Create a new point.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns true if both coordinates are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Axis-aligned bounding box of a place geometry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// GeoJSON-style extent: `[min_lon, max_lat, max_lon, min_lat]`.
    pub fn to_extent(&self) -> [f64; 4] {
        [self.min_lon, self.max_lat, self.max_lon, self.min_lat]
    }
}
