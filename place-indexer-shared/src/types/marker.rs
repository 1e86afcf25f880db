//! The "last processed" marker of the incremental update cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in the gazetteer's change log.
///
/// Monotonically increasing; a delta scan returns every change strictly after the marker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(transparent)]
pub struct UpdateMarker(pub i64);

impl UpdateMarker {
    /// The raw sequence value.
    pub fn sequence(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UpdateMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted form of the marker, stored alongside the index.
///
/// A full rebuild replaces the record with one that has no sequence and `rebuilding` set,
/// and only a committed import writes a sequence again. An index whose record is still
/// `rebuilding` was left half populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkerRecord {
    pub sequence: Option<UpdateMarker>,
    #[serde(default)]
    pub rebuilding: bool,
    pub recorded_at: DateTime<Utc>,
}

impl MarkerRecord {
    /// Record a marker with the current time.
    pub fn now(sequence: UpdateMarker) -> Self {
        Self {
            sequence: Some(sequence),
            rebuilding: false,
            recorded_at: Utc::now(),
        }
    }

    /// Record the start of a full rebuild.
    pub fn rebuilding() -> Self {
        Self {
            sequence: None,
            rebuilding: true,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_ordering() {
        assert!(UpdateMarker(3) > UpdateMarker(2));
        assert_eq!(UpdateMarker::default(), UpdateMarker(0));
    }

    #[test]
    fn test_marker_record_serialization() {
        let record = MarkerRecord::now(UpdateMarker(42));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sequence"], 42);
        assert!(json["recorded_at"].is_string());

        let back: MarkerRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.sequence, Some(UpdateMarker(42)));
        assert!(!back.rebuilding);
    }

    #[test]
    fn test_rebuilding_record_has_no_sequence() {
        let json = serde_json::to_value(MarkerRecord::rebuilding()).unwrap();
        assert!(json["sequence"].is_null());
        assert_eq!(json["rebuilding"], true);
    }

    #[test]
    fn test_record_without_rebuilding_field() {
        let json = serde_json::json!({ "sequence": 7, "recorded_at": "2024-05-01T00:00:00Z" });
        let record: MarkerRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.sequence, Some(UpdateMarker(7)));
        assert!(!record.rebuilding);
    }
}
