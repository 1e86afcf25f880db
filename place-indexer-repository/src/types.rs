//! Request and response types for index and gazetteer operations.

use std::collections::{BTreeSet, HashMap};

use place_indexer_shared::{AddressRow, PlaceRow, UpdateMarker};

use crate::errors::SearchIndexError;

/// Result of a batch operation for a single item.
///
/// This struct represents the outcome of a single operation within a batch (indexing
/// or deleting one document). It indicates whether the operation succeeded and
/// includes error details if it failed.
#[derive(Debug, Clone)]
pub struct BatchOperationResult {
    /// The place the document belongs to.
    pub place_id: i64,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error if the operation failed.
    pub error: Option<SearchIndexError>,
}

impl BatchOperationResult {
    /// A successful item.
    pub fn ok(place_id: i64) -> Self {
        Self {
            place_id,
            success: true,
            error: None,
        }
    }

    /// A failed item.
    pub fn failed(place_id: i64, error: SearchIndexError) -> Self {
        Self {
            place_id,
            success: false,
            error: Some(error),
        }
    }
}

/// Summary of a batch operation containing aggregate statistics and individual results.
///
/// This struct provides a complete overview of a bulk operation, including the total
/// number of items processed, how many succeeded and failed, and detailed results for
/// each individual item. This allows callers to retry only the failed items.
#[derive(Debug, Clone, Default)]
pub struct BatchOperationSummary {
    /// Total number of items in the batch.
    pub total: usize,
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Individual results for each item.
    pub results: Vec<BatchOperationResult>,
}

impl BatchOperationSummary {
    /// Build a summary from per-item results.
    pub fn from_results(results: Vec<BatchOperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Returns true if every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Ids of the items that failed.
    pub fn failed_ids(&self) -> Vec<i64> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.place_id)
            .collect()
    }

    /// The first error reported, if any.
    pub fn first_error(&self) -> Option<&SearchIndexError> {
        self.results.iter().find_map(|r| r.error.as_ref())
    }
}

/// Cluster health as reported by the index backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexHealth {
    Green,
    Yellow,
    Red,
}

impl IndexHealth {
    /// Parse the backend's status string.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "green" => Some(Self::Green),
            "yellow" => Some(Self::Yellow),
            "red" => Some(Self::Red),
            _ => None,
        }
    }

    /// Returns true if reads and writes are served (green or yellow).
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Red)
    }
}

/// One keyset page of subject rows.
#[derive(Debug, Clone, Default)]
pub struct PlacePage {
    /// Successfully decoded rows, ordered by `place_id`.
    pub rows: Vec<PlaceRow>,
    /// Rows that failed to decode and were skipped.
    pub skipped: usize,
    /// Ids of skipped rows whose `place_id` could still be read. These places exist
    /// upstream; they are not deletions.
    pub skipped_ids: Vec<i64>,
    /// Highest `place_id` seen on this page (decoded or not). `None` when the page is empty,
    /// which marks the end of the scan.
    pub last_place_id: Option<i64>,
}

impl PlacePage {
    /// Returns true if the scan is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.last_place_id.is_none()
    }
}

/// Ancestor chains for a set of subjects.
#[derive(Debug, Clone, Default)]
pub struct AddressChains {
    /// Chains per subject, nearest ancestor first.
    pub chains: HashMap<i64, Vec<AddressRow>>,
    /// Subjects with at least one undecodable ancestor row. Their chains are left out of
    /// `chains`; building from a chain with a gap would fill slots from farther ancestors.
    pub incomplete: BTreeSet<i64>,
}

impl AddressChains {
    /// Take the chain of a subject. `None` if the chain is incomplete.
    pub fn take(&mut self, place_id: i64) -> Option<Vec<AddressRow>> {
        if self.incomplete.contains(&place_id) {
            return None;
        }
        Some(self.chains.remove(&place_id).unwrap_or_default())
    }
}

/// Result of scanning the change log after a marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaScan {
    /// Places that were inserted or modified and still exist.
    pub changed: BTreeSet<i64>,
    /// Places that were removed (or no longer qualify as subjects).
    pub deleted: BTreeSet<i64>,
    /// Marker covering every change in this scan.
    pub new_marker: UpdateMarker,
}

impl DeltaScan {
    /// An empty scan that leaves the marker where it was.
    pub fn empty(marker: UpdateMarker) -> Self {
        Self {
            changed: BTreeSet::new(),
            deleted: BTreeSet::new(),
            new_marker: marker,
        }
    }

    /// Returns true if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_from_results() {
        let summary = BatchOperationSummary::from_results(vec![
            BatchOperationResult::ok(1),
            BatchOperationResult::failed(2, SearchIndexError::bulk_index("rejected")),
            BatchOperationResult::ok(3),
        ]);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_complete());
        assert_eq!(summary.failed_ids(), vec![2]);
        assert!(matches!(
            summary.first_error(),
            Some(SearchIndexError::BulkIndexError(_))
        ));
    }

    #[test]
    fn test_empty_summary_is_complete() {
        let summary = BatchOperationSummary::from_results(vec![]);
        assert!(summary.is_complete());
        assert!(summary.failed_ids().is_empty());
    }

    #[test]
    fn test_index_health_parse() {
        assert_eq!(IndexHealth::parse("yellow"), Some(IndexHealth::Yellow));
        assert_eq!(IndexHealth::parse("purple"), None);
        assert!(IndexHealth::Green.is_available());
        assert!(!IndexHealth::Red.is_available());
    }

    #[test]
    fn test_incomplete_chain_is_not_handed_out() {
        let mut chains = AddressChains::default();
        chains.chains.insert(1, Vec::new());
        chains.incomplete.insert(2);

        assert_eq!(chains.take(1), Some(Vec::new()));
        assert_eq!(chains.take(2), None);
        // subjects without ancestors get an empty chain
        assert_eq!(chains.take(3), Some(Vec::new()));
    }

    #[test]
    fn test_delta_scan_empty() {
        let scan = DeltaScan::empty(UpdateMarker(9));
        assert!(scan.is_empty());
        assert_eq!(scan.new_marker, UpdateMarker(9));
    }
}
