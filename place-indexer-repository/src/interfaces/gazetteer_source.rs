//! Gazetteer source trait definition.

use async_trait::async_trait;

use place_indexer_shared::{CountryFilter, UpdateMarker};

use crate::errors::GazetteerError;
use crate::types::{AddressChains, DeltaScan, PlacePage};

/// Read-only access to the gazetteer database.
///
/// Row-level decode failures are reported through [`PlacePage::skipped`] and
/// [`AddressChains::incomplete`], never as `Err`. An `Err` means the query itself failed
/// (connectivity, missing schema objects) or the rows are unreadable in a way that points
/// at the schema rather than the data.
#[async_trait]
pub trait GazetteerSource: Send + Sync {
    /// Read the next page of subject rows with `place_id > after`, ascending.
    async fn read_places(
        &self,
        filter: &CountryFilter,
        after: Option<i64>,
        limit: usize,
    ) -> Result<PlacePage, GazetteerError>;

    /// Read the subject rows for specific places. Ids that no longer exist (or no longer
    /// qualify as subjects) are absent from the page; ids that exist but failed to decode
    /// are listed in [`PlacePage::skipped_ids`].
    async fn fetch_places(&self, place_ids: &[i64]) -> Result<PlacePage, GazetteerError>;

    /// Ancestor chains for a set of places, nearest first
    /// (`rank_address` descending, then `place_id`). The subject itself is never part of
    /// its own chain. Places without ancestors map to an empty chain or are absent.
    async fn address_chains(&self, place_ids: &[i64]) -> Result<AddressChains, GazetteerError>;

    /// The newest position of the change log.
    async fn current_marker(&self) -> Result<UpdateMarker, GazetteerError>;

    /// Places changed or deleted strictly after `since`.
    async fn read_changes(&self, since: UpdateMarker) -> Result<DeltaScan, GazetteerError>;

    /// Places whose address chain contains any of the given ancestors.
    async fn find_dependents(&self, ancestor_ids: &[i64]) -> Result<Vec<i64>, GazetteerError>;
}
