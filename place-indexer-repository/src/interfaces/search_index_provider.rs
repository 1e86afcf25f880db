//! Search index provider trait definition.
//!
//! This module defines the abstract interface for writing to the place index,
//! allowing for different backend implementations (OpenSearch, in-memory mocks, etc.).

use async_trait::async_trait;

use place_indexer_shared::{PlaceDocument, UpdateMarker};

use crate::errors::SearchIndexError;
use crate::types::{BatchOperationSummary, IndexHealth};

/// Abstracts the underlying search index implementation.
///
/// This trait covers the index lifecycle, whole-document bulk writes keyed by `place_id`,
/// and persistence of the incremental update marker. Implementations are injected into the
/// pipelines to enable easy testing with mock implementations.
///
/// All methods return `Result<T, SearchIndexError>` for consistent error handling across
/// different backend implementations.
///
/// # Partial failures
///
/// Bulk operations do not fail as a whole when individual items are rejected. The returned
/// [`BatchOperationSummary`] lists the outcome per item so that callers can retry the
/// failed ones. An `Err` means the request itself could not be executed.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Create the index generation and point the alias at it.
    ///
    /// Creating an index that already exists is not an error.
    async fn create_index(&self) -> Result<(), SearchIndexError>;

    /// Drop the index generation. Dropping a missing index is not an error.
    async fn drop_index(&self) -> Result<(), SearchIndexError>;

    /// Returns true if the alias resolves to an index.
    async fn index_exists(&self) -> Result<bool, SearchIndexError>;

    /// Insert or fully replace documents, keyed by `place_id`.
    ///
    /// # Arguments
    ///
    /// * `documents` - Complete documents; no partial field updates are performed
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOperationSummary)` - Contains aggregate statistics and individual results
    /// * `Err(SearchIndexError)` - If the bulk request fails entirely
    async fn bulk_upsert_documents(
        &self,
        documents: &[PlaceDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError>;

    /// Delete documents by `place_id`.
    ///
    /// Documents that don't exist are considered successful deletions.
    async fn bulk_delete_documents(
        &self,
        place_ids: &[i64],
    ) -> Result<BatchOperationSummary, SearchIndexError>;

    /// Make all writes so far visible to searches.
    async fn refresh(&self) -> Result<(), SearchIndexError>;

    /// Report cluster health; when `block_until_ready` is set, wait until the
    /// cluster is at least yellow (or the backend's timeout elapses).
    async fn health_check(&self, block_until_ready: bool) -> Result<IndexHealth, SearchIndexError>;

    /// The marker stored with the index, if any.
    async fn get_stored_marker(&self) -> Result<Option<UpdateMarker>, SearchIndexError>;

    /// Persist the marker. Must be durable and visible when this returns. Clears a
    /// rebuild flag set by [`SearchIndexProvider::mark_rebuilding`].
    async fn set_stored_marker(&self, marker: UpdateMarker) -> Result<(), SearchIndexError>;

    /// Record that a full rebuild has started: the stored marker is cleared and the index
    /// counts as incomplete until the next [`SearchIndexProvider::set_stored_marker`].
    async fn mark_rebuilding(&self) -> Result<(), SearchIndexError>;

    /// Returns true if a rebuild was started and never committed.
    async fn is_rebuilding(&self) -> Result<bool, SearchIndexError>;
}
