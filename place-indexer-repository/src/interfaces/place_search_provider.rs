//! Read side of the place index.

use async_trait::async_trait;

use place_indexer_shared::{ForwardQuery, ReverseQuery, SearchResponse};

use crate::errors::SearchIndexError;

/// Executes geocoding queries against the index.
///
/// Both operations are read-only and idempotent. Queries are expected to be validated
/// by the caller.
#[async_trait]
pub trait PlaceSearchProvider: Send + Sync {
    /// Free-text search, ranked by relevance.
    async fn search(&self, query: &ForwardQuery) -> Result<SearchResponse, SearchIndexError>;

    /// Nearest places to a coordinate, ordered by distance.
    async fn reverse(&self, query: &ReverseQuery) -> Result<SearchResponse, SearchIndexError>;
}
