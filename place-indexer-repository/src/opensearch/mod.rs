//! OpenSearch implementation of the index providers.
//!
//! This module provides a concrete implementation of `SearchIndexProvider` and
//! `PlaceSearchProvider` using OpenSearch as the backend.

mod index_config;
mod provider;
pub mod query;

pub use index_config::{
    get_index_settings, get_versioned_index_name, IndexConfig, DEFAULT_INDEX_ALIAS,
};
pub use provider::{OpenSearchProvider, DEFAULT_MAX_BATCH_SIZE};
