//! # Place Indexer Repository
//!
//! This crate provides traits and implementations for the external collaborators of the
//! place indexer: the search index (written by the pipelines, read by the geocoding
//! surface) and the gazetteer database (read-only source of places and changes).
//! It includes definitions for errors, interfaces, and concrete implementations for
//! OpenSearch and PostgreSQL.

pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod postgres;
pub mod types;

pub use errors::{GazetteerError, SearchIndexError};
pub use interfaces::{GazetteerSource, PlaceSearchProvider, SearchIndexProvider};
pub use opensearch::{IndexConfig, OpenSearchProvider};
pub use postgres::{GazetteerConfig, PostgresGazetteer};
pub use types::{
    AddressChains, BatchOperationResult, BatchOperationSummary, DeltaScan, IndexHealth, PlacePage,
};
