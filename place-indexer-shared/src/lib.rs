//! # Place Indexer Shared
//!
//! This crate defines shared data structures and types used across the place indexer ecosystem.
//! It includes the raw gazetteer rows, the rank classification rules applied to them, the
//! flattened place documents stored in the search index, and the query/result types of the
//! geocoding surface.

pub mod types;

pub use types::address_row::{AddressRow, MAX_RANK_ADDRESS};
pub use types::geo::{BoundingBox, Centroid};
pub use types::marker::{MarkerRecord, UpdateMarker};
pub use types::names::Names;
pub use types::place::{CountryFilter, OsmType, PlaceRow};
pub use types::place_document::PlaceDocument;
pub use types::search_query::{ForwardQuery, ReverseQuery};
pub use types::search_result::{SearchResponse, SearchResult};
