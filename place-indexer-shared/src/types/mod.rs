//! This module defines the core data structures and types used across the place indexer.
//! It re-exports the row, document and query types.

pub mod address_row;
pub mod geo;
pub mod marker;
pub mod names;
pub mod place;
pub mod place_document;
pub mod search_query;
pub mod search_result;

pub use address_row::AddressRow;
pub use place::PlaceRow;
pub use place_document::PlaceDocument;
