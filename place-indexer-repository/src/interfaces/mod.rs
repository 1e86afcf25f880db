//! Interface definitions for the external collaborators.
//!
//! This module defines the abstract `SearchIndexProvider`, `PlaceSearchProvider` and
//! `GazetteerSource` traits that allow for dependency injection and swappable backend
//! implementations.

mod gazetteer_source;
mod place_search_provider;
mod search_index_provider;

pub use gazetteer_source::GazetteerSource;
pub use place_search_provider::PlaceSearchProvider;
pub use search_index_provider::SearchIndexProvider;
