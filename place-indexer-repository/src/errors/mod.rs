//! Error types for the place indexer repository.
//!
//! One error type per external collaborator: the search index and the gazetteer database.

mod gazetteer_error;
mod search_index_error;

pub use gazetteer_error::GazetteerError;
pub use search_index_error::SearchIndexError;
