//! Processor module for the place indexer.
//!
//! Transforms gazetteer rows into search documents.

mod document_builder;

pub use document_builder::{BuildOutcome, DocumentBuilder};
