//! # Place Indexer
//!
//! Geocoding indexer - builds flat, rank-classified place documents from a gazetteer
//! database and keeps an OpenSearch index in sync with it.
//!
//! ## Architecture
//!
//! The indexer follows the Reader-Processor-Loader pattern:
//!
//! 1. **Reader**: Reads places and their ancestor chains from the gazetteer
//! 2. **Processor**: Resolves each chain into a flat search document
//! 3. **Loader**: Writes documents into OpenSearch, retrying failed items
//! 4. **Orchestrator**: Runs full imports and incremental updates, one at a time
//!
//! ## Modules
//!
//! - [`config`]: Configuration and dependency initialization
//! - [`reader`]: Full and delta scans of the gazetteer
//! - [`processor`]: Builds search documents
//! - [`loader`]: Bulk writes with retry and backoff
//! - [`orchestrator`]: Import and update pipelines, single-flight runner
//! - [`search`]: Validated forward and reverse geocoding
//! - [`errors`]: Error types for the pipelines

pub mod config;
pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod processor;
pub mod reader;
pub mod search;

pub use config::{Dependencies, RunMode, Settings};
pub use errors::PipelineError;

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
