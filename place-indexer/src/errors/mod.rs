//! Error types for the place indexer pipelines.

use thiserror::Error;

use place_indexer_repository::{GazetteerError, SearchIndexError};

/// Errors that can occur while running an import or an update cycle.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Reading from the gazetteer failed.
    #[error("Gazetteer error: {0}")]
    GazetteerError(#[from] GazetteerError),

    /// An index operation failed outside of the retried bulk writes.
    #[error("Index error: {0}")]
    IndexError(#[from] SearchIndexError),

    /// A bulk write still had failing items after all retries.
    #[error("Loader error: {operation} of {failed} documents failed after {attempts} attempts: {last_error}")]
    LoaderError {
        operation: &'static str,
        failed: usize,
        attempts: u32,
        last_error: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A pipeline was driven from a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PipelineError {
    /// Create a loader error.
    pub fn loader(
        operation: &'static str,
        failed: usize,
        attempts: u32,
        last_error: impl Into<String>,
    ) -> Self {
        Self::LoaderError {
            operation,
            failed,
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Returns true if the failure was caused by an unreachable database or index.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::GazetteerError(GazetteerError::Database(_)) => true,
            Self::IndexError(e) => e.is_connectivity(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_error_display() {
        let err = PipelineError::loader("upsert", 3, 4, "status 429: queue full");
        assert_eq!(
            err.to_string(),
            "Loader error: upsert of 3 documents failed after 4 attempts: status 429: queue full"
        );
    }

    #[test]
    fn test_is_connectivity() {
        let err: PipelineError = SearchIndexError::connection("refused").into();
        assert!(err.is_connectivity());

        let err: PipelineError = GazetteerError::structural("no placex").into();
        assert!(!err.is_connectivity());

        assert!(!PipelineError::loader("delete", 1, 1, "x").is_connectivity());
    }
}
