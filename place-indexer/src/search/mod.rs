//! Query surface of the geocoder.
//!
//! Validates forward and reverse requests before they reach the index and maps failures to
//! status-coded errors for whatever transport serves them.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use place_indexer_repository::{PlaceSearchProvider, SearchIndexError};
use place_indexer_shared::{ForwardQuery, ReverseQuery, SearchResponse};

use crate::orchestrator::IndexReadiness;

/// Languages served when none are configured.
pub const DEFAULT_LANGUAGES: [&str; 5] = ["default", "en", "de", "fr", "it"];

/// Errors returned to query callers.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The request is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The index could not answer.
    #[error("Search backend error: {0}")]
    Backend(#[from] SearchIndexError),
}

impl QueryError {
    /// Create an invalid request error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Backend(e) if e.is_connectivity() => 503,
            Self::Backend(_) => 502,
        }
    }

    /// JSON error body.
    pub fn to_body(&self) -> Value {
        json!({
            "status": "error",
            "code": self.status_code(),
            "message": self.to_string(),
        })
    }
}

/// Health of the query surface.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    pub readiness: String,
    pub ready: bool,
}

/// Validated geocoding queries over a [`PlaceSearchProvider`].
#[derive(Clone)]
pub struct GeocodingService {
    provider: Arc<dyn PlaceSearchProvider>,
    languages: Vec<String>,
    readiness: watch::Receiver<IndexReadiness>,
}

impl GeocodingService {
    /// Create a new service.
    ///
    /// An empty `languages` list falls back to [`DEFAULT_LANGUAGES`].
    pub fn new(
        provider: Arc<dyn PlaceSearchProvider>,
        languages: Vec<String>,
        readiness: watch::Receiver<IndexReadiness>,
    ) -> Self {
        let languages = if languages.is_empty() {
            DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect()
        } else {
            languages
        };
        Self {
            provider,
            languages,
            readiness,
        }
    }

    /// Languages accepted in queries.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    fn check_language(&self, language: Option<&str>) -> Result<(), QueryError> {
        match language {
            Some(lang) if !self.languages.iter().any(|l| l == lang) => {
                Err(QueryError::invalid(format!(
                    "Language '{}' is not supported; use one of: {}",
                    lang,
                    self.languages.join(", ")
                )))
            }
            _ => Ok(()),
        }
    }

    fn note_readiness(&self) {
        let readiness = *self.readiness.borrow();
        if !readiness.is_ready() {
            debug!(readiness = %readiness, "Serving query from an index that is not ready");
        }
    }

    /// Forward geocoding.
    pub async fn search(&self, query: ForwardQuery) -> Result<SearchResponse, QueryError> {
        query.validate().map_err(QueryError::InvalidRequest)?;
        self.check_language(query.language.as_deref())?;
        self.note_readiness();

        self.provider.search(&query).await.map_err(|e| {
            warn!(error = %e, query = %query.query, "Forward search failed");
            QueryError::from(e)
        })
    }

    /// Reverse geocoding.
    pub async fn reverse(&self, query: ReverseQuery) -> Result<SearchResponse, QueryError> {
        query.validate().map_err(QueryError::InvalidRequest)?;
        self.check_language(query.language.as_deref())?;
        self.note_readiness();

        self.provider.reverse(&query).await.map_err(|e| {
            warn!(error = %e, lat = ?query.lat, lon = ?query.lon, "Reverse search failed");
            QueryError::from(e)
        })
    }

    /// Readiness of the serving index.
    pub fn health(&self) -> HealthReport {
        let readiness = *self.readiness.borrow();
        HealthReport {
            readiness: readiness.to_string(),
            ready: readiness.is_ready(),
        }
    }
}
