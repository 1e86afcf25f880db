//! Loader module for the place indexer.
//!
//! Writes built documents and deletions into the search index in bulk requests. Items that
//! the index rejects are retried with bounded exponential backoff; only the failed items are
//! resent.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use place_indexer_repository::{BatchOperationSummary, SearchIndexError, SearchIndexProvider};
use place_indexer_shared::PlaceDocument;

use crate::errors::PipelineError;

/// Bounded exponential backoff for bulk writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubles per attempt, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

/// Configuration for the search loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum number of items per bulk request.
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Items written (or deleted).
    pub written: usize,
    /// Retries needed across all bulk requests.
    pub retries: u32,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.written += other.written;
        self.retries += other.retries;
    }
}

/// A bulk write still waiting to succeed.
enum Pending {
    Upsert(Vec<PlaceDocument>),
    Delete(Vec<i64>),
}

impl Pending {
    fn operation(&self) -> &'static str {
        match self {
            Self::Upsert(_) => "upsert",
            Self::Delete(_) => "delete",
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Upsert(documents) => documents.len(),
            Self::Delete(place_ids) => place_ids.len(),
        }
    }

    fn ids(&self) -> HashSet<i64> {
        match self {
            Self::Upsert(documents) => documents.iter().map(|d| d.place_id).collect(),
            Self::Delete(place_ids) => place_ids.iter().copied().collect(),
        }
    }

    async fn send(
        &self,
        provider: &dyn SearchIndexProvider,
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        match self {
            Self::Upsert(documents) => provider.bulk_upsert_documents(documents).await,
            Self::Delete(place_ids) => provider.bulk_delete_documents(place_ids).await,
        }
    }

    fn retain(&mut self, failed: &HashSet<i64>) {
        match self {
            Self::Upsert(documents) => documents.retain(|d| failed.contains(&d.place_id)),
            Self::Delete(place_ids) => place_ids.retain(|id| failed.contains(id)),
        }
    }
}

/// Loader that writes documents into the search index.
///
/// The loader is responsible for:
/// - Splitting writes into bulk requests of at most `batch_size` items
/// - Retrying rejected items with backoff
/// - Escalating to [`PipelineError::LoaderError`] once retries are exhausted
#[derive(Clone)]
pub struct SearchLoader {
    provider: Arc<dyn SearchIndexProvider>,
    config: LoaderConfig,
}

impl SearchLoader {
    /// Create a new search loader with the given provider.
    pub fn new(provider: Arc<dyn SearchIndexProvider>) -> Self {
        Self::with_config(provider, LoaderConfig::default())
    }

    /// Create a new search loader with custom configuration.
    pub fn with_config(provider: Arc<dyn SearchIndexProvider>, config: LoaderConfig) -> Self {
        Self {
            provider,
            config: LoaderConfig {
                batch_size: config.batch_size.max(1),
                ..config
            },
        }
    }

    /// The provider this loader writes to.
    pub fn provider(&self) -> &Arc<dyn SearchIndexProvider> {
        &self.provider
    }

    /// Insert or replace documents.
    #[instrument(skip(self, documents), fields(document_count = documents.len()))]
    pub async fn upsert(&self, documents: Vec<PlaceDocument>) -> Result<LoadReport, PipelineError> {
        let mut report = LoadReport::default();
        for chunk in documents.chunks(self.config.batch_size) {
            report.merge(self.write(Pending::Upsert(chunk.to_vec())).await?);
        }
        Ok(report)
    }

    /// Delete documents by place id.
    #[instrument(skip(self, place_ids), fields(delete_count = place_ids.len()))]
    pub async fn delete(&self, place_ids: Vec<i64>) -> Result<LoadReport, PipelineError> {
        let mut report = LoadReport::default();
        for chunk in place_ids.chunks(self.config.batch_size) {
            report.merge(self.write(Pending::Delete(chunk.to_vec())).await?);
        }
        Ok(report)
    }

    async fn write(&self, mut pending: Pending) -> Result<LoadReport, PipelineError> {
        let total = pending.len();
        if total == 0 {
            return Ok(LoadReport::default());
        }

        let operation = pending.operation();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let (failed, last_error) = match pending.send(self.provider.as_ref()).await {
                Ok(summary) if summary.is_complete() => {
                    debug!(operation, count = total, attempt, "Bulk write complete");
                    return Ok(LoadReport {
                        written: total,
                        retries: attempt - 1,
                    });
                }
                Ok(summary) => {
                    let last_error = summary
                        .first_error()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "item rejected".to_string());
                    for result in summary.results.iter().filter(|r| !r.success) {
                        if let Some(ref err) = result.error {
                            debug!(place_id = result.place_id, error = %err, "Bulk item failed");
                        }
                    }
                    (summary.failed_ids().into_iter().collect(), last_error)
                }
                Err(e) => (pending.ids(), e.to_string()),
            };

            pending.retain(&failed);
            if pending.len() == 0 {
                return Ok(LoadReport {
                    written: total,
                    retries: attempt - 1,
                });
            }

            if attempt > self.config.retry.max_retries {
                error!(
                    operation,
                    failed = pending.len(),
                    attempts = attempt,
                    error = %last_error,
                    "Bulk write failed after all retries"
                );
                return Err(PipelineError::loader(
                    operation,
                    pending.len(),
                    attempt,
                    last_error,
                ));
            }

            let backoff = self.config.retry.backoff_for(attempt);
            warn!(
                operation,
                failed = pending.len(),
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %last_error,
                "Bulk write incomplete, retrying failed items"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}
