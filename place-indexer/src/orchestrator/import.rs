//! Full rebuild of the place index.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, instrument};

use place_indexer_repository::SearchIndexProvider;
use place_indexer_shared::{CountryFilter, UpdateMarker};

use crate::errors::PipelineError;
use crate::loader::SearchLoader;
use crate::processor::DocumentBuilder;
use crate::reader::GazetteerReader;

/// Lifecycle of a full import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    DrainingOldIndex,
    Streaming,
    Committing,
    Failed,
}

impl ImportState {
    /// Returns true while an import is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::DrainingOldIndex | Self::Streaming | Self::Committing
        )
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::DrainingOldIndex => "draining-old-index",
            Self::Streaming => "streaming",
            Self::Committing => "committing",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Whether the serving index holds a complete generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexReadiness {
    /// The last import (or the pre-existing index) is complete.
    Ready,
    /// A full import is rewriting the index; results are best-effort.
    Rebuilding,
    /// The index is missing or only partially populated.
    Incomplete,
}

impl IndexReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for IndexReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Rebuilding => "rebuilding",
            Self::Incomplete => "incomplete",
        };
        f.write_str(s)
    }
}

/// Summary of a completed import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub batches: usize,
    pub documents: usize,
    /// Places that built to no document.
    pub skipped_places: usize,
    /// Rows that could not be decoded.
    pub skipped_rows: usize,
    /// Marker stored with the new index.
    pub marker: UpdateMarker,
}

/// Drives gazetteer → builder → index for a full rebuild.
pub struct ImportPipeline {
    reader: GazetteerReader,
    builder: DocumentBuilder,
    loader: SearchLoader,
    index: Arc<dyn SearchIndexProvider>,
    filter: CountryFilter,
    state: watch::Sender<ImportState>,
    readiness: watch::Sender<IndexReadiness>,
}

impl ImportPipeline {
    /// Create a new import pipeline. `readiness` is the state of the index at startup.
    pub fn new(
        reader: GazetteerReader,
        builder: DocumentBuilder,
        loader: SearchLoader,
        filter: CountryFilter,
        readiness: IndexReadiness,
    ) -> Self {
        let index = loader.provider().clone();
        let (state, _) = watch::channel(ImportState::Idle);
        let (readiness, _) = watch::channel(readiness);
        Self {
            reader,
            builder,
            loader,
            index,
            filter,
            state,
            readiness,
        }
    }

    /// Current state.
    pub fn state(&self) -> ImportState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ImportState> {
        self.state.subscribe()
    }

    /// Current readiness of the serving index.
    pub fn readiness(&self) -> IndexReadiness {
        *self.readiness.borrow()
    }

    /// Subscribe to readiness changes.
    pub fn subscribe_readiness(&self) -> watch::Receiver<IndexReadiness> {
        self.readiness.subscribe()
    }

    fn transition(&self, next: ImportState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "Import state changed");
        }
    }

    fn set_readiness(&self, next: IndexReadiness) {
        let previous = self.readiness.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "Index readiness changed");
        }
    }

    /// Drop and recreate the index without importing. Leaves the index empty and flagged
    /// as rebuilding until the next import commits.
    ///
    /// Only reachable through [`super::PipelineRunner::run_recreate`], which holds the
    /// single-flight guard.
    #[instrument(skip(self))]
    pub(crate) async fn recreate_index(&self) -> Result<(), PipelineError> {
        if self.state().is_active() {
            return Err(PipelineError::invalid_state("An import is in progress"));
        }
        self.set_readiness(IndexReadiness::Incomplete);
        self.index.mark_rebuilding().await?;
        self.index.drop_index().await?;
        self.index.create_index().await?;
        info!("Index recreated");
        Ok(())
    }

    /// Run a full import.
    ///
    /// Either completes with the index marked ready, or ends in [`ImportState::Failed`]. Once
    /// the old index has been dropped, a failure leaves the readiness at
    /// [`IndexReadiness::Incomplete`].
    #[instrument(skip(self), fields(countries = ?self.filter.codes()))]
    pub async fn run(&self) -> Result<ImportReport, PipelineError> {
        if self.state().is_active() {
            return Err(PipelineError::invalid_state("An import is already in progress"));
        }

        match self.execute().await {
            Ok(report) => {
                self.transition(ImportState::Idle);
                self.set_readiness(IndexReadiness::Ready);
                info!(
                    batches = report.batches,
                    documents = report.documents,
                    skipped_places = report.skipped_places,
                    skipped_rows = report.skipped_rows,
                    marker = %report.marker,
                    "Import complete"
                );
                Ok(report)
            }
            Err(e) => {
                let dropped = self.state() != ImportState::Idle;
                self.transition(ImportState::Failed);
                if dropped {
                    self.set_readiness(IndexReadiness::Incomplete);
                }
                error!(error = %e, index_dropped = dropped, "Import failed");
                Err(e)
            }
        }
    }

    async fn execute(&self) -> Result<ImportReport, PipelineError> {
        self.transition(ImportState::Idle);
        let marker = self.reader.current_marker().await?;

        self.transition(ImportState::DrainingOldIndex);
        self.set_readiness(IndexReadiness::Rebuilding);
        self.index.mark_rebuilding().await?;
        self.index.drop_index().await?;
        self.index.create_index().await?;

        self.transition(ImportState::Streaming);
        let mut report = ImportReport {
            marker,
            ..ImportReport::default()
        };
        let mut scan = self.reader.full_scan(self.filter.clone());

        while let Some(batch) = scan.next_batch().await? {
            let outcome = self.builder.build_batch(batch.iter());
            let loaded = self.loader.upsert(outcome.documents).await?;

            report.batches += 1;
            report.documents += loaded.written;
            report.skipped_places += outcome.skipped.len();
            report.skipped_rows += batch.skipped;

            info!(
                batch = report.batches,
                documents = report.documents,
                skipped = report.skipped_places + report.skipped_rows,
                "Imported batch"
            );
        }

        self.transition(ImportState::Committing);
        self.index.refresh().await?;
        // Clears the rebuild flag.
        self.index.set_stored_marker(marker).await?;

        Ok(report)
    }
}
