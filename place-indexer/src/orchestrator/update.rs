//! Incremental update cycles.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{error, info, instrument, warn};

use place_indexer_repository::SearchIndexProvider;
use place_indexer_shared::UpdateMarker;

use crate::errors::PipelineError;
use crate::loader::SearchLoader;
use crate::processor::DocumentBuilder;
use crate::reader::GazetteerReader;

/// Lifecycle of the update pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Running,
    /// The last cycle failed; the marker was left where it was.
    CycleFailed,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::CycleFailed => "cycle-failed",
        };
        f.write_str(s)
    }
}

/// Summary of one successful cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub since: UpdateMarker,
    pub new_marker: UpdateMarker,
    pub upserted: usize,
    /// Deleted upstream, or no longer indexable.
    pub deleted: usize,
    /// Places rebuilt because an ancestor changed.
    pub dependents: usize,
    pub skipped_rows: usize,
}

impl CycleReport {
    /// Returns true if the cycle wrote nothing.
    pub fn is_noop(&self) -> bool {
        self.upserted == 0 && self.deleted == 0 && self.since == self.new_marker
    }
}

/// Applies gazetteer changes to the index.
///
/// Owns the "last processed" marker. The marker only advances after every delete and
/// upsert of a cycle went through and the new value was persisted with the index.
pub struct UpdatePipeline {
    reader: GazetteerReader,
    builder: DocumentBuilder,
    loader: SearchLoader,
    index: Arc<dyn SearchIndexProvider>,
    start_marker: Option<UpdateMarker>,
    marker: Mutex<Option<UpdateMarker>>,
    state: watch::Sender<UpdateState>,
}

impl UpdatePipeline {
    /// Create a new update pipeline.
    ///
    /// `start_marker` is used when the index has no stored marker yet.
    pub fn new(
        reader: GazetteerReader,
        builder: DocumentBuilder,
        loader: SearchLoader,
        start_marker: Option<UpdateMarker>,
    ) -> Self {
        let index = loader.provider().clone();
        let (state, _) = watch::channel(UpdateState::Idle);
        Self {
            reader,
            builder,
            loader,
            index,
            start_marker,
            marker: Mutex::new(None),
            state,
        }
    }

    pub fn state(&self) -> UpdateState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<UpdateState> {
        self.state.subscribe()
    }

    /// The in-memory marker, if initialized.
    pub async fn marker(&self) -> Option<UpdateMarker> {
        *self.marker.lock().await
    }

    /// Initialize the marker from the index, then the configured start marker, then the
    /// gazetteer's current position.
    #[instrument(skip(self))]
    pub async fn initialize_marker(&self) -> Result<UpdateMarker, PipelineError> {
        let mut marker = self.marker.lock().await;
        let value = self.resolve_start().await?;
        *marker = Some(value);
        Ok(value)
    }

    /// Replace the marker, e.g. after a full import stored a new one.
    pub async fn reset_marker(&self, value: UpdateMarker) {
        let mut marker = self.marker.lock().await;
        info!(marker = %value, "Update marker reset");
        *marker = Some(value);
    }

    async fn resolve_start(&self) -> Result<UpdateMarker, PipelineError> {
        if let Some(stored) = self.index.get_stored_marker().await? {
            info!(marker = %stored, "Using marker stored with the index");
            return Ok(stored);
        }
        if let Some(start) = self.start_marker {
            info!(marker = %start, "Using configured start marker");
            return Ok(start);
        }
        let current = self.reader.current_marker().await?;
        warn!(marker = %current, "No stored marker, starting from the gazetteer's current position");
        Ok(current)
    }

    fn transition(&self, next: UpdateState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "Update state changed");
        }
    }

    /// Run one update cycle.
    ///
    /// Cycles are serialized on the marker. On failure the marker is left unadvanced so the
    /// next cycle replays the same window.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        let mut marker = self.marker.lock().await;
        self.transition(UpdateState::Running);

        let since = match *marker {
            Some(since) => since,
            None => match self.resolve_start().await {
                Ok(start) => {
                    *marker = Some(start);
                    start
                }
                Err(e) => {
                    self.transition(UpdateState::CycleFailed);
                    error!(error = %e, "Could not initialize update marker");
                    return Err(e);
                }
            },
        };

        match self.apply(since).await {
            Ok(report) => {
                *marker = Some(report.new_marker);
                self.transition(UpdateState::Idle);
                if report.is_noop() {
                    info!(marker = %since, "No changes");
                } else {
                    info!(
                        since = %report.since,
                        new_marker = %report.new_marker,
                        upserted = report.upserted,
                        deleted = report.deleted,
                        dependents = report.dependents,
                        skipped_rows = report.skipped_rows,
                        "Update cycle complete"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                self.transition(UpdateState::CycleFailed);
                error!(error = %e, marker = %since, "Update cycle failed, marker not advanced");
                Err(e)
            }
        }
    }

    async fn apply(&self, since: UpdateMarker) -> Result<CycleReport, PipelineError> {
        let delta = self.reader.collect_delta(since).await?;
        let mut report = CycleReport {
            since,
            new_marker: delta.new_marker,
            dependents: delta.dependents,
            skipped_rows: delta.rebuild.skipped,
            ..CycleReport::default()
        };

        if delta.new_marker < since {
            return Err(PipelineError::invalid_state(format!(
                "Change log went backwards from {} to {}",
                since, delta.new_marker
            )));
        }
        if delta.is_empty() {
            if delta.new_marker != since {
                self.index.set_stored_marker(delta.new_marker).await?;
            }
            return Ok(report);
        }

        let outcome = self.builder.build_batch(delta.rebuild.iter());

        let mut deletes = delta.deleted;
        deletes.extend(outcome.skipped.iter().copied());

        report.deleted = self.loader.delete(deletes).await?.written;
        report.upserted = self.loader.upsert(outcome.documents).await?.written;

        self.index.refresh().await?;
        self.index.set_stored_marker(delta.new_marker).await?;

        Ok(report)
    }
}
