//! Orchestrator module for the place indexer.
//!
//! Runs the import and update pipelines in the background, at most one at a time.

mod import;
mod update;

pub use import::{ImportPipeline, ImportReport, ImportState, IndexReadiness};
pub use update::{CycleReport, UpdatePipeline, UpdateState};

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, instrument};

use crate::errors::PipelineError;

/// Interval between progress log lines of the update loop.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(60);

/// Counters since startup.
#[derive(Debug, Default)]
struct RunnerCounters {
    imports_completed: AtomicU64,
    imports_failed: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    triggers_dropped: AtomicU64,
    documents_upserted: AtomicU64,
    documents_deleted: AtomicU64,
}

/// Snapshot of the runner counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    pub imports_completed: u64,
    pub imports_failed: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub triggers_dropped: u64,
    pub documents_upserted: u64,
    pub documents_deleted: u64,
}

/// Launches pipelines as background tasks with a process-wide single-flight guard.
///
/// A trigger that arrives while any pipeline is running is dropped and logged, never
/// queued.
#[derive(Clone)]
pub struct PipelineRunner {
    import: Arc<ImportPipeline>,
    update: Arc<UpdatePipeline>,
    guard: Arc<Mutex<()>>,
    counters: Arc<RunnerCounters>,
}

impl PipelineRunner {
    /// Create a new runner for the given pipelines.
    pub fn new(import: Arc<ImportPipeline>, update: Arc<UpdatePipeline>) -> Self {
        Self {
            import,
            update,
            guard: Arc::new(Mutex::new(())),
            counters: Arc::new(RunnerCounters::default()),
        }
    }

    pub fn import_pipeline(&self) -> &Arc<ImportPipeline> {
        &self.import
    }

    pub fn update_pipeline(&self) -> &Arc<UpdatePipeline> {
        &self.update
    }

    /// Returns true while a pipeline holds the guard.
    pub fn is_busy(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> RunnerStats {
        let c = &self.counters;
        RunnerStats {
            imports_completed: c.imports_completed.load(Ordering::Relaxed),
            imports_failed: c.imports_failed.load(Ordering::Relaxed),
            cycles_completed: c.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: c.cycles_failed.load(Ordering::Relaxed),
            triggers_dropped: c.triggers_dropped.load(Ordering::Relaxed),
            documents_upserted: c.documents_upserted.load(Ordering::Relaxed),
            documents_deleted: c.documents_deleted.load(Ordering::Relaxed),
        }
    }

    fn dropped(&self, pipeline: &'static str) -> Option<JoinHandle<()>> {
        self.counters.triggers_dropped.fetch_add(1, Ordering::Relaxed);
        info!(pipeline, "A pipeline is already running, trigger dropped");
        None
    }

    /// Start a full import in the background.
    ///
    /// Returns `None` if a pipeline is already running. After a successful import the
    /// update pipeline continues from the marker stored by the import.
    pub fn trigger_import(&self) -> Option<JoinHandle<()>> {
        let permit = match self.guard.clone().try_lock_owned() {
            Ok(permit) => permit,
            Err(_) => return self.dropped("import"),
        };

        let import = Arc::clone(&self.import);
        let update = Arc::clone(&self.update);
        let counters = Arc::clone(&self.counters);

        Some(tokio::spawn(async move {
            let _permit = permit;
            match import.run().await {
                Ok(report) => {
                    counters.imports_completed.fetch_add(1, Ordering::Relaxed);
                    counters
                        .documents_upserted
                        .fetch_add(report.documents as u64, Ordering::Relaxed);
                    update.reset_marker(report.marker).await;
                }
                Err(_) => {
                    counters.imports_failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }))
    }

    /// Start one update cycle in the background.
    ///
    /// Returns `None` if a pipeline is already running.
    pub fn trigger_update(&self) -> Option<JoinHandle<()>> {
        let permit = match self.guard.clone().try_lock_owned() {
            Ok(permit) => permit,
            Err(_) => return self.dropped("update"),
        };

        let update = Arc::clone(&self.update);
        let counters = Arc::clone(&self.counters);

        Some(tokio::spawn(async move {
            let _permit = permit;
            match update.run_cycle().await {
                Ok(report) => {
                    counters.cycles_completed.fetch_add(1, Ordering::Relaxed);
                    counters
                        .documents_upserted
                        .fetch_add(report.upserted as u64, Ordering::Relaxed);
                    counters
                        .documents_deleted
                        .fetch_add(report.deleted as u64, Ordering::Relaxed);
                }
                Err(_) => {
                    counters.cycles_failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }))
    }

    /// Run a full import in the foreground, under the same guard.
    pub async fn run_import(&self) -> Result<ImportReport, PipelineError> {
        let _permit = self.guard.lock().await;
        let result = self.import.run().await;
        match &result {
            Ok(report) => {
                self.counters.imports_completed.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .documents_upserted
                    .fetch_add(report.documents as u64, Ordering::Relaxed);
                self.update.reset_marker(report.marker).await;
            }
            Err(_) => {
                self.counters.imports_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Drop and recreate the index in the foreground, under the same guard. Waits for a
    /// running pipeline to finish first.
    pub async fn run_recreate(&self) -> Result<(), PipelineError> {
        let _permit = self.guard.lock().await;
        self.import.recreate_index().await
    }

    /// Run one update cycle in the foreground, under the same guard.
    pub async fn run_update(&self) -> Result<CycleReport, PipelineError> {
        let _permit = self.guard.lock().await;
        let result = self.update.run_cycle().await;
        match &result {
            Ok(report) => {
                self.counters.cycles_completed.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .documents_upserted
                    .fetch_add(report.upserted as u64, Ordering::Relaxed);
                self.counters
                    .documents_deleted
                    .fetch_add(report.deleted as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.cycles_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Trigger an update cycle every `period` until Ctrl-C.
    pub async fn run_update_loop(&self, period: Duration) -> Result<(), PipelineError> {
        self.run_update_loop_until(period, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await
    }

    /// Trigger an update cycle every `period` until `shutdown` resolves.
    ///
    /// On shutdown, waits for a running pipeline to finish before returning.
    #[instrument(skip(self, shutdown))]
    pub async fn run_update_loop_until<F>(
        &self,
        period: Duration,
        shutdown: F,
    ) -> Result<(), PipelineError>
    where
        F: Future<Output = ()>,
    {
        if period.is_zero() {
            return Err(PipelineError::config("Update interval must be greater than zero"));
        }

        info!(interval_secs = period.as_secs_f64(), "Starting update loop");

        let mut cycle_timer = interval(period);
        cycle_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut progress_timer = interval(PROGRESS_INTERVAL);
        progress_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut prev_docs: u64 = 0;
        let mut prev_time = tokio::time::Instant::now();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = cycle_timer.tick() => {
                    let _ = self.trigger_update();
                }
                _ = progress_timer.tick() => {
                    let stats = self.stats();
                    let docs = stats.documents_upserted + stats.documents_deleted;

                    let now = tokio::time::Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();
                    let docs_per_sec = if elapsed_secs > 0.0 {
                        (docs.saturating_sub(prev_docs) as f64) / elapsed_secs
                    } else {
                        0.0
                    };

                    info!(
                        cycles_completed = stats.cycles_completed,
                        cycles_failed = stats.cycles_failed,
                        triggers_dropped = stats.triggers_dropped,
                        documents_written = docs,
                        documents_per_sec = format!("{:.2}", docs_per_sec),
                        "Update progress"
                    );

                    prev_docs = docs;
                    prev_time = now;
                }
            }
        }

        // Wait for an in-flight cycle.
        let _permit = self.guard.lock().await;

        let stats = self.stats();
        info!(
            cycles_completed = stats.cycles_completed,
            cycles_failed = stats.cycles_failed,
            documents_upserted = stats.documents_upserted,
            documents_deleted = stats.documents_deleted,
            "Update loop shutdown complete"
        );
        Ok(())
    }
}
