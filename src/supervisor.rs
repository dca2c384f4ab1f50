//! Engine supervision
//!
//! [`RunHandle::spawn`] moves a [`FetchExecutor`] onto its own tokio task.
//! The caller only sees the append-only event stream, a cancel handle and
//! the join handle. [`SessionStats`] folds that stream into the counters a
//! front-end shows while a run is in progress.

use crate::downloader::progress::{ChannelSink, MultiSink, ProgressEvent, VersionedEvent};
use crate::downloader::{FetchExecutor, RunError, RunStatus, RunSummary};
use crate::shutdown::{ShutdownCoordinator, SharedShutdown};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::debug;

/// Errors surfaced when joining a supervised run
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The run itself failed
    #[error(transparent)]
    Run(#[from] RunError),

    /// The engine task panicked or was aborted
    #[error("engine task failed: {0}")]
    TaskFailed(String),
}

/// A fetch run executing on its own task
pub struct RunHandle {
    events: UnboundedReceiver<ProgressEvent>,
    shutdown: SharedShutdown,
    task: JoinHandle<Result<RunSummary, RunError>>,
}

impl RunHandle {
    /// Spawn `executor` on the current tokio runtime
    ///
    /// The executor's own sink keeps receiving events; the handle gets a copy
    /// of every event through its channel. Cancellation is scoped to this run.
    pub fn spawn(executor: FetchExecutor) -> Self {
        let (channel, events) = ChannelSink::new();
        let shutdown = ShutdownCoordinator::shared();
        let sink = MultiSink::new(vec![executor.sink().clone(), Arc::new(channel)]);
        let executor = executor
            .with_sink(Arc::new(sink))
            .with_shutdown(shutdown.clone());

        let task = tokio::spawn(async move { executor.run().await });
        debug!("Fetch run spawned");

        Self {
            events,
            shutdown,
            task,
        }
    }

    /// Request a graceful stop after the current combination
    pub fn cancel(&self) {
        self.shutdown.request_shutdown();
    }

    /// Get the cancellation handle
    pub fn shutdown_handle(&self) -> SharedShutdown {
        self.shutdown.clone()
    }

    /// Next event, or `None` once the run has finished and the stream is drained
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Borrow the event receiver
    pub fn events(&mut self) -> &mut UnboundedReceiver<ProgressEvent> {
        &mut self.events
    }

    /// Wait for the run to end
    pub async fn join(self) -> Result<RunSummary, SupervisorError> {
        match self.task.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(SupervisorError::TaskFailed(e.to_string())),
        }
    }

    /// Drain every event into `stats`, then wait for the run to end
    pub async fn follow(mut self, stats: &mut SessionStats) -> Result<RunSummary, SupervisorError> {
        while let Some(event) = self.events.recv().await {
            stats.apply(&event);
            if event.is_terminal() {
                break;
            }
        }
        self.join().await
    }
}

/// Counters for one supervised session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    /// Successful fetches
    pub fetched: u64,
    /// Failed fetches
    pub failed: u64,
    /// Combinations without data
    pub not_available: u64,
    /// Fresh combinations skipped
    pub skipped: u64,
    /// Grid size, once known
    pub total: usize,
    /// Last reported grid position
    pub current: usize,
    /// Last reported progress percentage
    pub percent: f64,
    /// Counts carried by the last checkpoint save
    pub last_checkpoint: Option<(u64, u64)>,
    /// Final status once the terminal event was seen
    pub finished: Option<RunStatus>,
}

impl SessionStats {
    /// Create empty counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the counters
    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { total, .. } => {
                self.total = *total;
            }
            ProgressEvent::Progress {
                current,
                total,
                fetched,
                failed,
                skipped,
            } => {
                self.current = *current;
                self.total = *total;
                self.fetched = *fetched;
                self.failed = *failed;
                self.skipped = *skipped;
                self.percent = if *total == 0 {
                    100.0
                } else {
                    *current as f64 / *total as f64 * 100.0
                };
            }
            ProgressEvent::Fetched { .. } => self.fetched += 1,
            ProgressEvent::NotAvailable { .. } => self.not_available += 1,
            ProgressEvent::EmptyResponse { .. } | ProgressEvent::Failed { .. } => {
                self.failed += 1
            }
            ProgressEvent::CheckpointSaved { successful, failed } => {
                self.fetched = *successful;
                self.failed = *failed;
                self.last_checkpoint = Some((*successful, *failed));
            }
            ProgressEvent::DatasetWritten { .. } => {}
            ProgressEvent::Summary {
                successful,
                failed,
                not_available,
                skipped,
                ..
            } => {
                self.fetched = *successful;
                self.failed = *failed;
                self.not_available = *not_available;
                self.skipped = *skipped;
            }
            ProgressEvent::Finished { status } => {
                if *status == RunStatus::Success {
                    self.percent = 100.0;
                }
                self.finished = Some(*status);
            }
        }
    }

    /// Fold one JSON progress line read from a child process
    ///
    /// Lines that are not versioned events (log noise, legacy text) are
    /// ignored. Returns the parsed event.
    pub fn apply_line(&mut self, line: &str) -> Option<ProgressEvent> {
        let event = parse_event_line(line)?;
        self.apply(&event);
        Some(event)
    }

    /// Whether the terminal event has been seen
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }
}

/// Parse a versioned JSON progress line
pub fn parse_event_line(line: &str) -> Option<ProgressEvent> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str::<VersionedEvent>(line)
        .ok()
        .map(|versioned| versioned.event)
}
