//! Fetch run executor
//!
//! Processes combinations strictly one at a time. Each combination ends in
//! exactly one of: skipped (fresh), completed, not available, or failed, and
//! every non-skipped outcome is written to the checkpoint. The dataset and
//! checkpoint are persisted together every `checkpoint_interval` attempts and
//! at the end of the run, dataset first, so a checkpointed combination's
//! records are always in the newest dataset file.

use crate::downloader::config::FetchConfig;
use crate::downloader::job::{RunStats, RunStatus, RunSummary};
use crate::downloader::progress::{ProgressEvent, ProgressSink};
use crate::downloader::RunError;
use crate::fetcher::{CombinationFetcher, FetchOutcome, FetcherError};
use crate::latest_observation_month;
use crate::metrics::{self, RunMetrics};
use crate::output::csv::write_dataset;
use crate::output::path::timestamped_dataset_path;
use crate::output::Dataset;
use crate::resume::{Checkpoint, CheckpointOrigin, CheckpointStore, CombinationRecord};
use crate::shutdown::{self, SharedShutdown};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Drives one fetch run over the configured grid
pub struct FetchExecutor {
    config: FetchConfig,
    fetcher: Arc<dyn CombinationFetcher>,
    sink: Arc<dyn ProgressSink>,
    shutdown: Option<SharedShutdown>,
}

/// Mutable state of a run in progress
struct RunState {
    store: CheckpointStore,
    checkpoint: Checkpoint,
    dataset: Dataset,
    output_path: PathBuf,
    stats: RunStats,
}

impl FetchExecutor {
    /// Create an executor
    ///
    /// Picks up the process-wide shutdown handle if one is registered.
    pub fn new(
        config: FetchConfig,
        fetcher: Arc<dyn CombinationFetcher>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            fetcher,
            sink,
            shutdown: shutdown::get_global_shutdown(),
        }
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Replace the progress sink.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Get the progress sink
    pub fn sink(&self) -> &Arc<dyn ProgressSink> {
        &self.sink
    }

    /// Get the run configuration
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Run to completion (or until shutdown is requested)
    ///
    /// Always ends by emitting [`ProgressEvent::Finished`].
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let span = tracing::info_span!(
            "fetch_run",
            combinations = self.config.grid.len(),
            checkpoint = %self.config.checkpoint_path.display(),
        );
        let run_metrics = RunMetrics::start(self.config.grid.len());

        let result = self.run_inner().instrument(span).await;

        let status = match &result {
            Ok(summary) => summary.status(),
            Err(e) => {
                error!(error = %e, "Fetch run failed");
                RunStatus::Failure
            }
        };
        run_metrics.finish(match status {
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
            RunStatus::Interrupted => "interrupted",
        });
        self.sink.emit(&ProgressEvent::Finished { status });
        result
    }

    async fn run_inner(&self) -> Result<RunSummary, RunError> {
        self.config.validate()?;
        let started = Instant::now();
        let grid = &self.config.grid;
        let total = grid.len();

        info!(
            api_key = %self.config.api_key,
            freshness_days = self.config.freshness_days,
            checkpoint_interval = self.config.checkpoint_interval,
            max_requests = self.config.max_requests,
            window_secs = self.config.rate_window.as_secs(),
            "Starting ABS labour force fetch"
        );

        let store = CheckpointStore::new(&self.config.checkpoint_path);
        let (checkpoint, origin) = store.load();
        if let CheckpointOrigin::FreshStart(reason) = &origin {
            debug!(?reason, "Starting without prior checkpoint");
        }

        let (dataset, source) = Dataset::load_latest(&self.config.output_dir)?;
        if let Some(source) = &source {
            debug!(source = %source.display(), "Merging into existing dataset");
        }
        let initial_records = dataset.len();

        let window = self.config.freshness_window();
        let now = Utc::now();
        let fresh = grid
            .combinations()
            .filter(|c| checkpoint.is_fresh_at(&c.key(), window, now))
            .count();
        let to_fetch = total - fresh;
        let estimated_minutes = to_fetch as f64 / self.config.max_requests as f64
            * self.config.rate_window.as_secs_f64()
            / 60.0;

        self.sink.emit(&ProgressEvent::RunStarted {
            total,
            fresh,
            to_fetch,
            existing_records: initial_records,
            estimated_minutes,
        });

        let mut state = RunState {
            store,
            checkpoint,
            dataset,
            output_path: timestamped_dataset_path(&self.config.output_dir),
            stats: RunStats::default(),
        };
        let mut interrupted = false;
        let mut fatal: Option<FetcherError> = None;

        for (index, combination) in grid.combinations().enumerate() {
            if self.shutdown_requested() {
                warn!(position = index, total, "Shutdown requested, stopping run");
                interrupted = true;
                break;
            }

            let current = index + 1;
            let key = combination.key();

            if state.checkpoint.is_fresh_at(&key, window, now) {
                debug!(combination = %combination, "Skipping fresh combination");
                state.stats.skipped += 1;
            } else {
                let outcome = self.fetcher.fetch(&combination).await;
                metrics::record_fetch_outcome(outcome.label());

                match outcome {
                    FetchOutcome::Records(records) if records.is_empty() => {
                        warn!(combination = %combination, "No records in response");
                        state.stats.failed += 1;
                        state.stats.empty += 1;
                        state.checkpoint.record(key, CombinationRecord::failed());
                        self.sink.emit(&ProgressEvent::EmptyResponse {
                            combination: combination.to_string(),
                        });
                    }
                    FetchOutcome::Records(records) => {
                        let count = records.len();
                        let latest_month = latest_observation_month(&records);
                        let added = state.dataset.merge(records);
                        state.stats.successful += 1;
                        state.stats.new_records_added += added as u64;
                        state.checkpoint.record(
                            key,
                            CombinationRecord::completed(count as u64, latest_month.clone()),
                        );
                        debug!(combination = %combination, count, added, "Merged records");
                        self.sink.emit(&ProgressEvent::Fetched {
                            combination: combination.to_string(),
                            records: count,
                            latest_month,
                        });
                    }
                    FetchOutcome::NotAvailable => {
                        state.stats.not_available += 1;
                        state
                            .checkpoint
                            .record(key, CombinationRecord::not_available());
                        self.sink.emit(&ProgressEvent::NotAvailable {
                            combination: combination.to_string(),
                        });
                    }
                    FetchOutcome::Failure(e) if e.is_fatal() => {
                        error!(combination = %combination, error = %e, "Aborting run");
                        self.sink.emit(&ProgressEvent::Failed {
                            combination: combination.to_string(),
                            error: e.to_string(),
                        });
                        fatal = Some(e);
                        break;
                    }
                    FetchOutcome::Failure(e) => {
                        state.stats.failed += 1;
                        state.checkpoint.record(key, CombinationRecord::failed());
                        self.sink.emit(&ProgressEvent::Failed {
                            combination: combination.to_string(),
                            error: e.to_string(),
                        });
                    }
                }

                if state.stats.attempts() % self.config.checkpoint_interval == 0 {
                    if let Err(e) = self.persist(&mut state) {
                        warn!(error = %e, "Periodic save failed; continuing");
                    }
                }
            }

            if current % self.config.progress_interval == 0 || current == total {
                self.sink.emit(&ProgressEvent::Progress {
                    current,
                    total,
                    fetched: state.stats.successful,
                    failed: state.stats.failed,
                    skipped: state.stats.skipped,
                });
            }
        }

        if let Some(e) = fatal {
            // Keep what was collected before the key was rejected.
            if let Err(save_err) = self.persist(&mut state) {
                warn!(error = %save_err, "Could not save progress after fatal error");
            }
            return Err(RunError::Fetch(e));
        }

        if state.dataset.is_empty() {
            state.store.save(&mut state.checkpoint)?;
            warn!("No data to save");
            return Err(RunError::NoData);
        }

        if !interrupted {
            state.checkpoint.mark_run_complete();
        }
        self.persist(&mut state)?;
        metrics::record_dataset_size(state.dataset.len());
        self.sink.emit(&ProgressEvent::DatasetWritten {
            path: state.output_path.display().to_string(),
            records: state.dataset.len(),
        });

        let mut summary = RunSummary::from_stats(&state.stats, total);
        summary.initial_records = initial_records;
        summary.total_records = state.dataset.len();
        summary.elapsed = started.elapsed();
        summary.interrupted = interrupted;
        summary.output_path = Some(state.output_path);

        info!(
            successful = summary.successful,
            failed = summary.failed,
            not_available = summary.not_available,
            skipped = summary.skipped,
            new_records = summary.new_records_added,
            total_records = summary.total_records,
            elapsed_secs = summary.elapsed.as_secs(),
            interrupted,
            "Fetch complete"
        );
        self.sink.emit(&ProgressEvent::Summary {
            successful: summary.successful,
            failed: summary.failed,
            not_available: summary.not_available,
            skipped: summary.skipped,
            new_records: summary.new_records_added,
            total_records: summary.total_records,
            initial_records,
            elapsed_secs: summary.elapsed.as_secs_f64(),
        });

        Ok(summary)
    }

    /// Write the dataset (when non-empty), then the checkpoint
    fn persist(&self, state: &mut RunState) -> Result<(), RunError> {
        if !state.dataset.is_empty() {
            write_dataset(&state.output_path, &state.dataset)?;
        }
        state
            .checkpoint
            .set_total_records(state.dataset.len() as u64);
        state.store.save(&mut state.checkpoint)?;
        self.sink.emit(&ProgressEvent::CheckpointSaved {
            successful: state.stats.successful,
            failed: state.stats.failed,
        });
        Ok(())
    }
}
