//! Observability metrics for fetch runs
//!
//! Counters and histograms are recorded through the `metrics` facade and are
//! no-ops until [`init_metrics`] installs the Prometheus exporter.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the Prometheus exporter on `addr`
///
/// Idempotent: later calls are ignored.
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!(%addr, "Initializing metrics exporter");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| {
            METRICS_INITIALIZED.store(false, Ordering::SeqCst);
            format!("Failed to install Prometheus exporter: {e}")
        })?;

    describe_counter!(
        "fetch_outcomes_total",
        Unit::Count,
        "Combination fetch outcomes by kind"
    );
    describe_counter!(
        "checkpoint_saves_total",
        Unit::Count,
        "Checkpoint files written"
    );
    describe_histogram!(
        "rate_limit_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a rate limit admission"
    );
    describe_histogram!(
        "fetch_run_duration_seconds",
        Unit::Seconds,
        "Wall time of complete fetch runs"
    );
    describe_gauge!(
        "dataset_records",
        Unit::Count,
        "Records in the dataset after the last write"
    );

    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Whether the exporter has been installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Record time spent in the rate limiter
pub fn record_rate_limit_wait(waited: Duration) {
    histogram!("rate_limit_wait_seconds").record(waited.as_secs_f64());
}

/// Record one fetch outcome (`records`, `empty`, `not_available`, `failure`)
pub fn record_fetch_outcome(outcome: &'static str) {
    counter!("fetch_outcomes_total", "outcome" => outcome).increment(1);
}

/// Record a checkpoint save
pub fn record_checkpoint_save() {
    counter!("checkpoint_saves_total").increment(1);
}

/// Record the dataset size after a write
pub fn record_dataset_size(records: usize) {
    gauge!("dataset_records").set(records as f64);
}

/// Timing for a whole fetch run
pub struct RunMetrics {
    start_time: Instant,
}

impl RunMetrics {
    /// Start timing a run
    pub fn start(combinations: usize) -> Self {
        debug!(combinations, "Fetch run metrics started");
        Self {
            start_time: Instant::now(),
        }
    }

    /// Record the end of the run with its final status
    pub fn finish(&self, status: &'static str) {
        histogram!("fetch_run_duration_seconds", "status" => status)
            .record(self.start_time.elapsed().as_secs_f64());
    }
}
