//! Structured progress events and their sinks
//!
//! Every event renders to the legacy one-line text form through `Display`,
//! and serializes to a JSON line wrapped with a schema version. Supervising
//! processes parse either form from stdout.

use super::job::RunStatus;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Version of the JSON line schema
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// One progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Run start, after freshness has been evaluated
    RunStarted {
        /// Grid size
        total: usize,
        /// Combinations that will be skipped
        fresh: usize,
        /// Combinations that will be fetched
        to_fetch: usize,
        /// Records loaded from the previous output
        existing_records: usize,
        /// Lower bound on run time given the rate limit
        estimated_minutes: f64,
    },
    /// Periodic position report
    Progress {
        /// 1-based index of the current combination
        current: usize,
        /// Grid size
        total: usize,
        /// Successful fetches so far
        fetched: u64,
        /// Failed fetches so far
        failed: u64,
        /// Skipped combinations so far
        skipped: u64,
    },
    /// Records fetched for a combination
    Fetched {
        /// Combination label
        combination: String,
        /// Number of records in the response
        records: usize,
        /// Latest observation month in the response
        latest_month: Option<String>,
    },
    /// The API has no data for a combination
    NotAvailable {
        /// Combination label
        combination: String,
    },
    /// Successful response without records
    EmptyResponse {
        /// Combination label
        combination: String,
    },
    /// Fetch failed
    Failed {
        /// Combination label
        combination: String,
        /// Error message
        error: String,
    },
    /// Checkpoint written
    CheckpointSaved {
        /// Successful fetches so far
        successful: u64,
        /// Failed fetches so far
        failed: u64,
    },
    /// Dataset file written
    DatasetWritten {
        /// Written file
        path: String,
        /// Records in the file
        records: usize,
    },
    /// Final counters
    Summary {
        /// Successful fetches
        successful: u64,
        /// Failed fetches
        failed: u64,
        /// Combinations without data
        not_available: u64,
        /// Fresh combinations skipped
        skipped: u64,
        /// Records added this run
        new_records: u64,
        /// Dataset size
        total_records: usize,
        /// Dataset size before the run
        initial_records: usize,
        /// Run wall time in seconds
        elapsed_secs: f64,
    },
    /// Terminal sentinel, always the last event of a run
    Finished {
        /// How the run ended
        status: RunStatus,
    },
}

impl ProgressEvent {
    /// Whether this is the terminal sentinel
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }

    /// Serialize as a versioned JSON line (without trailing newline)
    pub fn to_json_line(&self) -> String {
        let versioned = VersionedEvent {
            v: EVENT_SCHEMA_VERSION,
            event: self.clone(),
        };
        serde_json::to_string(&versioned).unwrap_or_else(|e| {
            format!(r#"{{"v":{EVENT_SCHEMA_VERSION},"event":"error","error":"{e}"}}"#)
        })
    }
}

fn percent(current: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        current as f64 / total as f64 * 100.0
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted {
                total,
                fresh,
                to_fetch,
                existing_records,
                estimated_minutes,
            } => write!(
                f,
                "Starting fetch: {total} combinations, {fresh} fresh, {to_fetch} to fetch, \
                 {existing_records} existing records (estimated {estimated_minutes:.1} minutes)"
            ),
            Self::Progress {
                current,
                total,
                fetched,
                failed,
                skipped,
            } => write!(
                f,
                "Progress: [{current}/{total}] ({:.1}%) - Fetched: {fetched}, Failed: {failed}, Skipped: {skipped}",
                percent(*current, *total)
            ),
            Self::Fetched {
                combination,
                records,
                latest_month,
            } => write!(
                f,
                "✅ {combination}: {records} records (latest: {})",
                latest_month.as_deref().unwrap_or("unknown")
            ),
            Self::NotAvailable { combination } => {
                write!(f, "🚫 {combination}: Not available in API")
            }
            Self::EmptyResponse { combination } => {
                write!(f, "⚠️ {combination}: No records in response")
            }
            Self::Failed { combination, error } => {
                write!(f, "❌ {combination}: Error fetching: {error}")
            }
            Self::CheckpointSaved { successful, failed } => {
                write!(f, "💾 Checkpoint saved ({successful} successful, {failed} failed)")
            }
            Self::DatasetWritten { path, records } => {
                write!(f, "✅ Dataset saved to {path} ({records} records)")
            }
            Self::Summary {
                successful,
                failed,
                not_available,
                skipped,
                new_records,
                total_records,
                initial_records,
                elapsed_secs,
            } => write!(
                f,
                "Fetch complete: {successful} successful, {failed} failed, \
                 {not_available} not available, {skipped} skipped, {new_records} new records, \
                 {total_records} total records (started with {initial_records}) in {:.1} minutes",
                elapsed_secs / 60.0
            ),
            Self::Finished { status } => write!(f, "DONE: {status}"),
        }
    }
}

/// JSON line envelope carrying the schema version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedEvent {
    /// Schema version
    pub v: u32,
    /// The event, flattened into the envelope
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Consumer of progress events
pub trait ProgressSink: Send + Sync {
    /// Handle one event; must not block for long
    fn emit(&self, event: &ProgressEvent);
}

/// Discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Line format for [`LineSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// Legacy text lines
    Text,
    /// Versioned JSON lines
    Json,
}

/// Writes one line per event to stdout
#[derive(Debug, Clone, Copy)]
pub struct LineSink {
    format: LineFormat,
}

impl LineSink {
    /// Create a sink with the given line format
    pub fn new(format: LineFormat) -> Self {
        Self { format }
    }

    /// Text lines on stdout
    pub fn text() -> Self {
        Self::new(LineFormat::Text)
    }

    /// JSON lines on stdout
    pub fn json() -> Self {
        Self::new(LineFormat::Json)
    }

    /// Render an event in this sink's format
    pub fn render(&self, event: &ProgressEvent) -> String {
        match self.format {
            LineFormat::Text => event.to_string(),
            LineFormat::Json => event.to_json_line(),
        }
    }
}

impl ProgressSink for LineSink {
    fn emit(&self, event: &ProgressEvent) {
        let line = self.render(event);
        let mut out = std::io::stdout().lock();
        // A closed stdout must not abort the run.
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

/// Terminal progress bar on stderr
pub struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    /// Create a hidden bar; it is sized on `RunStarted`
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarSink {
    fn emit(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { total, .. } => {
                self.bar.set_length(*total as u64);
                self.bar.set_message("fetching");
            }
            ProgressEvent::Progress {
                current,
                fetched,
                failed,
                skipped,
                ..
            } => {
                self.bar.set_position(*current as u64);
                self.bar.set_message(format!(
                    "fetched {fetched}, failed {failed}, skipped {skipped}"
                ));
            }
            ProgressEvent::Fetched { .. }
            | ProgressEvent::NotAvailable { .. }
            | ProgressEvent::EmptyResponse { .. }
            | ProgressEvent::Failed { .. } => {}
            ProgressEvent::Finished { status } => {
                self.bar.finish_with_message(format!("done: {status}"));
            }
            other => self.bar.println(other.to_string()),
        }
    }
}

/// Forwards events into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: &ProgressEvent) {
        // The receiver may have been dropped; the run carries on regardless.
        let _ = self.tx.send(event.clone());
    }
}

/// Fans events out to several sinks
pub struct MultiSink {
    sinks: Vec<std::sync::Arc<dyn ProgressSink>>,
}

impl MultiSink {
    /// Create a fan-out over `sinks`
    pub fn new(sinks: Vec<std::sync::Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }
}

impl ProgressSink for MultiSink {
    fn emit(&self, event: &ProgressEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
