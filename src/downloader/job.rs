//! Run counters and summary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run completed and a dataset was written
    Success,
    /// The run aborted or produced no output
    Failure,
    /// The run was stopped by a shutdown request
    Interrupted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

/// Per-run outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Combinations fetched with at least one record
    pub successful: u64,
    /// Failed combinations, including empty responses
    pub failed: u64,
    /// Failures caused by a response with no records
    pub empty: u64,
    /// Combinations the API has no data for
    pub not_available: u64,
    /// Fresh combinations skipped
    pub skipped: u64,
    /// Records added to the dataset
    pub new_records_added: u64,
}

impl RunStats {
    /// Number of fetch attempts (skips excluded)
    pub fn attempts(&self) -> u64 {
        self.successful + self.failed + self.not_available
    }
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Grid size
    pub total_combinations: usize,
    /// Combinations fetched with at least one record
    pub successful: u64,
    /// Failed combinations
    pub failed: u64,
    /// Combinations the API has no data for
    pub not_available: u64,
    /// Fresh combinations skipped
    pub skipped: u64,
    /// Records added to the dataset
    pub new_records_added: u64,
    /// Dataset size before the run
    pub initial_records: usize,
    /// Dataset size after the run
    pub total_records: usize,
    /// Wall time of the run
    pub elapsed: Duration,
    /// Whether the run stopped early on a shutdown request
    pub interrupted: bool,
    /// Written dataset file, if any
    pub output_path: Option<PathBuf>,
}

impl RunSummary {
    /// Build a summary from the run counters
    pub fn from_stats(stats: &RunStats, total_combinations: usize) -> Self {
        Self {
            total_combinations,
            successful: stats.successful,
            failed: stats.failed,
            not_available: stats.not_available,
            skipped: stats.skipped,
            new_records_added: stats.new_records_added,
            initial_records: 0,
            total_records: 0,
            elapsed: Duration::ZERO,
            interrupted: false,
            output_path: None,
        }
    }

    /// Status reported by the terminal event
    pub fn status(&self) -> RunStatus {
        if self.interrupted {
            RunStatus::Interrupted
        } else {
            RunStatus::Success
        }
    }
}
