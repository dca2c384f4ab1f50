//! Run orchestration and rate limiting
//!
//! The orchestrator walks the combination grid one combination at a time:
//!
//! 1. **Freshness**: combinations with a fresh checkpoint entry are skipped
//! 2. **Fetch**: everything else goes through the [`crate::fetcher::CombinationFetcher`],
//!    throttled by the [`rate_limit::RateLimiter`]
//! 3. **Merge**: new records are deduplicated into the dataset
//! 4. **Persist**: the dataset and checkpoint are saved every N attempts and at the end
//!
//! Progress is reported as [`progress::ProgressEvent`]s to a
//! [`progress::ProgressSink`].
//!
//! # Components
//!
//! - [`executor`] - The run loop
//! - [`config`] - Run configuration, defaults and API key handling
//! - [`job`] - Run counters and the final summary
//! - [`progress`] - Progress events and sinks
//! - [`rate_limit`] - Sliding-window rate limiter

pub mod config;
pub mod executor;
pub mod job;
pub mod progress;
pub mod rate_limit;

pub use config::{ApiKey, ConfigError, FetchConfig};
pub use executor::FetchExecutor;
pub use job::{RunStats, RunStatus, RunSummary};
pub use rate_limit::RateLimiter;

use crate::fetcher::FetcherError;
use crate::output::OutputError;
use crate::resume::ResumeError;

/// Errors that end a run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Checkpoint could not be written
    #[error("checkpoint error: {0}")]
    Resume(#[from] ResumeError),

    /// Dataset could not be read or written
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// A fetch failure that makes further requests pointless
    #[error("fetch aborted: {0}")]
    Fetch(#[from] FetcherError),

    /// Nothing was collected, so no output file was written
    #[error("no data collected; nothing to write")]
    NoData,
}
