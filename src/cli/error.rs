//! CLI error types and conversions

use crate::downloader::{ConfigError, RunError};
use crate::output::OutputError;
use crate::resume::ResumeError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration could not be resolved
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The fetch run failed
    #[error("fetch failed: {0}")]
    Run(#[from] RunError),

    /// Checkpoint error
    #[error("checkpoint error: {0}")]
    Resume(#[from] ResumeError),

    /// Output error
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Metrics exporter or other environment setup failed
    #[error("setup error: {0}")]
    Setup(String),
}
