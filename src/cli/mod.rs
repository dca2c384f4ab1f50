//! CLI command implementations

pub mod error;
pub mod fetch;
pub mod repair;
pub mod reset;
pub mod status;

pub use error::CliError;
pub use fetch::{Cli, Commands, FetchArgs};
pub use repair::RepairCommand;
pub use reset::ResetCommand;
pub use status::StatusCommand;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
