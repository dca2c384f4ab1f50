//! Reset subcommand

use super::{Cli, CliError, OutputFormat};
use crate::resume::{CheckpointStore, RunLock};
use clap::Args;
use tracing::info;

/// Delete the checkpoint file
#[derive(Args, Debug)]
pub struct ResetCommand {
    /// Confirm deletion
    #[arg(long)]
    pub yes: bool,
}

impl ResetCommand {
    /// Execute the reset command
    ///
    /// Refuses while a fetch run holds the checkpoint's run lock.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        if !self.yes {
            return Err(CliError::InvalidArgument(
                "reset deletes all fetch progress; pass --yes to confirm".to_string(),
            ));
        }

        let _lock = RunLock::try_acquire(&cli.checkpoint)?;
        let removed = CheckpointStore::new(&cli.checkpoint).remove()?;
        info!(path = %cli.checkpoint.display(), removed, "Checkpoint reset");

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({
                    "checkpoint": cli.checkpoint.display().to_string(),
                    "removed": removed,
                })
            ),
            OutputFormat::Human if removed => {
                println!("Deleted {}; the next run fetches everything.", cli.checkpoint.display())
            }
            OutputFormat::Human => println!("No checkpoint at {}", cli.checkpoint.display()),
        }
        Ok(())
    }
}
