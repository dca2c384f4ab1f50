//! Repair subcommand

use super::{Cli, CliError, OutputFormat};
use crate::output::repair_raw_csv;
use clap::Args;
use std::path::PathBuf;

/// Expand a raw export whose `labour_force_statistics` column holds record lists
#[derive(Args, Debug)]
pub struct RepairCommand {
    /// Raw CSV file
    #[arg(long)]
    pub input: PathBuf,

    /// Flat CSV to write (default: `<input>_FIXED.csv`)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl RepairCommand {
    /// Execute the repair command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        if !self.input.exists() {
            return Err(CliError::InvalidArgument(format!(
                "{} does not exist",
                self.input.display()
            )));
        }

        let summary = repair_raw_csv(&self.input, self.output.as_deref())?;

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({
                    "input": self.input.display().to_string(),
                    "output": summary.output.display().to_string(),
                    "records": summary.records,
                    "fields": summary.fields,
                    "first_month": summary.first_month,
                    "last_month": summary.last_month,
                })
            ),
            OutputFormat::Human => {
                println!("✅ Fixed CSV saved to {}", summary.output.display());
                println!("Records: {}", summary.records);
                println!("Columns: {}", summary.fields.join(", "));
                if let (Some(first), Some(last)) = (&summary.first_month, &summary.last_month) {
                    println!("Date range: {first} to {last}");
                }
            }
        }
        Ok(())
    }
}
