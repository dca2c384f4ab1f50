//! Status subcommand
//!
//! Summarizes the checkpoint: when the last full run finished, how many
//! combinations have been attempted and how the attempts ended.

use super::{Cli, CliError, OutputFormat};
use crate::downloader::config::DATA_FRESHNESS_DAYS;
use crate::grid::Grid;
use crate::output::find_latest_dataset;
use crate::resume::{Checkpoint, CheckpointStore, StatusCounts};
use chrono::{DateTime, Local, Utc};
use clap::Args;
use serde::Serialize;
use std::path::Path;

/// Status command arguments
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Freshness window used to count combinations due for refresh
    #[arg(long, default_value_t = DATA_FRESHNESS_DAYS)]
    pub freshness_days: u32,
}

/// Checkpoint status report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Checkpoint file
    pub checkpoint: String,
    /// Whether the checkpoint file exists
    pub exists: bool,
    /// Completion time of the last full run
    pub last_run: Option<String>,
    /// Whole days since the last full run
    pub days_since_last_run: Option<i64>,
    /// Human label for the age of the data
    pub freshness: String,
    /// Dataset size recorded at the last save
    pub total_records: u64,
    /// Combinations with a checkpoint entry
    pub attempted: usize,
    /// Grid size
    pub grid_total: usize,
    /// Combinations that the next run would fetch
    pub due: usize,
    /// Entries per status
    pub counts: StatusCounts,
    /// Latest observation month over completed combinations
    pub latest_month: Option<String>,
    /// Newest dataset file in the output directory
    pub latest_dataset: Option<String>,
}

/// Label for the age of the last run; flagged once it reaches `freshness_days`
pub fn freshness_label(days_ago: i64, freshness_days: u32) -> String {
    match days_ago {
        d if d <= 0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        d if d < i64::from(freshness_days) => format!("{d} days ago"),
        d => format!("{d} days ago (Needs refresh)"),
    }
}

/// Build the report for a checkpoint file
pub fn build_report(
    checkpoint_path: &Path,
    output_dir: &Path,
    grid: &Grid,
    freshness_days: u32,
    now: DateTime<Utc>,
) -> Result<StatusReport, CliError> {
    let loaded = CheckpointStore::new(checkpoint_path).try_load()?;
    let exists = loaded.is_some();
    let checkpoint = loaded.unwrap_or_else(Checkpoint::new);

    let last_run_at = checkpoint.last_run_at();
    let days_since_last_run = last_run_at.map(|at| (now - at).num_days());
    let freshness = days_since_last_run
        .map(|days| freshness_label(days, freshness_days))
        .unwrap_or_else(|| "Never".to_string());

    let window = chrono::Duration::days(i64::from(freshness_days));
    let due = grid
        .combinations()
        .filter(|c| !checkpoint.is_fresh_at(&c.key(), window, now))
        .count();

    Ok(StatusReport {
        checkpoint: checkpoint_path.display().to_string(),
        exists,
        last_run: last_run_at.map(|at| {
            at.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        }),
        days_since_last_run,
        freshness,
        total_records: checkpoint.total_records(),
        attempted: checkpoint.len(),
        grid_total: grid.len(),
        due,
        counts: checkpoint.status_counts(),
        latest_month: checkpoint.latest_month().map(str::to_string),
        latest_dataset: find_latest_dataset(output_dir)?.map(|p| p.display().to_string()),
    })
}

impl StatusCommand {
    /// Execute the status command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let report = build_report(
            &cli.checkpoint,
            &cli.output_dir,
            &Grid::labour_force(),
            self.freshness_days,
            Utc::now(),
        )?;

        match cli.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&report).map_err(|e| {
                    CliError::InvalidArgument(format!("Failed to serialize status: {e}"))
                })?;
                println!("{json}");
            }
            OutputFormat::Human => print_human(&report),
        }
        Ok(())
    }
}

fn print_human(report: &StatusReport) {
    if !report.exists {
        println!("No checkpoint at {}; the next run fetches everything.", report.checkpoint);
        return;
    }

    println!("Checkpoint: {}", report.checkpoint);
    println!(
        "Last run: {}",
        report.last_run.as_deref().unwrap_or("Never")
    );
    println!("Freshness: {}", report.freshness);
    println!("Total records: {}", report.total_records);
    println!("Combinations: {} / {}", report.attempted, report.grid_total);
    println!(
        "  completed {}, not available {}, failed {}",
        report.counts.completed, report.counts.not_available, report.counts.failed
    );
    if report.counts.unknown > 0 {
        println!("  unrecognized {}", report.counts.unknown);
    }
    println!("Due for refresh: {}", report.due);
    println!(
        "Latest month: {}",
        report.latest_month.as_deref().unwrap_or("Unknown")
    );
    if let Some(dataset) = &report.latest_dataset {
        println!("Latest dataset: {dataset}");
    }
}
