//! Fetch command implementation

use crate::downloader::config::{
    resolve_api_key, save_api_key, CHECKPOINT_SAVE_INTERVAL, DATA_FRESHNESS_DAYS,
    DEFAULT_API_CONFIG_FILE, DEFAULT_BASE_URL, DEFAULT_CHECKPOINT_FILE, MAX_REQUESTS_PER_WINDOW,
    PROGRESS_INTERVAL, RATE_LIMIT_WINDOW,
};
use crate::downloader::progress::{BarSink, LineSink, ProgressSink};
use crate::downloader::{FetchConfig, FetchExecutor, RunError, RunSummary};
use crate::fetcher::AbsHttpClient;
use crate::resume::RunLock;
use crate::shutdown::SharedShutdown;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::{CliError, OutputFormat, RepairCommand, ResetCommand, StatusCommand};

/// ABS labour force fetcher CLI
#[derive(Parser, Debug)]
#[command(name = "labour-force-fetcher")]
#[command(about = "Incrementally fetch ABS labour force statistics", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output_format: OutputFormat,

    /// Checkpoint file
    #[arg(long, global = true, default_value = DEFAULT_CHECKPOINT_FILE)]
    pub checkpoint: PathBuf,

    /// Directory holding the dataset CSV files
    #[arg(long, global = true, default_value = ".")]
    pub output_dir: PathBuf,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every stale combination and merge it into the dataset
    Fetch(FetchArgs),

    /// Show checkpoint status
    Status(StatusCommand),

    /// Delete the checkpoint so the next run fetches everything
    Reset(ResetCommand),

    /// Expand a raw export into a flat CSV
    Repair(RepairCommand),
}

/// How progress events are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressFormat {
    /// Legacy text lines on stdout
    Text,
    /// Versioned JSON lines on stdout
    Json,
    /// Progress bar on stderr
    Bar,
}

/// Fetch command arguments
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// API key (falls back to ABS_API_KEY, then the config file)
    #[arg(long, env = "ABS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// JSON file holding {"api_key": "..."}
    #[arg(long, default_value = DEFAULT_API_CONFIG_FILE)]
    pub config: PathBuf,

    /// Write the resolved API key to the config file before fetching
    #[arg(long)]
    pub save_key: bool,

    /// Skip combinations fetched within this many days
    #[arg(long, default_value_t = DATA_FRESHNESS_DAYS)]
    pub freshness_days: u32,

    /// Save the checkpoint every N attempted combinations
    #[arg(long, default_value_t = CHECKPOINT_SAVE_INTERVAL, value_parser = clap::value_parser!(u64).range(1..))]
    pub checkpoint_interval: u64,

    /// Requests allowed per rate-limit window
    #[arg(long, default_value_t = MAX_REQUESTS_PER_WINDOW)]
    pub max_requests: usize,

    /// Rate-limit window in seconds
    #[arg(long, default_value_t = RATE_LIMIT_WINDOW.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_window_secs: u64,

    /// API endpoint
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Progress output
    #[arg(long, value_enum, default_value = "text")]
    pub progress_format: ProgressFormat,

    /// Emit a progress event every N combinations
    #[arg(long, default_value_t = PROGRESS_INTERVAL)]
    pub progress_interval: usize,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl FetchArgs {
    /// Build the run configuration from the arguments
    pub fn to_config(&self, cli: &Cli) -> Result<FetchConfig, CliError> {
        let api_key = resolve_api_key(self.api_key.as_deref(), &self.config)?;
        let config = FetchConfig::new(api_key)
            .with_base_url(self.base_url.clone())
            .with_freshness_days(self.freshness_days)
            .with_checkpoint_interval(self.checkpoint_interval)
            .with_progress_interval(self.progress_interval)
            .with_rate_limit(self.max_requests, Duration::from_secs(self.rate_window_secs))
            .with_checkpoint_path(cli.checkpoint.clone())
            .with_output_dir(cli.output_dir.clone());
        config.validate()?;
        Ok(config)
    }

    fn progress_sink(&self) -> Arc<dyn ProgressSink> {
        match self.progress_format {
            ProgressFormat::Text => Arc::new(LineSink::text()),
            ProgressFormat::Json => Arc::new(LineSink::json()),
            ProgressFormat::Bar => Arc::new(BarSink::new()),
        }
    }

    /// Execute the fetch run
    ///
    /// Holds the checkpoint's run lock for the whole run.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<RunSummary, CliError> {
        let config = self.to_config(cli)?;
        if self.save_key {
            save_api_key(&config.api_key, &self.config)?;
        }

        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)
                .map_err(|e| CliError::Setup(format!("Failed to start metrics exporter: {e}")))?;
            info!(%addr, "Prometheus metrics exporter listening");
        }

        let _lock = RunLock::try_acquire(&config.checkpoint_path)?;

        let client = AbsHttpClient::from_config(&config);
        let executor = FetchExecutor::new(config, Arc::new(client), self.progress_sink())
            .with_shutdown(shutdown);
        let result = executor.run().await;

        match cli.output_format {
            OutputFormat::Json => output_json(&result),
            OutputFormat::Human => output_human(&result),
        }

        result.map_err(CliError::Run)
    }
}

/// Print the run result as one JSON object
fn output_json(result: &Result<RunSummary, RunError>) {
    let output = match result {
        Ok(summary) => serde_json::json!({
            "success": true,
            "status": summary.status(),
            "total_combinations": summary.total_combinations,
            "successful": summary.successful,
            "failed": summary.failed,
            "not_available": summary.not_available,
            "skipped": summary.skipped,
            "new_records": summary.new_records_added,
            "initial_records": summary.initial_records,
            "total_records": summary.total_records,
            "elapsed_secs": summary.elapsed.as_secs_f64(),
            "output_path": summary.output_path.as_ref().map(|p| p.display().to_string()),
        }),
        Err(e) => serde_json::json!({
            "success": false,
            "error": e.to_string(),
        }),
    };
    println!("{output}");
}

/// Print the run result for humans
fn output_human(result: &Result<RunSummary, RunError>) {
    match result {
        Ok(summary) => {
            if summary.interrupted {
                println!("\nFetch interrupted; progress saved.");
            } else {
                println!("\nFetch completed successfully!");
            }
            if let Some(path) = &summary.output_path {
                println!("Output: {}", path.display());
            }
            println!("New records: {}", summary.new_records_added);
            println!("Total records: {}", summary.total_records);
            if summary.failed > 0 {
                println!(
                    "Failed combinations: {} (retried on the next run)",
                    summary.failed
                );
            }
        }
        Err(e) => {
            eprintln!("\nFetch failed!");
            eprintln!("Error: {e}");
            error!(error = %e, "Fetch failed");
        }
    }
}
