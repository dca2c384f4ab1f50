//! Main entry point for the labour-force-fetcher CLI

use clap::Parser;
use labour_force_fetcher::cli::{Cli, Commands};
use labour_force_fetcher::shutdown::{self, ShutdownCoordinator};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Exit code for a run stopped by Ctrl+C
const EXIT_INTERRUPTED: i32 = 130;

/// Initialize tracing on stderr with optional JSON formatting
///
/// Stdout is reserved for progress lines and command output.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("labour_force_fetcher=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    shutdown::install_ctrl_c_handler(shutdown.clone());

    let result = match cli.command {
        Commands::Fetch(ref args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map(|summary| summary.interrupted)
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Status(ref cmd) => cmd.execute(&cli).map(|_| false).map_err(|e| anyhow::anyhow!(e)),
        Commands::Reset(ref cmd) => cmd.execute(&cli).map(|_| false).map_err(|e| anyhow::anyhow!(e)),
        Commands::Repair(ref cmd) => cmd.execute(&cli).map(|_| false).map_err(|e| anyhow::anyhow!(e)),
    };

    match result {
        Ok(false) => {}
        Ok(true) => std::process::exit(EXIT_INTERRUPTED),
        Err(e) => {
            error!("Command failed: {:#}", e);
            if shutdown.is_shutdown_requested() {
                std::process::exit(EXIT_INTERRUPTED);
            }
            std::process::exit(1);
        }
    }
}
