//! Shared fixtures: scripted fetchers and small grids

#![allow(dead_code)]

use async_trait::async_trait;
use labour_force_fetcher::downloader::progress::{ChannelSink, ProgressEvent};
use labour_force_fetcher::downloader::{ApiKey, FetchConfig};
use labour_force_fetcher::fetcher::{CombinationFetcher, FetchOutcome, FetcherError};
use labour_force_fetcher::grid::{Combination, Grid};
use labour_force_fetcher::shutdown::SharedShutdown;
use labour_force_fetcher::DataRecord;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

/// Scripted response for one combination
#[derive(Debug, Clone)]
pub enum Reply {
    /// `n` distinct monthly records
    Records(usize),
    /// 200 with an empty record list
    Empty,
    /// HTTP 404
    NotAvailable,
    /// Transport error
    NetworkError,
    /// HTTP 401
    Unauthorized,
    /// Never completes, like a process killed mid-request
    Hang,
}

/// Fetcher answering from a per-key script and logging every call
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    default: Reply,
    calls: Mutex<Vec<String>>,
    stop_after: Mutex<Option<(usize, SharedShutdown)>>,
}

impl ScriptedFetcher {
    pub fn new(default: Reply) -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            default,
            calls: Mutex::new(Vec::new()),
            stop_after: Mutex::new(None),
        }
    }

    pub fn with_reply(self, key: &str, reply: Reply) -> Self {
        self.set_reply(key, reply);
        self
    }

    pub fn set_reply(&self, key: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(key.to_string(), reply);
    }

    /// Request shutdown once `calls` fetches have been made
    pub fn stop_after(&self, calls: usize, shutdown: SharedShutdown) {
        *self.stop_after.lock().unwrap() = Some((calls, shutdown));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CombinationFetcher for ScriptedFetcher {
    async fn fetch(&self, combination: &Combination) -> FetchOutcome {
        let key = combination.key();
        let made = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(key.clone());
            calls.len()
        };
        if let Some((limit, shutdown)) = self.stop_after.lock().unwrap().as_ref() {
            if made >= *limit {
                shutdown.request_shutdown();
            }
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        match reply {
            Reply::Records(n) => FetchOutcome::Records(records_for(combination, n)),
            Reply::Empty => FetchOutcome::Records(Vec::new()),
            Reply::NotAvailable => FetchOutcome::NotAvailable,
            Reply::NetworkError => {
                FetchOutcome::Failure(FetcherError::NetworkError("connection reset".to_string()))
            }
            Reply::Unauthorized => FetchOutcome::Failure(FetcherError::Unauthorized { status: 401 }),
            Reply::Hang => {
                std::future::pending::<()>().await;
                FetchOutcome::NotAvailable
            }
        }
    }
}

/// `n` records for a combination, one per month starting 2023-01
pub fn records_for(combination: &Combination, n: usize) -> Vec<DataRecord> {
    (0..n)
        .map(|i| {
            DataRecord::new()
                .with("region_description", combination.region())
                .with("data_item_description", combination.data_item())
                .with("age_description", combination.age())
                .with("sex_description", combination.sex())
                .with("adjustment_type_description", combination.adjustment_type())
                .with("observation_month", format!("{}-{:02}", 2023 + i / 12, i % 12 + 1))
                .with("observation_value", format!("{}.5", 100 + i))
        })
        .collect()
}

/// 2 regions × 2 data items, one value in every other dimension
pub fn two_by_two() -> Grid {
    Grid::new(&["A", "B"], &["X", "Y"], &["AGE"], &["P"], &["O"])
}

/// Grid with `n` regions and one value in every other dimension
pub fn regions(n: usize) -> Grid {
    let names: Vec<String> = (0..n).map(|i| format!("R{i:02}")).collect();
    Grid::new(&names, &["X".to_string()], &["AGE".to_string()], &["P".to_string()], &["O".to_string()])
}

/// Config rooted in `dir`, with the limiter wide open
pub fn config_in(dir: &TempDir, grid: Grid) -> FetchConfig {
    FetchConfig::new(ApiKey::new("test-key-0123456789"))
        .with_grid(grid)
        .with_checkpoint_path(dir.path().join("abs_fetch_checkpoint.json"))
        .with_output_dir(dir.path().join("out"))
        .with_rate_limit(1000, std::time::Duration::from_secs(1))
}

/// Drain every event currently buffered in `rx`
pub fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A channel sink with its receiver
pub fn channel() -> (ChannelSink, UnboundedReceiver<ProgressEvent>) {
    ChannelSink::new()
}

/// Number of dataset files in `dir`
pub fn dataset_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| {
                    e.file_name()
                        .to_string_lossy()
                        .starts_with(labour_force_fetcher::output::DATASET_FILE_PREFIX)
                })
                .count()
        })
        .unwrap_or(0)
}
