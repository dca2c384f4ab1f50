//! End-to-end fetch runs against scripted fetchers

use crate::common::{
    channel, config_in, dataset_files, drain, regions, two_by_two, Reply, ScriptedFetcher,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local};
use labour_force_fetcher::downloader::progress::{NullSink, ProgressEvent};
use labour_force_fetcher::downloader::{FetchExecutor, RunError, RunStatus};
use labour_force_fetcher::fetcher::{CombinationFetcher, FetchOutcome, FetcherError};
use labour_force_fetcher::grid::Combination;
use labour_force_fetcher::output::csv::{read_records, write_dataset};
use labour_force_fetcher::output::{dataset_file_name, Dataset};
use labour_force_fetcher::resume::{Checkpoint, CheckpointStore};
use labour_force_fetcher::shutdown::ShutdownCoordinator;
use labour_force_fetcher::DataRecord;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn load_checkpoint(dir: &TempDir) -> Checkpoint {
    CheckpointStore::new(dir.path().join("abs_fetch_checkpoint.json"))
        .try_load()
        .unwrap()
        .expect("checkpoint written")
}

fn status_of(checkpoint: &Checkpoint, key: &str) -> Option<&'static str> {
    checkpoint.get(key).map(|record| record.status())
}

#[tokio::test]
async fn test_two_by_two_grid_then_retry_of_failure() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        ScriptedFetcher::new(Reply::Records(3))
            .with_reply("A_Y_AGE_P_O", Reply::NotAvailable)
            .with_reply("B_X_AGE_P_O", Reply::NetworkError)
            .with_reply("B_Y_AGE_P_O", Reply::Records(5)),
    );
    let (sink, mut rx) = channel();
    let executor = FetchExecutor::new(config_in(&dir, two_by_two()), fetcher.clone(), Arc::new(sink));

    let summary = executor.run().await.unwrap();
    assert_eq!(summary.total_combinations, 4);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.not_available, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.new_records_added, 8);
    assert_eq!(summary.total_records, 8);
    assert_eq!(summary.status(), RunStatus::Success);

    let checkpoint = load_checkpoint(&dir);
    assert_eq!(checkpoint.len(), 4);
    assert_eq!(status_of(&checkpoint, "A_X_AGE_P_O"), Some("completed"));
    assert_eq!(status_of(&checkpoint, "A_Y_AGE_P_O"), Some("not_available"));
    assert_eq!(status_of(&checkpoint, "B_X_AGE_P_O"), Some("failed"));
    assert_eq!(status_of(&checkpoint, "B_Y_AGE_P_O"), Some("completed"));
    assert_eq!(checkpoint.total_records(), 8);
    assert!(checkpoint.last_run().is_some());

    let written = summary.output_path.clone().unwrap();
    assert_eq!(read_records(&written).unwrap().len(), 8);

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(ProgressEvent::RunStarted {
            total: 4,
            fresh: 0,
            to_fetch: 4,
            existing_records: 0,
            ..
        })
    ));
    assert!(events.contains(&ProgressEvent::NotAvailable {
        combination: "A/Y/AGE/P/O".to_string()
    }));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Failed { combination, .. } if combination == "B/X/AGE/P/O")));
    assert!(events.contains(&ProgressEvent::Progress {
        current: 4,
        total: 4,
        fetched: 2,
        failed: 1,
        skipped: 0,
    }));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Finished {
            status: RunStatus::Success
        })
    );

    // Second run: only the failed combination is retried.
    fetcher.set_reply("B_X_AGE_P_O", Reply::Records(2));
    let before = fetcher.call_count();
    let executor = FetchExecutor::new(config_in(&dir, two_by_two()), fetcher.clone(), Arc::new(NullSink));

    let summary = executor.run().await.unwrap();
    assert_eq!(fetcher.calls()[before..], ["B_X_AGE_P_O".to_string()]);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.initial_records, 8);
    assert_eq!(summary.new_records_added, 2);
    assert_eq!(summary.total_records, 10);

    let checkpoint = load_checkpoint(&dir);
    assert_eq!(status_of(&checkpoint, "B_X_AGE_P_O"), Some("completed"));
    assert_eq!(checkpoint.total_records(), 10);
}

#[tokio::test]
async fn test_rerun_within_window_fetches_nothing() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(Reply::Records(3)));

    let first = FetchExecutor::new(config_in(&dir, two_by_two()), fetcher.clone(), Arc::new(NullSink))
        .run()
        .await
        .unwrap();
    assert_eq!(fetcher.call_count(), 4);

    let (sink, mut rx) = channel();
    let second = FetchExecutor::new(config_in(&dir, two_by_two()), fetcher.clone(), Arc::new(sink))
        .run()
        .await
        .unwrap();

    assert_eq!(fetcher.call_count(), 4);
    assert_eq!(second.skipped, 4);
    assert_eq!(second.new_records_added, 0);
    assert_eq!(second.total_records, first.total_records);
    assert!(matches!(
        drain(&mut rx).first(),
        Some(ProgressEvent::RunStarted {
            fresh: 4,
            to_fetch: 0,
            existing_records: 12,
            ..
        })
    ));
}

#[tokio::test]
async fn test_freshness_rules_on_legacy_checkpoint() {
    let dir = TempDir::new().unwrap();
    let stamp = |days: i64| {
        (Local::now() - ChronoDuration::days(days))
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string()
    };
    let legacy = serde_json::json!({
        "completed_combinations": {
            "R00_X_AGE_P_O": {"status": "completed", "records": 3, "latest_month": "2024-01", "fetched_at": stamp(29)},
            "R01_X_AGE_P_O": {"status": "completed", "records": 3, "latest_month": "2024-01", "fetched_at": stamp(31)},
            "R02_X_AGE_P_O": {"status": "not_available", "fetched_at": stamp(400)},
            "R03_X_AGE_P_O": {"status": "failed", "fetched_at": stamp(0)},
            "R04_X_AGE_P_O": {"status": "rate_limited", "fetched_at": stamp(0)}
        },
        "last_run": null,
        "total_records": 0
    });
    std::fs::write(
        dir.path().join("abs_fetch_checkpoint.json"),
        serde_json::to_string_pretty(&legacy).unwrap(),
    )
    .unwrap();

    let fetcher = Arc::new(ScriptedFetcher::new(Reply::Records(1)));
    let summary = FetchExecutor::new(config_in(&dir, regions(5)), fetcher.clone(), Arc::new(NullSink))
        .run()
        .await
        .unwrap();

    assert_eq!(
        fetcher.calls(),
        ["R01_X_AGE_P_O", "R03_X_AGE_P_O", "R04_X_AGE_P_O"]
    );
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.successful, 3);

    let checkpoint = load_checkpoint(&dir);
    assert_eq!(checkpoint.schema_version(), "1.0.0");
    assert_eq!(status_of(&checkpoint, "R04_X_AGE_P_O"), Some("completed"));
}

/// Returns the same four observations for every combination
struct OverlappingFetcher;

fn shared_records() -> Vec<DataRecord> {
    ["2024-01", "2024-02", "2024-03", "2024-04"]
        .iter()
        .map(|month| {
            DataRecord::new()
                .with("region_description", "Victoria")
                .with("data_item_description", "Employed persons")
                .with("age_description", "15 years and over")
                .with("sex_description", "Persons")
                .with("adjustment_type_description", "Original")
                .with("observation_month", *month)
                .with("observation_value", "10")
        })
        .collect()
}

#[async_trait]
impl CombinationFetcher for OverlappingFetcher {
    async fn fetch(&self, _combination: &Combination) -> FetchOutcome {
        FetchOutcome::Records(shared_records())
    }
}

#[tokio::test]
async fn test_overlapping_records_are_stored_once() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let existing = Dataset::from_records(shared_records()[..2].to_vec());
    write_dataset(&out.join(dataset_file_name(Local::now())), &existing).unwrap();

    let summary = FetchExecutor::new(config_in(&dir, regions(3)), Arc::new(OverlappingFetcher), Arc::new(NullSink))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.successful, 3);
    assert_eq!(summary.initial_records, 2);
    assert_eq!(summary.new_records_added, 2);
    assert_eq!(summary.total_records, 4);
    assert_eq!(read_records(&summary.output_path.unwrap()).unwrap().len(), 4);
}

/// Returns one observation whose footnote is JSON null
struct NullFieldFetcher;

#[async_trait]
impl CombinationFetcher for NullFieldFetcher {
    async fn fetch(&self, combination: &Combination) -> FetchOutcome {
        let body = serde_json::json!({
            "region_description": combination.region(),
            "observation_month": "2024-01",
            "observation_value": 1.5,
            "footnote": null,
        });
        let record = DataRecord::from_json_object(body.as_object().unwrap());
        FetchOutcome::Records(vec![record])
    }
}

#[tokio::test]
async fn test_rerun_keeps_empty_columns() {
    let dir = TempDir::new().unwrap();

    let first = FetchExecutor::new(config_in(&dir, regions(1)), Arc::new(NullFieldFetcher), Arc::new(NullSink))
        .run()
        .await
        .unwrap();
    let first_bytes = std::fs::read_to_string(first.output_path.unwrap()).unwrap();
    assert!(first_bytes.starts_with("footnote,"));

    let second = FetchExecutor::new(config_in(&dir, regions(1)), Arc::new(NullFieldFetcher), Arc::new(NullSink))
        .run()
        .await
        .unwrap();
    assert_eq!(second.skipped, 1);
    let second_bytes = std::fs::read_to_string(second.output_path.unwrap()).unwrap();
    assert_eq!(second_bytes, first_bytes);
}

#[tokio::test]
async fn test_killed_run_repeats_only_unsaved_work() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, regions(5)).with_checkpoint_interval(2);
    let fetcher = Arc::new(ScriptedFetcher::new(Reply::Records(2)).with_reply("R04_X_AGE_P_O", Reply::Hang));

    let executor = FetchExecutor::new(config.clone(), fetcher.clone(), Arc::new(NullSink));
    let killed = tokio::time::timeout(Duration::from_secs(1), executor.run()).await;
    assert!(killed.is_err(), "run should still be waiting on the hung request");
    drop(executor);

    let checkpoint = load_checkpoint(&dir);
    assert_eq!(checkpoint.len(), 4);
    assert!(checkpoint.last_run().is_none());
    assert_eq!(dataset_files(&dir.path().join("out")), 1);

    let retry = Arc::new(ScriptedFetcher::new(Reply::Records(2)));
    let summary = FetchExecutor::new(config, retry.clone(), Arc::new(NullSink))
        .run()
        .await
        .unwrap();

    assert_eq!(retry.calls(), ["R04_X_AGE_P_O"]);
    assert_eq!(summary.initial_records, 8);
    assert_eq!(summary.total_records, 10);
}

#[tokio::test]
async fn test_shutdown_stops_between_combinations() {
    let dir = TempDir::new().unwrap();
    let shutdown = ShutdownCoordinator::shared();
    let fetcher = Arc::new(ScriptedFetcher::new(Reply::Records(1)));
    fetcher.stop_after(2, shutdown.clone());
    let (sink, mut rx) = channel();

    let summary = FetchExecutor::new(config_in(&dir, regions(6)), fetcher.clone(), Arc::new(sink))
        .with_shutdown(shutdown)
        .run()
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.status(), RunStatus::Interrupted);
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(summary.total_records, 2);

    let checkpoint = load_checkpoint(&dir);
    assert_eq!(checkpoint.len(), 2);
    assert!(checkpoint.last_run().is_none());
    assert_eq!(
        drain(&mut rx).last(),
        Some(&ProgressEvent::Finished {
            status: RunStatus::Interrupted
        })
    );

    let resumed = Arc::new(ScriptedFetcher::new(Reply::Records(1)));
    let summary = FetchExecutor::new(config_in(&dir, regions(6)), resumed.clone(), Arc::new(NullSink))
        .with_shutdown(ShutdownCoordinator::shared())
        .run()
        .await
        .unwrap();
    assert_eq!(resumed.call_count(), 4);
    assert_eq!(summary.total_records, 6);
    assert!(load_checkpoint(&dir).last_run().is_some());
}

#[tokio::test]
async fn test_rejected_key_aborts_and_keeps_progress() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(Reply::Records(2)).with_reply("R01_X_AGE_P_O", Reply::Unauthorized));
    let (sink, mut rx) = channel();

    let result = FetchExecutor::new(config_in(&dir, regions(3)), fetcher.clone(), Arc::new(sink))
        .run()
        .await;

    assert!(matches!(
        result,
        Err(RunError::Fetch(FetcherError::Unauthorized { status: 401 }))
    ));
    assert_eq!(fetcher.calls(), ["R00_X_AGE_P_O", "R01_X_AGE_P_O"]);

    let checkpoint = load_checkpoint(&dir);
    assert_eq!(checkpoint.len(), 1);
    assert!(checkpoint.get("R01_X_AGE_P_O").is_none());
    assert_eq!(dataset_files(&dir.path().join("out")), 1);
    assert_eq!(
        drain(&mut rx).last(),
        Some(&ProgressEvent::Finished {
            status: RunStatus::Failure
        })
    );
}

#[tokio::test]
async fn test_nothing_collected_writes_no_dataset() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(Reply::NotAvailable));

    let result = FetchExecutor::new(config_in(&dir, regions(2)), fetcher, Arc::new(NullSink))
        .run()
        .await;

    assert!(matches!(result, Err(RunError::NoData)));
    assert_eq!(dataset_files(&dir.path().join("out")), 0);

    let checkpoint = load_checkpoint(&dir);
    assert_eq!(checkpoint.status_counts().not_available, 2);
}

#[tokio::test]
async fn test_empty_response_is_retried_failure() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(Reply::Records(1)).with_reply("R00_X_AGE_P_O", Reply::Empty));
    let (sink, mut rx) = channel();

    let summary = FetchExecutor::new(config_in(&dir, regions(2)), fetcher, Arc::new(sink))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.successful, 1);
    assert_eq!(status_of(&load_checkpoint(&dir), "R00_X_AGE_P_O"), Some("failed"));
    assert!(drain(&mut rx).contains(&ProgressEvent::EmptyResponse {
        combination: "R00/X/AGE/P/O".to_string()
    }));
}

#[tokio::test]
async fn test_checkpoint_and_progress_cadence() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, regions(25))
        .with_checkpoint_interval(10)
        .with_progress_interval(10);
    let (sink, mut rx) = channel();

    FetchExecutor::new(config, Arc::new(ScriptedFetcher::new(Reply::Records(1))), Arc::new(sink))
        .run()
        .await
        .unwrap();

    let events = drain(&mut rx);
    let saves: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::CheckpointSaved { successful, .. } => Some(*successful),
            _ => None,
        })
        .collect();
    assert_eq!(saves, [10, 20, 25]);

    let positions: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress { current, .. } => Some(*current),
            _ => None,
        })
        .collect();
    assert_eq!(positions, [10, 20, 25]);
}
