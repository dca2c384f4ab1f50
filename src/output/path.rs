//! Dataset file naming and discovery
//!
//! Each run writes `abs_labour_force_ALL_DATA_<YYYYMMDD_HHMMSS>.csv`. The next
//! run loads the most recently modified file matching that prefix, including
//! `_FIXED` files produced by the repair command.

use super::{OutputError, OutputResult};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// File name prefix shared by all dataset outputs
pub const DATASET_FILE_PREFIX: &str = "abs_labour_force_ALL_DATA_";

/// Dataset file extension
pub const DATASET_FILE_EXTENSION: &str = "csv";

/// File name for a dataset written at `at`
pub fn dataset_file_name(at: DateTime<Local>) -> String {
    format!(
        "{DATASET_FILE_PREFIX}{}.{DATASET_FILE_EXTENSION}",
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Full path for a dataset written now in `output_dir`
pub fn timestamped_dataset_path(output_dir: &Path) -> PathBuf {
    output_dir.join(dataset_file_name(Local::now()))
}

fn is_dataset_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(DATASET_FILE_PREFIX)
        && path.extension().and_then(|e| e.to_str()) == Some(DATASET_FILE_EXTENSION)
}

/// Most recently modified dataset file in `output_dir`
///
/// Returns `Ok(None)` when the directory is missing or holds no dataset.
pub fn find_latest_dataset(output_dir: &Path) -> OutputResult<Option<PathBuf>> {
    let entries = match std::fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(OutputError::IoError(format!(
                "Failed to read directory {}: {e}",
                output_dir.display()
            )))
        }
    };

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_file() || !is_dataset_file(&path) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        // Ties broken by name so the timestamped suffix decides.
        let newer = match &latest {
            None => true,
            Some((best_time, best_path)) => {
                modified > *best_time || (modified == *best_time && path > *best_path)
            }
        };
        if newer {
            latest = Some((modified, path));
        }
    }

    if let Some((_, path)) = &latest {
        debug!(path = %path.display(), "Found latest dataset file");
    }
    Ok(latest.map(|(_, path)| path))
}
