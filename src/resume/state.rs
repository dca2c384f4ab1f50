//! Checkpoint persistence and freshness policy
//!
//! Saves are atomic (temp file in the same directory, fsync, rename) and
//! serialized through an advisory lock next to the checkpoint file.

use super::checkpoint::{parse_timestamp, timestamp_now, CombinationRecord};
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current checkpoint schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum checkpoint file size (10 MB); larger files are treated as corrupt
pub const MAX_CHECKPOINT_FILE_SIZE: u64 = 10 * 1024 * 1024;

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Durable per-combination fetch status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "default_schema_version")]
    schema_version: String,
    #[serde(default)]
    completed_combinations: BTreeMap<String, CombinationRecord>,
    #[serde(default)]
    last_run: Option<String>,
    #[serde(default)]
    total_records: u64,
    #[serde(default)]
    last_checkpoint_save: Option<String>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Checkpoint {
    /// Create an empty checkpoint
    pub fn new() -> Self {
        Self {
            schema_version: default_schema_version(),
            completed_combinations: BTreeMap::new(),
            last_run: None,
            total_records: 0,
            last_checkpoint_save: None,
        }
    }

    /// Get the schema version
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Get the record for a combination key
    pub fn get(&self, key: &str) -> Option<&CombinationRecord> {
        self.completed_combinations.get(key)
    }

    /// Record the outcome of an attempt, replacing any earlier entry
    pub fn record(&mut self, key: impl Into<String>, record: CombinationRecord) {
        self.completed_combinations.insert(key.into(), record);
    }

    /// Iterate over `(key, record)` pairs in key order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &CombinationRecord)> {
        self.completed_combinations
            .iter()
            .map(|(key, record)| (key.as_str(), record))
    }

    /// Number of attempted combinations
    pub fn len(&self) -> usize {
        self.completed_combinations.len()
    }

    /// Whether no combination has been attempted
    pub fn is_empty(&self) -> bool {
        self.completed_combinations.is_empty()
    }

    /// Whether `key` can be skipped now
    pub fn is_fresh(&self, key: &str, window: chrono::Duration) -> bool {
        self.is_fresh_at(key, window, Utc::now())
    }

    /// Whether `key` can be skipped at `now`; never-attempted keys are stale
    pub fn is_fresh_at(&self, key: &str, window: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.get(key)
            .map(|record| record.is_fresh_at(window, now))
            .unwrap_or(false)
    }

    /// Raw timestamp of the last completed run
    pub fn last_run(&self) -> Option<&str> {
        self.last_run.as_deref()
    }

    /// Parsed timestamp of the last completed run
    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run.as_deref().and_then(parse_timestamp)
    }

    /// Stamp `last_run` with the current time
    pub fn mark_run_complete(&mut self) {
        self.last_run = Some(timestamp_now());
    }

    /// Dataset size at the last save
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    /// Set the dataset size
    pub fn set_total_records(&mut self, total: u64) {
        self.total_records = total;
    }

    /// Raw timestamp of the last save
    pub fn last_checkpoint_save(&self) -> Option<&str> {
        self.last_checkpoint_save.as_deref()
    }

    /// Count entries by status
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.completed_combinations.values() {
            match record {
                CombinationRecord::Completed { .. } => counts.completed += 1,
                CombinationRecord::NotAvailable { .. } => counts.not_available += 1,
                CombinationRecord::Failed { .. } => counts.failed += 1,
                CombinationRecord::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    /// Latest observation month across completed combinations
    pub fn latest_month(&self) -> Option<&str> {
        self.completed_combinations
            .values()
            .filter_map(CombinationRecord::latest_month)
            .max()
    }
}

/// Entry counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Completed combinations
    pub completed: usize,
    /// Combinations the API has no data for
    pub not_available: usize,
    /// Failed attempts awaiting retry
    pub failed: usize,
    /// Entries with an unrecognised status
    pub unknown: usize,
}

/// Why a run starts without prior state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreshStartReason {
    /// No checkpoint file exists
    Missing,
    /// The checkpoint file could not be read or parsed
    Corrupt(String),
}

/// Where a loaded checkpoint came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOrigin {
    /// Loaded from an existing checkpoint file
    Resumed,
    /// Started empty
    FreshStart(FreshStartReason),
}

impl CheckpointOrigin {
    /// Whether prior state was loaded
    pub fn is_resumed(&self) -> bool {
        matches!(self, Self::Resumed)
    }
}

/// File-backed checkpoint storage
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a store for the checkpoint at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the checkpoint path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".save.lock");
        PathBuf::from(name)
    }

    /// Load the checkpoint, starting empty when it is missing or unreadable
    ///
    /// Never fails: a corrupt checkpoint is logged and replaced by an empty one.
    pub fn load(&self) -> (Checkpoint, CheckpointOrigin) {
        match self.try_load() {
            Ok(Some(checkpoint)) => (checkpoint, CheckpointOrigin::Resumed),
            Ok(None) => {
                info!(path = %self.path.display(), "No checkpoint found, starting fresh");
                (
                    Checkpoint::new(),
                    CheckpointOrigin::FreshStart(FreshStartReason::Missing),
                )
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not load checkpoint, starting fresh"
                );
                (
                    Checkpoint::new(),
                    CheckpointOrigin::FreshStart(FreshStartReason::Corrupt(e.to_string())),
                )
            }
        }
    }

    /// Load the checkpoint, reporting errors; `Ok(None)` when no file exists
    pub fn try_load(&self) -> Result<Option<Checkpoint>, ResumeError> {
        debug!(path = %self.path.display(), "Loading checkpoint");

        if !self.path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;
        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata =
            std::fs::metadata(&self.path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_CHECKPOINT_FILE_SIZE {
            return Err(ResumeError::CheckpointTooLarge {
                size: metadata.len(),
                max: MAX_CHECKPOINT_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        let checkpoint: Checkpoint = serde_json::from_str(&contents)
            .map_err(|e| ResumeError::DeserializationError(e.to_string()))?;

        if checkpoint.schema_version != SCHEMA_VERSION {
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: checkpoint.schema_version,
            });
        }

        info!(
            path = %self.path.display(),
            combinations = checkpoint.len(),
            total_records = checkpoint.total_records,
            "Checkpoint loaded"
        );
        Ok(Some(checkpoint))
    }

    /// Stamp `last_checkpoint_save` and write the checkpoint atomically
    pub fn save(&self, checkpoint: &mut Checkpoint) -> Result<(), ResumeError> {
        checkpoint.last_checkpoint_save = Some(timestamp_now());
        let path = self.path.as_path();

        debug!(
            path = %path.display(),
            combinations = checkpoint.len(),
            "Saving checkpoint"
        );

        let parent_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        // Make the rename durable
        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        crate::metrics::record_checkpoint_save();
        info!(
            path = %path.display(),
            combinations = checkpoint.len(),
            total_records = checkpoint.total_records,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Delete the checkpoint file; returns whether a file was removed
    pub fn remove(&self) -> Result<bool, ResumeError> {
        let existed = match std::fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(ResumeError::IoError(e.to_string())),
        };
        let _ = std::fs::remove_file(self.lock_path());
        if existed {
            info!(path = %self.path.display(), "Checkpoint removed");
        }
        Ok(existed)
    }
}

/// Errors related to checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Checkpoint file too large
    #[error("checkpoint file too large: {size} bytes (max: {max} bytes)")]
    CheckpointTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),

    /// Another run holds the checkpoint
    #[error("another fetch run is already using this checkpoint (lock: {0})")]
    AlreadyRunning(String),
}
