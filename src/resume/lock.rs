//! Single-run guard for a checkpoint file
//!
//! Advisory lock on `<checkpoint>.run.lock`, held for the whole fetch run.

use super::state::ResumeError;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive run lock; released on drop
pub struct RunLock {
    // Closing the file on drop releases the lock.
    #[allow(dead_code)]
    lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Lock file path for a checkpoint
    pub fn lock_path(checkpoint: &Path) -> PathBuf {
        let mut name = checkpoint.as_os_str().to_owned();
        name.push(".run.lock");
        PathBuf::from(name)
    }

    /// Try to take the run lock without blocking
    ///
    /// Fails immediately with [`ResumeError::AlreadyRunning`] when another
    /// run holds it.
    pub fn try_acquire(checkpoint: &Path) -> Result<Self, ResumeError> {
        let path = Self::lock_path(checkpoint);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        match lock.try_write() {
            Ok(guard) => {
                // Keep the lock held past the guard's lifetime.
                std::mem::forget(guard);
            }
            Err(_) => return Err(ResumeError::AlreadyRunning(path.display().to_string())),
        }

        debug!(path = %path.display(), "Run lock acquired");
        Ok(Self { lock, path })
    }

    /// Get the lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
