//! Resume capability for fetch runs
//!
//! Per-combination checkpoint state with atomic writes and file locking.

pub mod checkpoint;
pub mod lock;
pub mod state;

pub use checkpoint::CombinationRecord;
pub use lock::RunLock;
pub use state::{
    Checkpoint, CheckpointOrigin, CheckpointStore, FreshStartReason, ResumeError, StatusCounts,
};
