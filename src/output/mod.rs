//! Dataset management and CSV output

pub mod csv;
pub mod dataset;
pub mod path;
pub mod repair;

pub use dataset::Dataset;
pub use path::{dataset_file_name, find_latest_dataset, DATASET_FILE_PREFIX};
pub use repair::{repair_raw_csv, repaired_path, RepairSummary};

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV read or write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Embedded JSON could not be parsed
    #[error("parse error: {0}")]
    ParseError(String),

    /// Input held nothing to write
    #[error("no records found in {0}")]
    NoRecords(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
