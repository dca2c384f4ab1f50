//! # Labour Force Fetcher Library
//!
//! Checkpointed, incremental retrieval of labour force statistics from the ABS
//! labour force API, across a fixed grid of query dimensions
//! (region × data item × age group × sex × adjustment type).
//!
//! ## Features
//!
//! - **Resume Capability**: Per-combination checkpointing with atomic writes, so an
//!   interrupted run picks up where the last save left off
//! - **Freshness Policy**: Combinations fetched within the freshness window are skipped
//! - **Rate Limiting**: Sliding-window request quota that never exceeds the API limit
//! - **Deduplicated Dataset**: Records are merged by identity tuple across runs
//! - **Structured Progress**: Versioned progress events with a legacy text rendering
//!
//! ## Quick Start
//!
//! ```no_run
//! use labour_force_fetcher::downloader::{FetchConfig, FetchExecutor};
//! use labour_force_fetcher::downloader::progress::LineSink;
//! use labour_force_fetcher::fetcher::AbsHttpClient;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetchConfig::new("my-api-key".into())
//!     .with_freshness_days(30)
//!     .with_checkpoint_path("abs_fetch_checkpoint.json");
//! config.validate()?;
//!
//! let client = AbsHttpClient::from_config(&config);
//! let executor = FetchExecutor::new(config, Arc::new(client), Arc::new(LineSink::text()));
//! let summary = executor.run().await?;
//! println!("{} new records", summary.new_records_added);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`grid`] - Query grid and combination enumeration
//! - [`downloader`] - Run orchestration, rate limiting and progress events
//! - [`fetcher`] - HTTP client and response parsing
//! - [`resume`] - Checkpoint persistence and freshness policy
//! - [`output`] - Dataset merge and CSV output
//! - [`supervisor`] - Running the engine as a task with an event channel

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// CLI command implementations
pub mod cli;

/// Run orchestration
pub mod downloader;

/// Remote API access
pub mod fetcher;

/// Query grid and combination enumeration
pub mod grid;

/// Observability metrics
pub mod metrics;

/// Dataset management and CSV output
pub mod output;

/// Checkpoint persistence
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Engine supervision over an event channel
pub mod supervisor;

// Re-export commonly used types
pub use grid::{Combination, Grid};

/// Fields that make up the identity tuple of an observation
pub const IDENTITY_FIELDS: [&str; 6] = [
    "region_description",
    "data_item_description",
    "age_description",
    "sex_description",
    "adjustment_type_description",
    "observation_month",
];

/// Field holding the observation month (e.g. "2024-05")
pub const OBSERVATION_MONTH_FIELD: &str = "observation_month";

/// One observation returned by the API
///
/// Values are kept as text so that records parsed from an API response and
/// records read back from a previous CSV output compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataRecord(BTreeMap<String, String>);

impl DataRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object, flattening scalar values to text
    ///
    /// `null` becomes an empty string; nested arrays and objects are kept as
    /// compact JSON text.
    pub fn from_json_object(object: &serde_json::Map<String, Value>) -> Self {
        let fields = object
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect();
        Self(fields)
    }

    /// Builder-style field insertion
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    /// Insert or replace a field
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Iterate over field names in sorted order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate over `(field, value)` pairs in sorted field order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Observation month, if present and non-empty
    pub fn observation_month(&self) -> Option<&str> {
        self.get(OBSERVATION_MONTH_FIELD).filter(|m| !m.is_empty())
    }

    /// Identity tuple used for deduplication; missing fields contribute ""
    pub fn identity(&self) -> IdentityKey {
        IdentityKey(IDENTITY_FIELDS.map(|field| self.get(field).unwrap_or_default().to_string()))
    }
}

impl FromIterator<(String, String)> for DataRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Identity tuple of a [`DataRecord`]
///
/// Two records with the same identity are the same observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey([String; 6]);

impl IdentityKey {
    /// Component values in [`IDENTITY_FIELDS`] order
    pub fn parts(&self) -> &[String; 6] {
        &self.0
    }
}

/// Latest observation month among a batch of records
///
/// Months are ISO-like strings ("YYYY-MM"), so lexical order is chronological.
pub fn latest_observation_month(records: &[DataRecord]) -> Option<String> {
    records
        .iter()
        .filter_map(DataRecord::observation_month)
        .max()
        .map(str::to_string)
}
