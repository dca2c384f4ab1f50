//! Per-combination checkpoint records
//!
//! Each record is the outcome of one completed fetch attempt.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the last attempt for one combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CombinationRecord {
    /// Records were fetched and merged
    Completed {
        /// Number of records in the response
        records: u64,
        /// Latest observation month in the response
        #[serde(default)]
        latest_month: Option<String>,
        /// When the fetch happened
        #[serde(default)]
        fetched_at: Option<String>,
    },
    /// The API has no data for this combination (HTTP 404); never retried
    NotAvailable {
        /// When the fetch happened
        #[serde(default)]
        fetched_at: Option<String>,
    },
    /// The attempt failed; retried on the next run
    Failed {
        /// When the fetch happened
        #[serde(default)]
        fetched_at: Option<String>,
    },
    /// Status written by a different tool version; treated as never fresh
    #[serde(other)]
    Unknown,
}

impl CombinationRecord {
    /// Completed record stamped with the current time
    pub fn completed(records: u64, latest_month: Option<String>) -> Self {
        Self::Completed {
            records,
            latest_month,
            fetched_at: Some(timestamp_now()),
        }
    }

    /// Not-available record stamped with the current time
    pub fn not_available() -> Self {
        Self::NotAvailable {
            fetched_at: Some(timestamp_now()),
        }
    }

    /// Failed record stamped with the current time
    pub fn failed() -> Self {
        Self::Failed {
            fetched_at: Some(timestamp_now()),
        }
    }

    /// Status label as written to the checkpoint file
    pub fn status(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::NotAvailable { .. } => "not_available",
            Self::Failed { .. } => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Raw fetch timestamp
    pub fn fetched_at(&self) -> Option<&str> {
        match self {
            Self::Completed { fetched_at, .. }
            | Self::NotAvailable { fetched_at }
            | Self::Failed { fetched_at } => fetched_at.as_deref(),
            Self::Unknown => None,
        }
    }

    /// Latest observation month, for completed records
    pub fn latest_month(&self) -> Option<&str> {
        match self {
            Self::Completed { latest_month, .. } => latest_month.as_deref(),
            _ => None,
        }
    }

    /// Whether this combination can be skipped at `now`
    ///
    /// `not_available` is permanent. `completed` is fresh while younger than
    /// `window`. Everything else, including unparseable timestamps, is stale.
    pub fn is_fresh_at(&self, window: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self {
            Self::NotAvailable { .. } => true,
            Self::Completed { fetched_at, .. } => fetched_at
                .as_deref()
                .and_then(parse_timestamp)
                .map(|fetched| now.signed_duration_since(fetched) < window)
                .unwrap_or(false),
            Self::Failed { .. } | Self::Unknown => false,
        }
    }
}

/// Current time in the checkpoint timestamp format (RFC 3339, UTC)
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a checkpoint timestamp
///
/// Accepts RFC 3339 and offset-less ISO 8601 (interpreted as local time, as
/// written by the earlier Python tooling).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
