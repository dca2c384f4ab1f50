//! Remote fetch of one combination
//!
//! [`CombinationFetcher`] is the seam between the run orchestrator and the
//! network. [`abs_http::AbsHttpClient`] is the production implementation;
//! tests substitute in-memory fetchers.

use crate::grid::Combination;
use crate::DataRecord;
use async_trait::async_trait;

pub mod abs_http;
pub mod parser;
pub mod shared_resources;

pub use abs_http::AbsHttpClient;

/// Fetcher errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetcherError {
    /// Non-success HTTP status other than 404
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The API rejected the key (HTTP 401/403)
    #[error("API key rejected (HTTP {status})")]
    Unauthorized {
        /// Response status code
        status: u16,
    },

    /// Response body could not be decoded
    #[error("parse error: {0}")]
    ParseError(String),

    /// Connection, timeout or other transport failure
    #[error("network error: {0}")]
    NetworkError(String),
}

impl FetcherError {
    /// Whether the error should abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Classified result of fetching one combination
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Successful response; may hold zero records
    Records(Vec<DataRecord>),
    /// The API has no data for this combination (HTTP 404)
    NotAvailable,
    /// Transport or HTTP failure
    Failure(FetcherError),
}

impl FetchOutcome {
    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Records(records) if records.is_empty() => "empty",
            Self::Records(_) => "records",
            Self::NotAvailable => "not_available",
            Self::Failure(_) => "failure",
        }
    }
}

/// Fetches the records for one combination
#[async_trait]
pub trait CombinationFetcher: Send + Sync {
    /// Fetch one combination, respecting the rate limit
    ///
    /// Never returns an error directly: failures are part of the outcome so
    /// the orchestrator can checkpoint them.
    async fn fetch(&self, combination: &Combination) -> FetchOutcome;
}
