//! HTTP client for the ABS labour force endpoint
//!
//! One GET per combination with the five dimension values as query
//! parameters. No in-run retries: failed combinations are checkpointed and
//! picked up by the next run.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::downloader::config::{ApiKey, FetchConfig};
use crate::downloader::rate_limit::RateLimiter;
use crate::fetcher::parser::extract_records;
use crate::fetcher::shared_resources::global_http_client;
use crate::fetcher::{CombinationFetcher, FetchOutcome, FetcherError, FetcherResult};
use crate::grid::Combination;

/// Maximum length of an error body kept in a failure message
const ERROR_BODY_LIMIT: usize = 200;

/// Rate-limited client for the labour force statistics API
pub struct AbsHttpClient {
    client: Arc<Client>,
    base_url: String,
    api_key: ApiKey,
    rate_limiter: Arc<RateLimiter>,
}

impl AbsHttpClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `base_url` - Full endpoint URL
    /// * `api_key` - Key sent in the `apikey` header
    /// * `rate_limiter` - Limiter consulted before every request
    pub fn new(
        client: Arc<Client>,
        base_url: impl Into<String>,
        api_key: ApiKey,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            rate_limiter,
        }
    }

    /// Create a client from run configuration, using the global HTTP client
    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            global_http_client(),
            config.base_url.clone(),
            config.api_key.clone(),
            Arc::new(RateLimiter::new(config.max_requests, config.rate_window)),
        )
    }

    /// Get the endpoint URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the rate limiter
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Issue the request; `Ok(None)` means the API has no data (404)
    async fn request(&self, combination: &Combination) -> FetcherResult<Option<Value>> {
        self.rate_limiter.admit().await;

        debug!(combination = %combination, url = %self.base_url, "Making GET request");

        let response = self
            .client
            .get(&self.base_url)
            .query(&combination.query_params())
            .header("accept", "application/json")
            .header("apikey", self.api_key.expose())
            .send()
            .await
            .map_err(|e| FetcherError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(combination = %combination, "Data not available");
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), api_key = %self.api_key, "API key rejected");
            return Err(FetcherError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(FetcherError::HttpError(format!("{status}: {}", body.trim())));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| FetcherError::ParseError(format!("Failed to decode response: {e}")))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl CombinationFetcher for AbsHttpClient {
    async fn fetch(&self, combination: &Combination) -> FetchOutcome {
        match self.request(combination).await {
            Ok(Some(body)) => FetchOutcome::Records(extract_records(body)),
            Ok(None) => FetchOutcome::NotAvailable,
            Err(e) => {
                warn!(combination = %combination, error = %e, "Fetch failed");
                FetchOutcome::Failure(e)
            }
        }
    }
}
