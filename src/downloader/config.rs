//! Fetch configuration
//!
//! Everything the engine needs is carried by an immutable [`FetchConfig`]
//! value, so independent engines (and tests) can run with different grids,
//! endpoints and credentials.

use crate::grid::Grid;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Labour force statistics endpoint
pub const DEFAULT_BASE_URL: &str =
    "https://wovg-community.gateway.prod.api.vic.gov.au/abs/v1.0/labour-force-statistics";

/// Requests allowed per rate-limit window.
/// The gateway quota is 25 requests per minute per key.
pub const MAX_REQUESTS_PER_WINDOW: usize = 25;

/// Rate-limit window length
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Save the checkpoint every N attempted combinations.
/// At 25 requests per minute this bounds repeated work after a crash to ~2 minutes.
pub const CHECKPOINT_SAVE_INTERVAL: u64 = 50;

/// Combinations fetched within this many days are skipped
pub const DATA_FRESHNESS_DAYS: u32 = 30;

/// Emit a progress event every N grid positions
pub const PROGRESS_INTERVAL: usize = 10;

/// Default checkpoint file name
pub const DEFAULT_CHECKPOINT_FILE: &str = "abs_fetch_checkpoint.json";

/// Default API key config file name
pub const DEFAULT_API_CONFIG_FILE: &str = "abs_api_config.json";

/// Environment variable consulted for the API key
pub const API_KEY_ENV: &str = "ABS_API_KEY";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No API key from any source
    #[error("no API key provided: pass --api-key, set ABS_API_KEY, or save it in abs_api_config.json")]
    MissingApiKey,

    /// Config file could not be read or parsed
    #[error("invalid config file {path}: {reason}")]
    InvalidConfigFile {
        /// Config file path
        path: String,
        /// Failure description
        reason: String,
    },

    /// Config file could not be written
    #[error("failed to write config file {path}: {reason}")]
    ConfigFileWrite {
        /// Config file path
        path: String,
        /// Failure description
        reason: String,
    },

    /// A setting is out of range
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting {
        /// Setting name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// API credential; only ever displayed masked
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    /// Raw key for request headers
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the key is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Masked form: first and last four characters for long keys, `****` otherwise
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let prefix: String = chars[..4].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{prefix}...{suffix}")
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&self.masked()).finish()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

#[derive(Deserialize)]
struct ApiConfigFile {
    #[serde(default)]
    api_key: Option<String>,
}

/// Resolve the API key: explicit value (flag or environment) first, then the config file
pub fn resolve_api_key(explicit: Option<&str>, config_file: &Path) -> Result<ApiKey, ConfigError> {
    if let Some(key) = explicit.map(ApiKey::new).filter(|k| !k.is_empty()) {
        info!(api_key = %key, "Using API key from command line or environment");
        return Ok(key);
    }

    if !config_file.exists() {
        debug!(path = %config_file.display(), "No API config file");
        return Err(ConfigError::MissingApiKey);
    }

    let contents =
        std::fs::read_to_string(config_file).map_err(|e| ConfigError::InvalidConfigFile {
            path: config_file.display().to_string(),
            reason: e.to_string(),
        })?;
    let parsed: ApiConfigFile =
        serde_json::from_str(&contents).map_err(|e| ConfigError::InvalidConfigFile {
            path: config_file.display().to_string(),
            reason: e.to_string(),
        })?;

    match parsed.api_key.map(ApiKey::new).filter(|k| !k.is_empty()) {
        Some(key) => {
            info!(api_key = %key, path = %config_file.display(), "Using API key from config file");
            Ok(key)
        }
        None => Err(ConfigError::MissingApiKey),
    }
}

/// Store `key` in the config file so later runs find it without a flag
///
/// Other fields already in the file are kept.
pub fn save_api_key(key: &ApiKey, config_file: &Path) -> Result<(), ConfigError> {
    let write_error = |reason: String| ConfigError::ConfigFileWrite {
        path: config_file.display().to_string(),
        reason,
    };

    let mut fields: serde_json::Map<String, serde_json::Value> =
        std::fs::read_to_string(config_file)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();
    fields.insert(
        "api_key".to_string(),
        serde_json::Value::String(key.expose().to_string()),
    );

    let json = serde_json::to_string_pretty(&fields).map_err(|e| write_error(e.to_string()))?;
    std::fs::write(config_file, json).map_err(|e| write_error(e.to_string()))?;

    info!(api_key = %key, path = %config_file.display(), "Saved API key to config file");
    Ok(())
}

/// Immutable engine configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// API credential
    pub api_key: ApiKey,
    /// Endpoint URL
    pub base_url: String,
    /// Query grid
    pub grid: Grid,
    /// Freshness window in days
    pub freshness_days: u32,
    /// Save the checkpoint every N attempts
    pub checkpoint_interval: u64,
    /// Emit progress every N grid positions
    pub progress_interval: usize,
    /// Requests allowed per window
    pub max_requests: usize,
    /// Rate-limit window
    pub rate_window: Duration,
    /// Checkpoint file path
    pub checkpoint_path: PathBuf,
    /// Directory holding dataset CSV files
    pub output_dir: PathBuf,
}

impl FetchConfig {
    /// Defaults for the full labour force grid
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            grid: Grid::labour_force(),
            freshness_days: DATA_FRESHNESS_DAYS,
            checkpoint_interval: CHECKPOINT_SAVE_INTERVAL,
            progress_interval: PROGRESS_INTERVAL,
            max_requests: MAX_REQUESTS_PER_WINDOW,
            rate_window: RATE_LIMIT_WINDOW,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_FILE),
            output_dir: PathBuf::from("."),
        }
    }

    /// Override the endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the query grid
    pub fn with_grid(mut self, grid: Grid) -> Self {
        self.grid = grid;
        self
    }

    /// Override the freshness window
    pub fn with_freshness_days(mut self, days: u32) -> Self {
        self.freshness_days = days;
        self
    }

    /// Override the checkpoint save interval
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Override the progress cadence
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Override the rate limit
    pub fn with_rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.max_requests = max_requests;
        self.rate_window = window;
        self
    }

    /// Override the checkpoint path
    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = path.into();
        self
    }

    /// Override the output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Freshness window as a chrono duration
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.freshness_days))
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.max_requests == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "max_requests",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.rate_window.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "rate_window",
                reason: "must be longer than zero".to_string(),
            });
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "checkpoint_interval",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "progress_interval",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.grid.is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "grid",
                reason: "every dimension needs at least one value".to_string(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidSetting {
                name: "base_url",
                reason: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }
        Ok(())
    }
}
