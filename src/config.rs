//! Configuration types for apptrack

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Mailbox search and pagination settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Provider search query selecting the tracked sender
    /// (default: "from:jobs-noreply@linkedin.com")
    #[serde(default = "default_query")]
    pub query: String,

    /// Largest page the provider will return in one listing call (default: 500)
    #[serde(default = "default_page_size_cap")]
    pub page_size_cap: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            page_size_cap: default_page_size_cap(),
        }
    }
}

/// Retry behavior for provider calls
///
/// Rate-limit signals back off exponentially; any other retryable failure
/// waits `transient_delay * attempt`. Both delays are capped at `max_delay`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, first call included (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for rate-limit backoff (default: 1000 ms)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 16000 ms)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Step for the linearly increasing delay on non-rate-limit failures (default: 1000 ms)
    #[serde(default = "default_transient_delay", with = "duration_ms_serde")]
    pub transient_delay: Duration,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            transient_delay: default_transient_delay(),
            jitter: false,
        }
    }
}

/// Gmail REST API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GmailConfig {
    /// API root (default: "https://gmail.googleapis.com")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Mailbox owner, "me" for the authenticated user
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_ms_serde")]
    pub request_timeout: Duration,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            user_id: default_user_id(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// File and key-value storage locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Encrypted result set (default: "data/email_results.json")
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,

    /// Fetch metadata: last run timestamp and count (default: "data/fetch_metadata.json")
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,

    /// SQLite database mirroring task progress for other processes (None = in-memory only)
    #[serde(default)]
    pub kv_database_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_path: default_results_path(),
            metadata_path: default_metadata_path(),
            kv_database_path: None,
        }
    }
}

/// Counting and plotting settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Case-insensitive snippet marker of a submitted application
    /// (default: "your application was sent")
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Point budget for automatic resolution selection (default: 15)
    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            max_points: default_max_points(),
        }
    }
}

/// Main configuration for the tracker
///
/// Secrets (encryption key, access token) are deliberately not part of this
/// struct; they are read from the environment at composition time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Mailbox search and pagination
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry behavior for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Gmail REST API settings
    #[serde(default)]
    pub gmail: GmailConfig,

    /// Storage locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Counting and plotting
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

impl Config {
    /// Check values that would otherwise fail deep inside a running task
    pub fn validate(&self) -> Result<()> {
        if self.fetch.page_size_cap == 0 {
            return Err(config_error(
                "page size cap must be at least 1",
                "fetch.page_size_cap",
            ));
        }
        if self.fetch.query.trim().is_empty() {
            return Err(config_error("search query must not be empty", "fetch.query"));
        }
        if self.retry.max_attempts == 0 {
            return Err(config_error(
                "max_attempts must be at least 1",
                "retry.max_attempts",
            ));
        }
        if !(self.retry.backoff_multiplier.is_finite() && self.retry.backoff_multiplier >= 1.0) {
            return Err(config_error(
                "backoff multiplier must be a finite number >= 1.0",
                "retry.backoff_multiplier",
            ));
        }
        if self.aggregation.max_points == 0 {
            return Err(config_error(
                "max_points must be at least 1",
                "aggregation.max_points",
            ));
        }
        if self.aggregation.marker.trim().is_empty() {
            return Err(config_error(
                "application marker must not be empty",
                "aggregation.marker",
            ));
        }
        url::Url::parse(&self.gmail.api_base_url).map_err(|e| {
            config_error(
                &format!("invalid API base URL '{}': {}", self.gmail.api_base_url, e),
                "gmail.api_base_url",
            )
        })?;
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_query() -> String {
    "from:jobs-noreply@linkedin.com".to_string()
}

fn default_page_size_cap() -> u32 {
    500
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_delay() -> Duration {
    Duration::from_millis(16000)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_transient_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_api_base_url() -> String {
    "https://gmail.googleapis.com".to_string()
}

fn default_user_id() -> String {
    "me".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_results_path() -> PathBuf {
    PathBuf::from("data/email_results.json")
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("data/fetch_metadata.json")
}

fn default_marker() -> String {
    "your application was sent".to_string()
}

fn default_max_points() -> usize {
    15
}

// Durations are written as whole milliseconds
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
