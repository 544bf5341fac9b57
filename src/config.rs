//! Configuration types for attachment-dl
//!
//! Every field has a serde default, so an empty JSON object is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::rate_limiter::{RateLimiter, TokenBucket};

/// File download behavior
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Download attachments at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of concurrent download workers (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Stop processing further channels once a channel run recorded a failed
    /// download (default: false)
    #[serde(default)]
    pub fail_on_error: bool,

    /// Capacity of the queue between the dedup stage and the workers
    /// (default: 8). A full queue makes the dedup stage wait.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: default_workers(),
            fail_on_error: false,
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Shared request rate budget for attachment transfers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per second across all workers (None = unlimited)
    #[serde(default)]
    pub requests_per_second: Option<f64>,

    /// Requests allowed back to back before throttling kicks in (default: 1)
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: None,
            burst: default_burst(),
        }
    }
}

impl RateLimitConfig {
    /// Build the limiter shared by all workers of a downloader
    pub fn build(&self) -> Arc<dyn RateLimiter> {
        Arc::new(TokenBucket::new(self.requests_per_second, self.burst))
    }
}

/// HTTP transport settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bearer token sent with every request
    #[serde(default)]
    pub token: Option<String>,

    /// Token appended to every file URL as the `t` query parameter
    #[serde(default)]
    pub file_token: Option<String>,

    /// Timeout for a whole transfer (default: 300 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            token: None,
            file_token: None,
            timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for rate-limited and transient transfer failures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Download pool behavior
    #[serde(default)]
    pub files: FilesConfig,

    /// Shared rate budget
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// HTTP transport
    #[serde(default)]
    pub http: HttpConfig,

    /// Transport retries
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Parse a JSON configuration and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check values serde cannot rule out on its own
    pub fn validate(&self) -> Result<()> {
        if self.files.workers == 0 {
            return Err(Error::config("workers", "at least one worker is required"));
        }
        if self.files.queue_capacity == 0 {
            return Err(Error::config(
                "queue_capacity",
                "queue capacity must be at least 1",
            ));
        }
        if let Some(rate) = self.rate_limit.requests_per_second {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(Error::config(
                    "requests_per_second",
                    format!("rate must be a positive number, got {rate}"),
                ));
            }
        }
        if self.rate_limit.burst == 0 {
            return Err(Error::config("burst", "burst must be at least 1"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier",
                "backoff multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    8
}

fn default_burst() -> u32 {
    1
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_user_agent() -> String {
    concat!("attachment-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
