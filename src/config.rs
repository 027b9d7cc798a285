//! Lane configuration
//!
//! Defaults, optional TOML override (`ingest-lane.toml`), and validation.
//! Every knob the client consumes is caller-supplied configuration: request
//! timeout, poll cadence and cap, retry budget, rate-limit shape, breaker
//! thresholds and batch concurrency. The API key is read from the
//! environment, never from the config file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::CurlConfig;
use crate::breaker::CircuitBreakerConfig;
use crate::client::JobClientConfig;
use crate::retry::RetryPolicy;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ingest-lane.toml";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be in ({min}, {max}], got {value}")]
    OutOfBounds {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },

    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}

/// Retry policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempt budget for transient failures
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Cap on server-hinted rate-limit waits per operation
    pub max_rate_limit_waits: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay_ms,
            max_delay_ms: policy.max_delay_ms,
            max_rate_limit_waits: policy.max_rate_limit_waits,
        }
    }
}

/// Token-bucket rate limit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Bucket capacity (burst size)
    pub capacity: f64,
    /// Refill rate in tokens per second (0 disables the limiter)
    pub refill_per_second: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 5.0,
            refill_per_second: 1.0,
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// Cooldown before a half-open probe, in seconds
    pub cooldown_seconds: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_seconds: 60,
        }
    }
}

/// Batch orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// In-flight items at any time (single-phase runs)
    pub max_concurrency: usize,
    /// Submission concurrency for two-phase runs (defaults to max_concurrency)
    pub submit_concurrency: Option<usize>,
    /// Polling concurrency for two-phase runs (defaults to max_concurrency)
    pub poll_concurrency: Option<usize>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            submit_concurrency: None,
            poll_concurrency: None,
        }
    }
}

/// Top-level lane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// API base URL (no trailing slash)
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Connection timeout in seconds
    pub connect_timeout_seconds: u64,
    /// Overall per-request timeout in seconds
    pub request_timeout_seconds: u64,
    /// Seconds between status polls
    pub poll_interval_seconds: u64,
    /// Maximum status polls before a job is declared timed out
    pub max_poll_attempts: u32,
    /// Retry policy
    pub retry: RetrySettings,
    /// Token-bucket rate limit
    pub rate_limit: RateLimitSettings,
    /// Circuit breaker
    pub breaker: BreakerSettings,
    /// Batch orchestration
    pub batch: BatchSettings,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            base_url: "https://img-go.com/api".to_string(),
            api_key_env: "IMGGO_API_KEY".to_string(),
            connect_timeout_seconds: 10,
            request_timeout_seconds: 30,
            poll_interval_seconds: 2,
            max_poll_attempts: 60,
            retry: RetrySettings::default(),
            rate_limit: RateLimitSettings::default(),
            breaker: BreakerSettings::default(),
            batch: BatchSettings::default(),
        }
    }
}

impl LaneConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: LaneConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the given file, or `ingest-lane.toml` if present, or defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Validate configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn bounds(
            field: &'static str,
            value: u64,
            min: u64,
            max: u64,
        ) -> Result<(), ConfigError> {
            if value <= min || value > max {
                return Err(ConfigError::OutOfBounds {
                    field,
                    min,
                    max,
                    value,
                });
            }
            Ok(())
        }

        bounds(
            "request_timeout_seconds",
            self.request_timeout_seconds,
            0,
            600,
        )?;
        bounds(
            "connect_timeout_seconds",
            self.connect_timeout_seconds,
            0,
            300,
        )?;
        bounds("poll_interval_seconds", self.poll_interval_seconds, 0, 300)?;
        bounds("max_poll_attempts", self.max_poll_attempts as u64, 0, 10_000)?;
        bounds("retry.max_attempts", self.retry.max_attempts as u64, 0, 10)?;
        bounds(
            "breaker.failure_threshold",
            self.breaker.failure_threshold as u64,
            0,
            1_000,
        )?;
        bounds(
            "breaker.cooldown_seconds",
            self.breaker.cooldown_seconds,
            0,
            3_600,
        )?;
        bounds(
            "batch.max_concurrency",
            self.batch.max_concurrency as u64,
            0,
            128,
        )?;

        if self.rate_limit.capacity < 0.0 {
            return Err(ConfigError::Negative {
                field: "rate_limit.capacity",
                value: self.rate_limit.capacity,
            });
        }
        if self.rate_limit.refill_per_second < 0.0 {
            return Err(ConfigError::Negative {
                field: "rate_limit.refill_per_second",
                value: self.rate_limit.refill_per_second,
            });
        }

        Ok(())
    }

    /// API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }

    /// Retry policy from these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay_ms: self.retry.initial_delay_ms,
            max_delay_ms: self.retry.max_delay_ms,
            max_rate_limit_waits: self.retry.max_rate_limit_waits,
            jitter: true,
        }
    }

    /// Job client config from these settings
    pub fn client_config(&self) -> JobClientConfig {
        JobClientConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            max_poll_attempts: self.max_poll_attempts,
        }
    }

    /// Circuit breaker config from these settings
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            cooldown: Duration::from_secs(self.breaker.cooldown_seconds),
        }
    }

    /// Curl transport config from these settings
    pub fn curl_config(&self) -> CurlConfig {
        CurlConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key(),
            connect_timeout_seconds: self.connect_timeout_seconds,
            request_timeout_seconds: self.request_timeout_seconds,
        }
    }
}
