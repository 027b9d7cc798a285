//! Failure injection for the mock service
//!
//! Supports configurable failure injection per endpoint for testing error
//! paths: rate limits with hints, server errors that clear after N calls,
//! malformed-request rejections.

use std::collections::HashMap;

/// API endpoints that can have failures injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// POST /patterns/{pattern_id}/ingest
    Ingest,
    /// GET /jobs/{job_id}
    JobStatus,
}

/// Failure configuration for an endpoint
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// HTTP status to return
    pub status: u16,
    /// Error message to return
    pub message: String,
    /// Retry-After header value for 429 responses
    pub retry_after_seconds: Option<u64>,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// A 500 with the given message
    pub fn server_error(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
            retry_after_seconds: None,
            fail_count: None,
        }
    }

    /// A 503 service-unavailable
    pub fn unavailable() -> Self {
        Self {
            status: 503,
            message: "service unavailable".to_string(),
            retry_after_seconds: None,
            fail_count: None,
        }
    }

    /// A 429 with a Retry-After hint
    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self {
            status: 429,
            message: "rate limit exceeded".to_string(),
            retry_after_seconds: Some(retry_after_seconds),
            fail_count: None,
        }
    }

    /// A 429 without a wait hint
    pub fn rate_limited_no_hint() -> Self {
        Self {
            status: 429,
            message: "rate limit exceeded".to_string(),
            retry_after_seconds: None,
            fail_count: None,
        }
    }

    /// A 400 with the given message
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
            retry_after_seconds: None,
            fail_count: None,
        }
    }

    /// Override the HTTP status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Fail this many times, then let calls through
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Failure injector for the mock service
#[derive(Debug, Default)]
pub struct FailureInjector {
    /// Per-endpoint failure configs
    configs: HashMap<Endpoint, FailureConfig>,
    /// Call counts per endpoint (for fail_count tracking)
    call_counts: HashMap<Endpoint, u32>,
}

impl FailureInjector {
    /// Create a new failure injector
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for an endpoint
    pub fn inject(&mut self, endpoint: Endpoint, config: FailureConfig) {
        self.configs.insert(endpoint, config);
        self.call_counts.insert(endpoint, 0);
    }

    /// Clear all failure injections
    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Clear failure injection for a specific endpoint
    pub fn clear_endpoint(&mut self, endpoint: Endpoint) {
        self.configs.remove(&endpoint);
        self.call_counts.remove(&endpoint);
    }

    /// Check whether this call to `endpoint` should fail
    ///
    /// Returns the failure config if so. Counts calls so `fail_count`-bounded
    /// configs stop firing once exhausted.
    pub fn check(&mut self, endpoint: Endpoint) -> Option<FailureConfig> {
        let config = self.configs.get(&endpoint)?;
        let count = self.call_counts.entry(endpoint).or_insert(0);
        *count += 1;

        if let Some(fail_limit) = config.fail_count {
            if *count > fail_limit {
                return None;
            }
        }

        Some(config.clone())
    }

    /// Calls observed for an endpoint since injection
    pub fn calls(&self, endpoint: Endpoint) -> u32 {
        self.call_counts.get(&endpoint).copied().unwrap_or(0)
    }
}
