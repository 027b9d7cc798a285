//! Client error taxonomy
//!
//! Every failure surfaced by the lane maps to one of seven kinds. The kind
//! determines retryability and the process exit code, and is recorded
//! per-item in batch reports so a re-run can be scoped to the retryable
//! subset.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::transport::TransportError;

/// Error kind for classification, reporting and exit-code mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// 4xx other than 429: the request is malformed and will not succeed on retry
    InvalidRequest,
    /// 429: the service asked us to slow down
    RateLimited,
    /// 5xx or transport-level failure: worth retrying with backoff
    Transient,
    /// Circuit breaker rejected the call without a network attempt
    CircuitOpen,
    /// The service itself reported the job as failed
    JobFailed,
    /// Deadline exceeded while polling or waiting
    Timeout,
    /// Caller-initiated abort
    Cancelled,
}

impl ErrorKind {
    /// Returns true if a re-run of the same input could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::Transient
                | ErrorKind::CircuitOpen
                | ErrorKind::Timeout
        )
    }

    /// Exit code for this kind (non-zero, one code per kind)
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Transient => 20,
            ErrorKind::InvalidRequest => 40,
            ErrorKind::JobFailed => 70,
            ErrorKind::Timeout => 75,
            ErrorKind::Cancelled => 80,
            ErrorKind::RateLimited => 90,
            ErrorKind::CircuitOpen => 91,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Transient => "TRANSIENT",
            ErrorKind::CircuitOpen => "CIRCUIT_OPEN",
            ErrorKind::JobFailed => "JOB_FAILED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Errors surfaced by the job client and batch orchestrator
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rate limited{}", fmt_retry_after(.retry_after_seconds))]
    RateLimited { retry_after_seconds: Option<u64> },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("circuit open for {target}; {remaining_seconds}s of cooldown remaining")]
    CircuitOpen {
        target: String,
        remaining_seconds: u64,
    },

    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("timed out after {}s{}", .waited.as_secs(), fmt_job_context(.job_id))]
    Timeout {
        job_id: Option<String>,
        waited: Duration,
    },

    #[error("cancelled")]
    Cancelled,
}

fn fmt_retry_after(retry_after_seconds: &Option<u64>) -> String {
    match retry_after_seconds {
        Some(s) => format!("; retry after {}s", s),
        None => String::new(),
    }
}

fn fmt_job_context(job_id: &Option<String>) -> String {
    match job_id {
        Some(id) => format!(" waiting for job {}", id),
        None => String::new(),
    }
}

impl ClientError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ClientError::RateLimited { .. } => ErrorKind::RateLimited,
            ClientError::Transient(_) => ErrorKind::Transient,
            ClientError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ClientError::JobFailed { .. } => ErrorKind::JobFailed,
            ClientError::Timeout { .. } => ErrorKind::Timeout,
            ClientError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns true if a re-run of the same input could succeed
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Map an interrupted wait to the matching error kind
    pub(crate) fn from_interrupt(
        interrupt: crate::cancel::Interrupt,
        job_id: Option<String>,
        waited: Duration,
    ) -> Self {
        match interrupt {
            crate::cancel::Interrupt::Cancelled => ClientError::Cancelled,
            crate::cancel::Interrupt::DeadlineExceeded => ClientError::Timeout { job_id, waited },
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::Transient(err.to_string())
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
