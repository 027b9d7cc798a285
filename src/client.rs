//! Job client
//!
//! Submits one unit of work idempotently and polls it to a terminal state.
//! Submission runs behind the rate-limiter and circuit-breaker gates and
//! under the retry policy; polling is rate-limited but never gated by the
//! breaker, since a job the service has already accepted should still be
//! awaited.
//!
//! The idempotency key must be reused across retries of the same logical
//! submission — the service deduplicates on it and returns the original
//! job_id instead of creating duplicate work.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::api::{classify_response, ingest_path, job_path, ApiRequest, Payload, Transport};
use crate::breaker::CircuitBreaker;
use crate::cancel::CancellationToken;
use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::job::{
    extract_result, idempotency_key_for, normalize_status, JobHandle, JobResult, NormalizedStatus,
};
use crate::limiter::RateLimiter;
use crate::retry::{RetryDecision, RetryPolicy};

/// Job client configuration
#[derive(Debug, Clone)]
pub struct JobClientConfig {
    /// Fixed interval between status polls
    pub poll_interval: Duration,
    /// Maximum status polls before the job is declared timed out
    pub max_poll_attempts: u32,
}

impl Default for JobClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 60,
        }
    }
}

/// One status-poll outcome
enum PollOutcome {
    /// Job not visible yet (404 during propagation); still pending
    NotVisible,
    /// Status payload from the service
    Status(Value),
}

/// Client for one extraction pattern on one service target
pub struct JobClient {
    transport: Arc<dyn Transport>,
    pattern_id: String,
    config: JobClientConfig,
    retry: RetryPolicy,
    limiter: Option<Arc<dyn RateLimiter>>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl JobClient {
    /// Create a client with default config and retry policy
    pub fn new(transport: Arc<dyn Transport>, pattern_id: impl Into<String>) -> Self {
        Self {
            transport,
            pattern_id: pattern_id.into(),
            config: JobClientConfig::default(),
            retry: RetryPolicy::default(),
            limiter: None,
            breaker: None,
        }
    }

    /// Replace the client configuration
    pub fn with_config(mut self, config: JobClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Gate outbound requests through a rate limiter
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Gate submissions through a circuit breaker
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// The pattern this client ingests against
    pub fn pattern_id(&self) -> &str {
        &self.pattern_id
    }

    /// Derive the idempotency key for a payload
    ///
    /// Stable across retries and across processes; use it unless the caller
    /// explicitly wants repeated ingests of the same image to be distinct
    /// logical submissions.
    pub fn idempotency_key(payload: &Payload) -> ClientResult<String> {
        idempotency_key_for(&payload.to_body())
    }

    /// Submit one unit of work
    ///
    /// Retries transient failures under the policy, reusing `idempotency_key`
    /// on every attempt so an ambiguous failure (request sent, response
    /// lost) cannot create duplicate work.
    pub fn submit(
        &self,
        payload: &Payload,
        idempotency_key: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<JobHandle> {
        let request = ApiRequest::post(ingest_path(&self.pattern_id), payload.to_body())
            .with_idempotency_key(idempotency_key);

        let started = Instant::now();
        let mut attempt: u32 = 0;
        let mut rate_limit_waits: u32 = 0;
        let mut wire_attempts: u32 = 0;

        loop {
            cancel
                .check()
                .map_err(|i| ClientError::from_interrupt(i, None, started.elapsed()))?;

            if let Some(limiter) = &self.limiter {
                limiter.acquire(cancel)?;
            }
            if let Some(breaker) = &self.breaker {
                breaker.try_acquire()?;
            }

            wire_attempts += 1;
            let outcome = self
                .transport
                .execute(&request)
                .map_err(ClientError::from)
                .and_then(|response| classify_response(&response));

            let error = match outcome {
                Ok(data) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    let job_id = data
                        .get("job_id")
                        .and_then(|v| v.as_str())
                        .map(String::from)
                        .ok_or_else(|| {
                            ClientError::Transient("submit response missing job_id".to_string())
                        })?;
                    return Ok(JobHandle {
                        job_id,
                        idempotency_key: idempotency_key.to_string(),
                        attempt_count: wire_attempts,
                    });
                }
                Err(error) => error,
            };

            self.record_breaker_outcome(&error);

            // A server-hinted wait is scheduling, not a failed attempt.
            let hinted = matches!(
                &error,
                ClientError::RateLimited {
                    retry_after_seconds: Some(_)
                }
            );
            if !hinted {
                attempt += 1;
            }

            match self.retry.decide(&error, attempt, rate_limit_waits) {
                RetryDecision::Retry { after } => {
                    if hinted {
                        rate_limit_waits += 1;
                    }
                    cancel
                        .sleep(after)
                        .map_err(|i| ClientError::from_interrupt(i, None, started.elapsed()))?;
                }
                RetryDecision::GiveUp => return Err(error),
            }
        }
    }

    /// Poll until the job reaches a terminal state
    ///
    /// Returns `Timeout` (not `JobFailed`) once the poll budget is spent
    /// without a terminal status, so callers can retry timeouts without
    /// giving up on them permanently.
    pub fn await_result(
        &self,
        handle: &JobHandle,
        cancel: &CancellationToken,
    ) -> ClientResult<JobResult> {
        let started = Instant::now();

        for poll in 1..=self.config.max_poll_attempts {
            if let PollOutcome::Status(data) = self.poll_status(&handle.job_id, cancel)? {
                let raw = data
                    .get("status")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();

                match normalize_status(&raw) {
                    NormalizedStatus::Succeeded => {
                        return Ok(JobResult {
                            job_id: handle.job_id.clone(),
                            result: extract_result(&data),
                        });
                    }
                    NormalizedStatus::Failed => {
                        return Err(ClientError::JobFailed {
                            job_id: handle.job_id.clone(),
                            message: data
                                .get("error")
                                .and_then(|v| v.as_str())
                                .unwrap_or("no error details")
                                .to_string(),
                        });
                    }
                    NormalizedStatus::Cancelled => return Err(ClientError::Cancelled),
                    NormalizedStatus::Pending => {}
                    NormalizedStatus::Unknown => {
                        // Novel vocabulary: keep polling (the attempt cap
                        // bounds us), but make it visible to operators.
                        eprintln!(
                            "ingest-lane: job {}: unrecognized status {:?}, treating as still running",
                            handle.job_id, raw
                        );
                    }
                }
            }

            if poll < self.config.max_poll_attempts {
                cancel.sleep(self.config.poll_interval).map_err(|i| {
                    ClientError::from_interrupt(
                        i,
                        Some(handle.job_id.clone()),
                        started.elapsed(),
                    )
                })?;
            }
        }

        Err(ClientError::Timeout {
            job_id: Some(handle.job_id.clone()),
            waited: started.elapsed(),
        })
    }

    /// Submit and await in one call
    ///
    /// Derives the idempotency key from the payload when none is supplied.
    pub fn run(
        &self,
        payload: &Payload,
        idempotency_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> ClientResult<JobResult> {
        let key = match idempotency_key {
            Some(key) => key.to_string(),
            None => Self::idempotency_key(payload)?,
        };
        let handle = self.submit(payload, &key, cancel)?;
        self.await_result(&handle, cancel)
    }

    /// One status read, for callers that poll on their own schedule
    pub fn job_status(&self, job_id: &str, cancel: &CancellationToken) -> ClientResult<Value> {
        match self.poll_status(job_id, cancel)? {
            PollOutcome::Status(data) => Ok(data),
            PollOutcome::NotVisible => {
                Err(ClientError::InvalidRequest(format!("job {} not found", job_id)))
            }
        }
    }

    // === Internal helpers ===

    /// One status poll with transient-retry handling
    ///
    /// Rate-limited like any outbound request but never gated by the
    /// breaker. A 404 is treated as propagation delay, not a client error.
    fn poll_status(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<PollOutcome> {
        let request = ApiRequest::get(job_path(job_id));
        let started = Instant::now();
        let mut attempt: u32 = 0;
        let mut rate_limit_waits: u32 = 0;

        loop {
            cancel.check().map_err(|i| {
                ClientError::from_interrupt(i, Some(job_id.to_string()), started.elapsed())
            })?;

            if let Some(limiter) = &self.limiter {
                limiter.acquire(cancel)?;
            }

            let response = match self.transport.execute(&request) {
                Ok(response) => response,
                Err(transport_error) => {
                    let error = ClientError::from(transport_error);
                    attempt += 1;
                    match self.retry.decide(&error, attempt, rate_limit_waits) {
                        RetryDecision::Retry { after } => {
                            cancel.sleep(after).map_err(|i| {
                                ClientError::from_interrupt(
                                    i,
                                    Some(job_id.to_string()),
                                    started.elapsed(),
                                )
                            })?;
                            continue;
                        }
                        RetryDecision::GiveUp => return Err(error),
                    }
                }
            };

            if response.status == 404 {
                return Ok(PollOutcome::NotVisible);
            }

            let error = match classify_response(&response) {
                Ok(data) => return Ok(PollOutcome::Status(data)),
                Err(error) => error,
            };

            let hinted = matches!(
                &error,
                ClientError::RateLimited {
                    retry_after_seconds: Some(_)
                }
            );
            if !hinted {
                attempt += 1;
            }

            match self.retry.decide(&error, attempt, rate_limit_waits) {
                RetryDecision::Retry { after } => {
                    if hinted {
                        rate_limit_waits += 1;
                    }
                    cancel.sleep(after).map_err(|i| {
                        ClientError::from_interrupt(
                            i,
                            Some(job_id.to_string()),
                            started.elapsed(),
                        )
                    })?;
                }
                RetryDecision::GiveUp => return Err(error),
            }
        }
    }

    fn record_breaker_outcome(&self, error: &ClientError) {
        if let Some(breaker) = &self.breaker {
            match error.kind() {
                // Transport and 5xx failures mean the target is unhealthy.
                ErrorKind::Transient => breaker.record_failure(),
                // 4xx and 429 are answers: the target processed the call.
                ErrorKind::InvalidRequest | ErrorKind::RateLimited => breaker.record_success(),
                _ => {}
            }
        }
    }
}
