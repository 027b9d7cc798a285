//! Circuit breaker for the submission path
//!
//! Per-target state machine: `Closed → Open → HalfOpen → {Closed | Open}`.
//! Only consecutive failures count; any success while Closed resets the
//! counter. While Open, calls are rejected without a network attempt until
//! the cooldown elapses, after which exactly one probe call is let through
//! and its outcome decides the next state.
//!
//! The breaker gates submissions only. Polling an already-accepted job is
//! never short-circuited.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ClientError;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through
    Closed,
    /// Calls are rejected immediately
    Open,
    /// Exactly one probe call is allowed through
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker for one downstream target
#[derive(Debug)]
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker with default thresholds
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_config(target, CircuitBreakerConfig::default())
    }

    /// Create a breaker with custom configuration
    pub fn with_config(target: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            target: target.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// The downstream target this breaker guards
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Ask permission for one call
    ///
    /// While Open this fails fast with `CircuitOpen` until the cooldown has
    /// elapsed; the first caller after that becomes the half-open probe and
    /// must report back via `record_success` / `record_failure`.
    pub fn try_acquire(&self) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed >= self.config.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(ClientError::CircuitOpen {
                        target: self.target.clone(),
                        remaining_seconds: (self.config.cooldown - elapsed).as_secs(),
                    })
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(ClientError::CircuitOpen {
                        target: self.target.clone(),
                        remaining_seconds: 0,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a call that reached the target and got an answer
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
            }
            // No call was admitted while open; nothing to record.
            BreakerState::Open => {}
        }
    }

    /// Record a call that failed to get a healthy answer from the target
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                // Probe failed: reopen and extend the cooldown.
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_failures += 1;
                inner.probe_in_flight = false;
            }
            BreakerState::Open => {}
        }
    }

    /// Current state (transitions only happen on calls, so an Open breaker
    /// past its cooldown still reads Open until someone tries)
    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Current consecutive-failure count
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_failures
    }
}
