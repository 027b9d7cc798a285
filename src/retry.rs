//! Retry policy and backoff schedule
//!
//! The policy is pure: it classifies a failure and computes a delay, and the
//! caller owns the (cancellable) suspension. Classification order:
//!
//! 1. Rate-limited with a server hint — wait the hinted duration; these
//!    waits have their own cap and do not consume the transient budget.
//! 2. Client error (4xx other than 429) — give up immediately.
//! 3. Server/transport error, or a 429 without a hint — exponential backoff
//!    up to the attempt budget.
//!
//! Give-up always surfaces the last observed error, never a generic
//! "retries exhausted".

use std::time::Duration;

use rand::Rng;

use crate::error::ClientError;

/// Decision for a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay
    Retry { after: Duration },
    /// Stop retrying; the caller returns the error it already holds
    GiveUp,
}

impl RetryDecision {
    /// Returns true if this decision stops the retry loop
    pub fn is_give_up(&self) -> bool {
        matches!(self, RetryDecision::GiveUp)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempt budget for transient failures (attempts, not retries)
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Cap on server-hinted rate-limit waits per operation
    pub max_rate_limit_waits: u32,
    /// Add up to 10% random jitter to each backoff delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            max_rate_limit_waits: 10,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy with jitter disabled (deterministic delays, for tests)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Decide whether the operation should be retried
    ///
    /// `attempt` is the number of budget-counted attempts made so far
    /// (1-based); `rate_limit_waits` is the number of server-hinted waits
    /// already honored. Hinted waits must not increment `attempt`.
    pub fn decide(
        &self,
        error: &ClientError,
        attempt: u32,
        rate_limit_waits: u32,
    ) -> RetryDecision {
        match error {
            // A hinted 429 is the server scheduling us, not a failure of
            // ours; honor the hint outside the transient budget.
            ClientError::RateLimited {
                retry_after_seconds: Some(seconds),
            } => {
                if rate_limit_waits >= self.max_rate_limit_waits {
                    RetryDecision::GiveUp
                } else {
                    RetryDecision::Retry {
                        after: Duration::from_secs(*seconds),
                    }
                }
            }

            // An unhinted 429 falls back to the backoff schedule.
            ClientError::RateLimited {
                retry_after_seconds: None,
            }
            | ClientError::Transient(_) => {
                if attempt >= self.max_attempts {
                    RetryDecision::GiveUp
                } else {
                    RetryDecision::Retry {
                        after: self.backoff_delay(attempt),
                    }
                }
            }

            // These will not improve on retry.
            ClientError::InvalidRequest(_)
            | ClientError::JobFailed { .. }
            | ClientError::CircuitOpen { .. }
            | ClientError::Timeout { .. }
            | ClientError::Cancelled => RetryDecision::GiveUp,
        }
    }

    /// Backoff delay after the given (1-based) failed attempt
    ///
    /// Doubles per attempt from the initial delay, capped at the maximum.
    /// Jitter only ever adds (at most 10%), so the schedule stays
    /// non-decreasing.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let base = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms);

        let delay_ms = if self.jitter && base > 0 {
            base + rand::thread_rng().gen_range(0..=base / 10)
        } else {
            base
        };

        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default().without_jitter()
    }

    #[test]
    fn test_invalid_request_never_retried() {
        let policy = policy();
        let err = ClientError::InvalidRequest("bad payload".into());
        assert_eq!(policy.decide(&err, 1, 0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_job_failed_never_retried() {
        let policy = policy();
        let err = ClientError::JobFailed {
            job_id: "job-1".into(),
            message: "unreadable".into(),
        };
        assert_eq!(policy.decide(&err, 1, 0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_transient_backs_off_until_budget() {
        let policy = policy();
        let err = ClientError::Transient("503".into());

        assert_eq!(
            policy.decide(&err, 1, 0),
            RetryDecision::Retry {
                after: Duration::from_millis(1000)
            }
        );
        assert_eq!(
            policy.decide(&err, 2, 0),
            RetryDecision::Retry {
                after: Duration::from_millis(2000)
            }
        );
        // Third attempt exhausts a budget of 3.
        assert_eq!(policy.decide(&err, 3, 0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_backoff_monotonic_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 8000,
            max_rate_limit_waits: 10,
            jitter: false,
        };

        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = policy.backoff_delay(attempt);
            assert!(
                delay >= previous,
                "delay shrank at attempt {}: {:?} < {:?}",
                attempt,
                delay,
                previous
            );
            assert!(delay <= Duration::from_millis(8000));
            previous = delay;
        }
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(8000));
    }

    #[test]
    fn test_jitter_only_adds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.backoff_delay(2);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(2200));
        }
    }

    #[test]
    fn test_hinted_rate_limit_honors_hint() {
        let policy = policy();
        let err = ClientError::RateLimited {
            retry_after_seconds: Some(30),
        };

        // Honored regardless of how deep into the transient budget we are.
        assert_eq!(
            policy.decide(&err, 3, 0),
            RetryDecision::Retry {
                after: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn test_hinted_rate_limit_has_own_cap() {
        let policy = policy();
        let err = ClientError::RateLimited {
            retry_after_seconds: Some(5),
        };

        assert!(!policy.decide(&err, 1, 9).is_give_up());
        assert!(policy.decide(&err, 1, 10).is_give_up());
    }

    #[test]
    fn test_unhinted_rate_limit_uses_backoff() {
        let policy = policy();
        let err = ClientError::RateLimited {
            retry_after_seconds: None,
        };

        assert_eq!(
            policy.decide(&err, 1, 0),
            RetryDecision::Retry {
                after: Duration::from_millis(1000)
            }
        );
        assert_eq!(policy.decide(&err, 3, 0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_cancelled_gives_up() {
        let policy = policy();
        assert!(policy.decide(&ClientError::Cancelled, 1, 0).is_give_up());
    }
}
