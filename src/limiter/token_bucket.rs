//! Single-process token bucket
//!
//! Capacity `C`, refill rate `R` tokens/sec. Refill and consumption happen
//! under one lock so two concurrent acquirers can never both spend the same
//! token.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::error::ClientError;

use super::RateLimiter;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket that starts full
    ///
    /// A refill rate of 0 disables the limiter: `acquire` returns
    /// immediately instead of blocking forever.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        let capacity = capacity.max(0.0);
        Self {
            capacity,
            refill_rate: refill_rate.max(0.0),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Consume one token, or report how long until one is available
    fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap();

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let needed = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(needed / self.refill_rate))
        }
    }

    /// Tokens currently available (after refill), for observation
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
        state.tokens
    }
}

impl RateLimiter for TokenBucket {
    fn acquire(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        // Rate disabled: pass everything through.
        if self.refill_rate <= 0.0 {
            return Ok(());
        }

        let start = Instant::now();
        loop {
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    cancel.sleep(wait).map_err(|interrupt| {
                        ClientError::from_interrupt(interrupt, None, start.elapsed())
                    })?;
                }
            }
        }
    }
}
