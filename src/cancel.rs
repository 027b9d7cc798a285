//! Cooperative cancellation and deadlines
//!
//! Every suspension point in the lane (poll-interval sleeps, backoff delays,
//! rate-limiter waits) goes through a [`CancellationToken`] so a cancel or an
//! expired deadline unblocks the waiter promptly instead of letting it sleep
//! out the full duration.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Why a wait was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// `cancel()` was called
    Cancelled,
    /// The token's deadline passed
    DeadlineExceeded,
}

#[derive(Debug)]
struct TokenInner {
    cancelled: Mutex<bool>,
    condvar: Condvar,
    deadline: Option<Instant>,
}

/// Shareable cancellation token with an optional deadline
///
/// Clones share the same underlying state: cancelling one clone wakes every
/// waiter on any clone.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create a token with no deadline
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a token that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    /// Create a token that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(Instant::now() + timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: Mutex::new(false),
                condvar: Condvar::new(),
                deadline,
            }),
        }
    }

    /// Request cancellation and wake all waiters
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock().unwrap();
        *cancelled = true;
        self.inner.condvar.notify_all();
    }

    /// Returns true if `cancel()` has been called
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().unwrap()
    }

    /// Time remaining before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail fast if the token is cancelled or past its deadline
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        if let Some(deadline) = self.inner.deadline {
            if Instant::now() >= deadline {
                return Err(Interrupt::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early on cancel or deadline expiry
    ///
    /// Returns `Ok(())` if the full duration elapsed. The wait never extends
    /// past the token's deadline.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupt> {
        self.check()?;

        let wake_at = Instant::now() + duration;
        let target = match self.inner.deadline {
            Some(deadline) if deadline < wake_at => deadline,
            _ => wake_at,
        };

        let mut cancelled = self.inner.cancelled.lock().unwrap();
        loop {
            if *cancelled {
                return Err(Interrupt::Cancelled);
            }
            let now = Instant::now();
            if now >= target {
                break;
            }
            let (guard, _timeout) = self
                .inner
                .condvar
                .wait_timeout(cancelled, target - now)
                .unwrap();
            cancelled = guard;
        }
        drop(cancelled);

        // Woke at the target: either the sleep completed or the deadline hit first.
        self.check()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fresh_token_is_active() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
        assert!(token.remaining().is_none());
    }

    #[test]
    fn test_cancel_is_observable_from_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();

        token.cancel();

        assert!(clone.is_cancelled());
        assert_eq!(clone.check(), Err(Interrupt::Cancelled));
    }

    #[test]
    fn test_sleep_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let start = Instant::now();

        token.sleep(Duration::from_millis(50)).unwrap();

        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_cancel_wakes_sleeper_early() {
        let token = CancellationToken::new();
        let sleeper = token.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let result = sleeper.sleep(Duration::from_secs(30));
            (result, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        let (result, elapsed) = handle.join().expect("sleeper panicked");
        assert_eq!(result, Err(Interrupt::Cancelled));
        assert!(
            elapsed < Duration::from_secs(5),
            "cancel should wake the sleeper well before the full sleep: {:?}",
            elapsed
        );
    }

    #[test]
    fn test_deadline_caps_sleep() {
        let token = CancellationToken::with_timeout(Duration::from_millis(80));
        let start = Instant::now();

        let result = token.sleep(Duration::from_secs(30));

        assert_eq!(result, Err(Interrupt::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_expired_deadline_fails_fast() {
        let token = CancellationToken::with_timeout(Duration::from_millis(1));
        thread::sleep(Duration::from_millis(10));

        assert_eq!(token.check(), Err(Interrupt::DeadlineExceeded));
        assert_eq!(
            token.sleep(Duration::from_millis(10)),
            Err(Interrupt::DeadlineExceeded)
        );
    }

    #[test]
    fn test_remaining_decreases() {
        let token = CancellationToken::with_timeout(Duration::from_secs(60));
        let remaining = token.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(50));
    }

    #[test]
    fn test_cancel_beats_deadline() {
        let token = CancellationToken::with_timeout(Duration::from_secs(60));
        token.cancel();
        assert_eq!(token.check(), Err(Interrupt::Cancelled));
    }
}
