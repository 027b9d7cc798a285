//! Sliding-window counter over a shared store
//!
//! For limits shared across processes: each admission inserts a timestamped
//! entry under the limiter's key, and a request is admitted only while the
//! count of entries inside the trailing window is below the quota. The
//! evict + count + insert sequence must be atomic with respect to other
//! callers on the same key, or the quota can be transiently exceeded — the
//! store owns that atomicity (in memory, one mutex; a networked store must
//! provide a server-side script or transaction).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::error::ClientError;

use super::RateLimiter;

/// Shared store for sliding-window admission
pub trait WindowStore: Send + Sync {
    /// Atomically evict entries older than `window`, count the remainder
    /// for `key`, and insert a new entry if the count is below `quota`.
    ///
    /// Returns true if the request was admitted.
    fn try_admit(&self, key: &str, window: Duration, quota: u32) -> bool;

    /// Entries currently inside the window for `key` (observation only)
    fn count(&self, key: &str, window: Duration) -> usize;
}

/// In-memory store; the single mutex makes evict+count+insert atomic
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl InMemoryWindowStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowStore for InMemoryWindowStore {
    fn try_admit(&self, key: &str, window: Duration, quota: u32) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();

        let bucket = entries.entry(key.to_string()).or_default();
        bucket.retain(|t| now.duration_since(*t) <= window);

        if bucket.len() < quota as usize {
            bucket.push(now);
            true
        } else {
            false
        }
    }

    fn count(&self, key: &str, window: Duration) -> usize {
        let entries = self.entries.lock().unwrap();
        let now = Instant::now();
        entries
            .get(key)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|t| now.duration_since(**t) <= window)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Sliding-window rate limiter bound to one key in a shared store
pub struct SlidingWindowLimiter {
    store: std::sync::Arc<dyn WindowStore>,
    key: String,
    window: Duration,
    quota: u32,
    retry_interval: Duration,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting `quota` requests per `window` for `key`
    ///
    /// A quota of 0 disables the limiter, mirroring the token bucket's
    /// zero-rate rule.
    pub fn new(
        store: std::sync::Arc<dyn WindowStore>,
        key: impl Into<String>,
        window: Duration,
        quota: u32,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            window,
            quota,
            retry_interval: Duration::from_millis(250),
        }
    }

    /// Override how long a denied caller waits before re-checking the store
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// The key this limiter admits under
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn acquire(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        if self.quota == 0 {
            return Ok(());
        }

        let start = Instant::now();
        loop {
            if self.store.try_admit(&self.key, self.window, self.quota) {
                return Ok(());
            }
            cancel.sleep(self.retry_interval).map_err(|interrupt| {
                ClientError::from_interrupt(interrupt, None, start.elapsed())
            })?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_admits_up_to_quota() {
        let store = Arc::new(InMemoryWindowStore::new());
        let window = Duration::from_secs(60);

        for _ in 0..3 {
            assert!(store.try_admit("api", window, 3));
        }
        assert!(!store.try_admit("api", window, 3));
        assert_eq!(store.count("api", window), 3);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = Arc::new(InMemoryWindowStore::new());
        let window = Duration::from_secs(60);

        assert!(store.try_admit("tenant-a", window, 1));
        assert!(!store.try_admit("tenant-a", window, 1));
        assert!(store.try_admit("tenant-b", window, 1));
    }

    #[test]
    fn test_entries_expire_out_of_window() {
        let store = Arc::new(InMemoryWindowStore::new());
        let window = Duration::from_millis(60);

        assert!(store.try_admit("api", window, 1));
        assert!(!store.try_admit("api", window, 1));

        thread::sleep(Duration::from_millis(80));
        assert!(store.try_admit("api", window, 1));
    }

    #[test]
    fn test_quota_never_exceeded_under_contention() {
        let store = Arc::new(InMemoryWindowStore::new());
        let window = Duration::from_secs(60);
        let admitted = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                let admitted = Arc::clone(&admitted);
                thread::spawn(move || {
                    if store.try_admit("api", window, 5) {
                        admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("caller panicked");
        }

        assert_eq!(admitted.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    #[test]
    fn test_limiter_blocks_then_admits() {
        let store = Arc::new(InMemoryWindowStore::new());
        let limiter = SlidingWindowLimiter::new(
            Arc::clone(&store) as Arc<dyn WindowStore>,
            "api",
            Duration::from_millis(100),
            1,
        )
        .with_retry_interval(Duration::from_millis(20));
        let cancel = CancellationToken::new();

        limiter.acquire(&cancel).unwrap();

        let start = Instant::now();
        limiter.acquire(&cancel).unwrap();
        assert!(
            start.elapsed() >= Duration::from_millis(60),
            "second acquire should wait for the window to slide"
        );
    }

    #[test]
    fn test_zero_quota_disables_limiter() {
        let store = Arc::new(InMemoryWindowStore::new());
        let limiter = SlidingWindowLimiter::new(
            store as Arc<dyn WindowStore>,
            "api",
            Duration::from_secs(60),
            0,
        );
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..50 {
            limiter.acquire(&cancel).unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_denied_caller_is_cancellable() {
        let store = Arc::new(InMemoryWindowStore::new());
        let limiter = Arc::new(SlidingWindowLimiter::new(
            store as Arc<dyn WindowStore>,
            "api",
            Duration::from_secs(60),
            1,
        ));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).unwrap();

        let waiter = Arc::clone(&limiter);
        let waiter_cancel = cancel.clone();
        let handle = thread::spawn(move || waiter.acquire(&waiter_cancel));

        thread::sleep(Duration::from_millis(50));
        cancel.cancel();

        let result = handle.join().expect("waiter panicked");
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }
}
