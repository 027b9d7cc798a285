//! Outbound request rate limiting
//!
//! Two interchangeable strategies behind one trait: a single-process token
//! bucket and a sliding-window counter over a pluggable shared store.
//! Instances are constructor-injected and owned by the caller; there is no
//! process-global limiter.

pub mod sliding_window;
pub mod token_bucket;

use crate::cancel::CancellationToken;
use crate::error::ClientError;

pub use sliding_window::{InMemoryWindowStore, SlidingWindowLimiter, WindowStore};
pub use token_bucket::TokenBucket;

/// Blocking, cancellable admission of one request
pub trait RateLimiter: Send + Sync {
    /// Block until one unit of capacity is available
    ///
    /// Returns `Cancelled` or `Timeout` if the token interrupts the wait.
    fn acquire(&self, cancel: &CancellationToken) -> Result<(), ClientError>;
}
