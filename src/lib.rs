//! Ingest Lane - resilient batch client for a hosted image-extraction API
//!
//! Submits images against an extraction pattern with idempotency keys, polls
//! jobs to a terminal state, and runs batches under bounded concurrency, with
//! retry/backoff, rate limiting and circuit breaking around every call.

pub mod api;
pub mod batch;
pub mod breaker;
pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod limiter;
pub mod mock;
pub mod retry;
pub mod signal;

pub use api::{
    ApiRequest, ApiResponse, CurlConfig, CurlTransport, MockTransport, Payload, Transport,
};
pub use batch::{BatchConfig, BatchItem, BatchReport, BatchRunner, ItemOutcome, ItemStatus};
pub use breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use cancel::CancellationToken;
pub use client::{JobClient, JobClientConfig};
pub use config::LaneConfig;
pub use error::{ClientError, ClientResult, ErrorKind};
pub use job::{JobHandle, JobResult, JobState};
pub use limiter::{InMemoryWindowStore, RateLimiter, SlidingWindowLimiter, TokenBucket};
pub use retry::{RetryDecision, RetryPolicy};
