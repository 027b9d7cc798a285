//! In-process mock of the extraction service
//!
//! Used by the test suites (and available to downstream callers) to exercise
//! the client without a network: idempotency-key deduplication, scripted job
//! state walks and per-endpoint failure injection.

pub mod failure;
pub mod service;
pub mod state;

pub use failure::{Endpoint, FailureConfig, FailureInjector};
pub use service::MockService;
pub use state::{MockJob, MockJobState, MockServiceState};
