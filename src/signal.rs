//! Signal handling for graceful shutdown (SIGINT/SIGTERM)
//!
//! First signal: cancel the shared token so every suspension point unwinds
//! and in-flight outcomes land in the report. Second signal: exit
//! immediately. Third and later: ignored.

use std::process;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::error::ErrorKind;

/// Exit code for cancelled runs
pub const EXIT_CODE_CANCELLED: i32 = 80;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: initiate graceful cancellation
    InitiateCancellation,
    /// Second signal: exit immediately
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Signal handler state
#[derive(Debug)]
pub struct SignalState {
    token: CancellationToken,
    signal_count: AtomicU8,
}

impl SignalState {
    /// Create signal state wired to the given token
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            signal_count: AtomicU8::new(0),
        }
    }

    /// Handle a signal, cancelling the token on the first one
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        if count == 0 {
            self.token.cancel();
            SignalAction::InitiateCancellation
        } else if count == 1 {
            SignalAction::ImmediateExit
        } else {
            SignalAction::Ignore
        }
    }

    /// Number of signals received
    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }
}

/// Installs SIGINT/SIGTERM handlers that drive a [`SignalState`]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Create a handler for the given token
    pub fn new(token: CancellationToken) -> Self {
        Self {
            state: Arc::new(SignalState::new(token)),
        }
    }

    /// Shared signal state, for assertions and status checks
    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install the handlers; call once at program startup
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::InitiateCancellation => {
                eprintln!("\nreceived interrupt, cancelling in-flight work...");
            }
            SignalAction::ImmediateExit => {
                eprintln!("\nreceived second interrupt, exiting immediately");
                process::exit(ErrorKind::Cancelled.exit_code());
            }
            SignalAction::Ignore => {}
        })
    }
}
