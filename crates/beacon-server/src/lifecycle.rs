//! Server lifecycle: state tracking and the signal-versus-error race.
//!
//! ```text
//! Idle → Starting → Running → ShuttingDown → Stopped
//! ```
//!
//! [`run`] waits for whichever comes first, a termination signal or the
//! serve task reporting an outcome, then performs exactly one bounded
//! shutdown and reports what happened.
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_server::{lifecycle, shutdown::wait_for_termination, Server};
//!
//! let handle = Server::new(config, app).start();
//! let report = lifecycle::run(handle, wait_for_termination()).await;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{ServeError, ShutdownError};
use crate::server::{ServeOutcome, ServerHandle};
use crate::shutdown::TerminationSignal;

/// Where a server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LifecycleState {
    /// Configured, not started.
    Idle = 0,
    /// Serve task spawned, listener not bound yet.
    Starting = 1,
    /// Accepting connections.
    Running = 2,
    /// Draining in-flight requests.
    ShuttingDown = 3,
    /// Fully stopped.
    Stopped = 4,
}

impl LifecycleState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Shared, forward-only lifecycle state.
#[derive(Debug, Clone)]
pub(crate) struct StateCell {
    state: Arc<AtomicU8>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(LifecycleState::Idle as u8)),
        }
    }

    pub(crate) fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Moves to `to` unless the state is already at or past it.
    pub(crate) fn transition(&self, to: LifecycleState) {
        let from = LifecycleState::from_u8(self.state.fetch_max(to as u8, Ordering::SeqCst));
        if from < to {
            tracing::debug!(%from, %to, "lifecycle transition");
        }
    }
}

/// What started the shutdown.
#[derive(Debug)]
pub enum ShutdownTrigger {
    /// An OS termination signal.
    Signal(TerminationSignal),
    /// The serve task failed.
    ServeError(ServeError),
    /// The serve task closed on its own.
    Closed,
}

/// Result of [`run`].
#[derive(Debug)]
pub struct LifecycleReport {
    /// What started the shutdown.
    pub trigger: ShutdownTrigger,
    /// How the shutdown went.
    pub shutdown: Result<(), ShutdownError>,
}

/// Serves until `signal` resolves or the server reports an outcome, then
/// shuts down once, bounded by the configured deadline.
///
/// Every outcome is logged. Neither a serve error nor a shutdown error is
/// fatal: both are returned in the report for the caller to inspect.
pub async fn run<S>(mut handle: ServerHandle, signal: S) -> LifecycleReport
where
    S: Future<Output = TerminationSignal>,
{
    let trigger = tokio::select! {
        received = signal => {
            tracing::info!(signal = %received, "Shutdown signal received");
            ShutdownTrigger::Signal(received)
        }
        outcome = handle.serve_outcome() => match outcome {
            ServeOutcome::Closed => {
                tracing::info!("Server closed");
                ShutdownTrigger::Closed
            }
            ServeOutcome::Failed(error) => {
                tracing::error!(%error, "Server error");
                ShutdownTrigger::ServeError(error)
            }
        },
    };

    let shutdown = handle.shutdown().await;
    match &shutdown {
        Ok(()) => tracing::info!("Graceful shutdown complete."),
        Err(error) => tracing::error!(%error, "Shutdown error"),
    }

    LifecycleReport { trigger, shutdown }
}
