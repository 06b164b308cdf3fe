//! Shutdown coordination primitives.
//!
//! - [`ShutdownSignal`]: a one-shot, cloneable trigger that any number of
//!   tasks can await
//! - [`ConnectionTracker`]: counts open connections so shutdown can wait for
//!   them to drain
//! - [`wait_for_termination`]: resolves on the first SIGINT or SIGTERM
//!
//! # Example
//!
//! ```rust
//! use beacon_server::shutdown::ShutdownSignal;
//!
//! # tokio_test::block_on(async {
//! let shutdown = ShutdownSignal::new();
//! let waiter = shutdown.clone();
//!
//! assert!(shutdown.trigger());
//! assert!(!shutdown.trigger());
//! waiter.recv().await;
//! # });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A signal that can be triggered once and awaited by many tasks.
///
/// Clones share state: triggering any clone wakes waiters on all of them.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

#[derive(Debug, Default)]
struct SignalInner {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the signal.
    ///
    /// Returns `true` for the call that actually triggered it and `false`
    /// for every later call.
    pub fn trigger(&self) -> bool {
        let first = self
            .inner
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Returns `true` if the signal has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Waits until the signal is triggered.
    ///
    /// Completes immediately if it already was.
    pub async fn recv(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent trigger is not missed.
        notified.as_mut().enable();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

/// Counts open connections and lets shutdown wait for them to close.
///
/// # Example
///
/// ```rust
/// use beacon_server::shutdown::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active: AtomicUsize,
    notify: Notify,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection; hold the token for the connection's lifetime.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Waits until no connections are open.
    pub async fn wait_for_drain(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active_connections() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A registered connection. Dropping it releases the registration.
#[derive(Debug)]
pub struct ConnectionToken {
    inner: Arc<TrackerInner>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

/// An OS signal that requests termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT (Ctrl+C).
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Waits for the first SIGINT or SIGTERM.
///
/// A handler that cannot be registered is logged and never fires; the
/// other one still does.
#[cfg(unix)]
pub async fn wait_for_termination() -> TerminationSignal {
    use tokio::signal::unix::{signal, Signal, SignalKind};

    fn register(kind: SignalKind, name: &'static str) -> Option<Signal> {
        match signal(kind) {
            Ok(signal) => Some(signal),
            Err(error) => {
                tracing::warn!(signal = name, %error, "failed to register signal handler");
                None
            }
        }
    }

    async fn recv(signal: Option<&mut Signal>) {
        if let Some(signal) = signal {
            if signal.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }

    let mut sigint = register(SignalKind::interrupt(), "SIGINT");
    let mut sigterm = register(SignalKind::terminate(), "SIGTERM");

    tokio::select! {
        () = recv(sigint.as_mut()) => TerminationSignal::Interrupt,
        () = recv(sigterm.as_mut()) => TerminationSignal::Terminate,
    }
}

/// Waits for Ctrl+C.
#[cfg(not(unix))]
pub async fn wait_for_termination() -> TerminationSignal {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    TerminationSignal::Interrupt
}
