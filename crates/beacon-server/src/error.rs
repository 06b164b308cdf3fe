//! Error types for the server crate.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading or interpreting [`ServerConfig`](crate::ServerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The port value is not a number in `0..=65535`.
    #[error("invalid port {value:?}: {source}")]
    InvalidPort {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        #[source]
        source: std::num::ParseIntError,
    },

    /// The bind address cannot be parsed.
    #[error("invalid listen address {addr:?}: {source}")]
    InvalidAddress {
        /// The rejected address.
        addr: String,
        /// Why it was rejected.
        #[source]
        source: std::net::AddrParseError,
    },

    /// The bind address resolved to no candidate address.
    #[error("no address to bind for {addr:?}")]
    NoAddress {
        /// The configured address.
        addr: String,
    },

    /// An environment variable holds non-UTF-8 data.
    #[error("environment variable {name} is not valid unicode")]
    NotUnicode {
        /// The variable name.
        name: &'static str,
    },
}

/// A fatal error from the serve task.
///
/// Delivered asynchronously through [`ServerHandle::serve_outcome`](crate::ServerHandle::serve_outcome).
#[derive(Debug, Error)]
pub enum ServeError {
    /// The configured address is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was requested.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The bound socket did not report its local address.
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),

    /// The serve task ended without reporting an outcome.
    #[error("serve task ended unexpectedly: {0}")]
    TaskFailed(String),
}

/// Errors raised while shutting the server down.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Connections were still open when the deadline elapsed; they were
    /// abandoned.
    #[error("shutdown deadline of {timeout:?} exceeded with {active} connection(s) still open")]
    DeadlineExceeded {
        /// Connections open at the deadline.
        active: usize,
        /// The configured deadline.
        timeout: Duration,
    },

    /// The serve task panicked or was cancelled.
    #[error("serve task failed during shutdown: {0}")]
    TaskFailed(String),
}
