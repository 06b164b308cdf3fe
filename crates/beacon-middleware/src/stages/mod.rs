//! Built-in interceptor stages.
//!
//! - [`logging`] - One access-log record per completed request
//! - [`recovery`] - Converts handler panics into `500 Internal Server Error`
//! - [`timeout`] - Answers `503 Service Unavailable` when the handler is late
//!
//! The application chain places recovery outermost, then logging, then the
//! deadline:
//!
//! ```text
//! Recovery → Logging → Timeout → Router
//! ```

pub mod logging;
pub mod recovery;
pub mod timeout;

// Re-export main types
pub use logging::{AccessRecord, LoggingMiddleware, ACCESS_LOG_TARGET};
pub use recovery::{RecoveredPanic, RecoveryMiddleware};
pub use timeout::{TimedOut, TimeoutMiddleware, TIMEOUT_BODY};
