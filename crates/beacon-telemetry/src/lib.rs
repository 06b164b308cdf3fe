//! Structured logging for Beacon.
//!
//! This crate installs the process-wide `tracing` subscriber exactly once at
//! startup. Every other Beacon crate logs through the `tracing` macros and
//! never configures output itself.
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_telemetry::{init_logging, LogConfig};
//!
//! fn main() -> Result<(), beacon_telemetry::TelemetryError> {
//!     init_logging(&LogConfig::production())?;
//!     tracing::info!(port = 8080, "starting");
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/beacon-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
