//! # Beacon
//!
//! A small HTTP service:
//!
//! - `GET /health` and `GET /api/time` JSON endpoints
//! - `/` serves `index.html`, `/static/*` serves the static directory
//! - every request is logged and panics become `500` responses
//! - SIGINT/SIGTERM trigger a graceful shutdown bounded by a deadline
//!
//! ## Architecture
//!
//! ```text
//! Request → Recovery → Logging → Timeout → Router → Handler
//!                                                     ↓
//! Response ← Recovery ← Logging ← Timeout ←───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use beacon::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::production())?;
//!     let config = ServerConfig::from_env()?;
//!     let handle = Server::new(config.clone(), app(&config)).start();
//!     lifecycle::run(handle, wait_for_termination()).await;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/beacon/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export server types
pub use beacon_server as server;

// Re-export middleware types
pub use beacon_middleware as middleware;

// Re-export telemetry setup
pub use beacon_telemetry as telemetry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use beacon::prelude::*;
/// ```
pub mod prelude {
    pub use beacon_middleware::{
        handler_fn, Chain, Handler, Middleware, MiddlewareContext, Next, Request, Response,
        ResponseExt,
    };

    pub use beacon_server::app::app;
    pub use beacon_server::shutdown::wait_for_termination;
    pub use beacon_server::{
        lifecycle, Router, Server, ServerConfig, ServerHandle, ShutdownTrigger, StaticFiles,
    };

    pub use beacon_telemetry::{init_logging, LogConfig};
}
