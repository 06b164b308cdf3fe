//! # Beacon Server
//!
//! HTTP server, routing and endpoints for Beacon:
//!
//! - [`Server`] / [`ServerHandle`]: background serve task with read,
//!   read-header, write and idle timeouts, and bounded graceful shutdown
//! - [`lifecycle::run`]: races a termination signal against a fatal serve
//!   error and shuts down exactly once
//! - [`Router`]: exact-path and prefix dispatch with a JSON `404`
//! - [`endpoints`]: `/health` and `/api/time`
//! - [`static_files`]: files from the static directory
//!
//! ## Example
//!
//! ```rust,ignore
//! use beacon_server::{app, lifecycle, shutdown::wait_for_termination, Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let handle = Server::new(config.clone(), app::app(&config)).start();
//! let report = lifecycle::run(handle, wait_for_termination()).await;
//! ```

#![doc(html_root_url = "https://docs.rs/beacon-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod lifecycle;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod static_files;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{ConfigError, ServeError, ShutdownError};
pub use lifecycle::{LifecycleReport, LifecycleState, ShutdownTrigger};
pub use router::Router;
pub use server::{ServeOutcome, Server, ServerHandle};
pub use shutdown::{ConnectionTracker, ShutdownSignal, TerminationSignal};
pub use static_files::{StaticFileError, StaticFiles};
