//! # Beacon Middleware
//!
//! Request interceptors and the chain that composes them around a terminal
//! handler.
//!
//! ## Chain Order
//!
//! ```text
//! Request → Recovery → Logging → Handler
//!                                   ↓
//! Response ← Recovery ← Logging ←───┘
//! ```
//!
//! Interceptors registered first run outermost: their pre-logic runs first
//! and their post-logic runs last. The recovery stage always occupies the
//! outermost slot, so a panic anywhere below it (including inside another
//! interceptor) becomes a `500 Internal Server Error`.
//!
//! ## Example
//!
//! ```
//! use beacon_middleware::chain::Chain;
//! use beacon_middleware::middleware::handler_fn;
//! use beacon_middleware::stages::{LoggingMiddleware, RecoveryMiddleware};
//! use beacon_middleware::types::{Response, ResponseExt};
//! use http::StatusCode;
//!
//! let chain = Chain::builder(handler_fn(|_req| async {
//!     Response::text(StatusCode::OK, "hello")
//! }))
//! .layer(LoggingMiddleware::new())
//! .recovery(RecoveryMiddleware::new())
//! .build();
//!
//! assert_eq!(chain.stage_names(), vec!["recovery", "logging"]);
//! ```

#![doc(html_root_url = "https://docs.rs/beacon-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod context;
pub mod middleware;
pub mod stages;
pub mod types;

// Re-export main types at crate root
pub use chain::{Chain, ChainBuilder};
pub use context::MiddlewareContext;
pub use middleware::{handler_fn, BoxFuture, FnHandler, Handler, Middleware, Next};
pub use types::{Request, Response, ResponseExt};
