//! Application assembly.
//!
//! ```text
//! Recovery → Logging → Timeout → Router ─┬─ /health     → HealthHandler
//!                                        ├─ /api/time   → TimeHandler
//!                                        ├─ /           → index.html (any method)
//!                                        ├─ /static/*   → StaticFiles
//!                                        └─ otherwise   → 404
//! ```

use std::path::Path;
use std::time::Duration;

use beacon_middleware::stages::{LoggingMiddleware, RecoveryMiddleware, TimeoutMiddleware};
use beacon_middleware::{Chain, Handler};

use crate::config::ServerConfig;
use crate::endpoints::{HealthHandler, TimeHandler};
use crate::router::Router;
use crate::static_files::StaticFiles;

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Path of the time endpoint.
pub const TIME_PATH: &str = "/api/time";

/// Prefix under which the static directory is served.
pub const STATIC_PREFIX: &str = "/static/";

/// Builds the router for the service endpoints and static files.
#[must_use]
pub fn router(static_dir: &Path) -> Router {
    let files = StaticFiles::new(static_dir);
    Router::new()
        .route(HEALTH_PATH, HealthHandler)
        .route(TIME_PATH, TimeHandler)
        .route("/", files.clone().any_method(true))
        .mount(STATIC_PREFIX, files)
}

/// Wraps `handler` in the standard stages: recovery, logging, then the
/// handler deadline.
#[must_use]
pub fn with_stages<H: Handler>(handler: H, write_timeout: Duration) -> Chain {
    Chain::builder(handler)
        .recovery(RecoveryMiddleware::new())
        .layer(LoggingMiddleware::new())
        .layer(TimeoutMiddleware::new(write_timeout))
        .build()
}

/// Builds the full request handler for `config`.
#[must_use]
pub fn app(config: &ServerConfig) -> Chain {
    with_stages(router(config.static_dir()), config.write_timeout())
}
