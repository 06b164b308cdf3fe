//! Handler deadline.
//!
//! Bounds the downstream chain by a fixed duration. On expiry the downstream
//! future is dropped and the stage answers `503 Service Unavailable`.
//! Placed inside the logging stage, so a timed-out request is still logged,
//! with the `503`.

use std::time::Duration;

use http::StatusCode;

use crate::{
    context::MiddlewareContext,
    middleware::{BoxFuture, Middleware, Next},
    types::{Request, Response, ResponseExt},
};

/// Body of the response sent when the deadline elapses.
pub const TIMEOUT_BODY: &str = "Service Unavailable";

/// Set in the context when a request ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    /// The deadline that elapsed.
    pub after: Duration,
}

/// Interceptor that limits how long the downstream chain may run.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    /// Creates the stage with the given deadline.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns the deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let path = request.uri().path().to_string();
            let outcome = tokio::time::timeout(self.timeout, next.run(ctx, request)).await;

            match outcome {
                Ok(response) => response,
                Err(_) => {
                    tracing::warn!(%path, timeout = ?self.timeout, "handler timed out");
                    ctx.set_extension(TimedOut {
                        after: self.timeout,
                    });
                    Response::error(StatusCode::SERVICE_UNAVAILABLE, TIMEOUT_BODY)
                }
            }
        })
    }
}
