//! Panic recovery.
//!
//! Catches a panic raised anywhere downstream, logs it at `ERROR` level, and
//! answers with `500 Internal Server Error` (plain text, body
//! `Internal Server Error`). The server, the connection and every other
//! in-flight request are unaffected.
//!
//! A panic raised after part of a response was already written cannot be
//! turned into a clean 500. Responses are fully buffered before they leave
//! the chain, so that case does not arise here.

use crate::{
    context::MiddlewareContext,
    middleware::{BoxFuture, Middleware, Next},
    types::{Request, Response, ResponseExt},
};
use futures_util::FutureExt;
use http::StatusCode;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Body of the response sent after a recovered panic.
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// Set in the request context when a panic was recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredPanic {
    /// The panic payload rendered as text.
    pub message: String,
}

/// Interceptor that turns downstream panics into 500 responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryMiddleware;

impl RecoveryMiddleware {
    /// Creates the recovery stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            match AssertUnwindSafe(next.run(ctx, request)).catch_unwind().await {
                Ok(response) => response,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(
                        panic = %message,
                        method = %method,
                        path = %path,
                        "panic: {message}"
                    );
                    ctx.set_extension(RecoveredPanic { message });
                    Response::error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY)
                }
            }
        })
    }
}

/// Renders a panic payload as text.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
