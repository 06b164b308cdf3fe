//! Access logging.
//!
//! Emits exactly one `INFO` record per completed request, under the
//! [`ACCESS_LOG_TARGET`] target, after the downstream chain has returned. The
//! record carries the client address, method, path, status and elapsed time
//! and its message reads like a classic access-log line:
//!
//! ```text
//! 127.0.0.1:53122 GET /health (412.3µs)
//! ```
//!
//! The same data is stored in the request context as an [`AccessRecord`].
//! Panics raised downstream unwind through this stage untouched, so a
//! panicking request produces no access record.

use crate::{
    context::MiddlewareContext,
    middleware::{BoxFuture, Middleware, Next},
    types::{Request, Response},
};
use http::{Method, StatusCode};
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// The `tracing` target used for access-log records.
pub const ACCESS_LOG_TARGET: &str = "beacon::access";

/// What the logging stage observed for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    /// The client address, if known.
    pub remote_addr: Option<SocketAddr>,
    /// The request method.
    pub method: Method,
    /// The request path, without query.
    pub path: String,
    /// The response status.
    pub status: StatusCode,
    /// Time spent in the downstream chain.
    pub elapsed: Duration,
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remote_addr {
            Some(addr) => write!(f, "{addr}")?,
            None => f.write_str("-")?,
        }
        write!(f, " {} {} ({:?})", self.method, self.path, self.elapsed)
    }
}

impl AccessRecord {
    /// Logs this record on [`ACCESS_LOG_TARGET`].
    ///
    /// Called by [`LoggingMiddleware`] and by the server for requests it
    /// rejects before the chain runs.
    pub fn emit(&self) {
        let elapsed_ms = self.elapsed.as_secs_f64() * 1000.0;
        tracing::info!(
            target: ACCESS_LOG_TARGET,
            remote_addr = %self.remote_addr.map_or_else(|| "-".to_string(), |a| a.to_string()),
            method = %self.method,
            path = %self.path,
            status = self.status.as_u16(),
            elapsed_ms,
            "{self}"
        );
    }
}

/// Interceptor that logs every completed request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Creates the logging stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let start = Instant::now();
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            let response = next.run(ctx, request).await;

            let record = AccessRecord {
                remote_addr: ctx.remote_addr(),
                method,
                path,
                status: response.status(),
                elapsed: start.elapsed(),
            };
            record.emit();
            ctx.set_extension(record);

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::middleware::{handler_fn, Handler};
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http_body_util::Full;

    fn request(method: Method, uri: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[test]
    fn test_middleware_name() {
        assert_eq!(LoggingMiddleware::new().name(), "logging");
    }

    #[test]
    fn test_record_display() {
        let record = AccessRecord {
            remote_addr: Some("127.0.0.1:5000".parse().unwrap()),
            method: Method::GET,
            path: "/health".to_string(),
            status: StatusCode::OK,
            elapsed: Duration::from_millis(3),
        };
        assert_eq!(record.to_string(), "127.0.0.1:5000 GET /health (3ms)");
    }

    #[test]
    fn test_record_display_without_addr() {
        let record = AccessRecord {
            remote_addr: None,
            method: Method::POST,
            path: "/".to_string(),
            status: StatusCode::OK,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(record.to_string(), "- POST / (1s)");
    }

    #[tokio::test]
    async fn test_records_request() {
        let chain = Chain::builder(handler_fn(|_req: Request| async {
            Response::text(StatusCode::NOT_FOUND, "missing")
        }))
        .layer(LoggingMiddleware::new())
        .build();

        let addr: SocketAddr = "192.0.2.1:40000".parse().unwrap();
        let mut ctx = MiddlewareContext::new().with_remote_addr(addr);
        let response = chain
            .call(&mut ctx, request(Method::DELETE, "/items/7?force=1"))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let record = ctx.get_extension::<AccessRecord>().unwrap();
        assert_eq!(record.remote_addr, Some(addr));
        assert_eq!(record.method, Method::DELETE);
        assert_eq!(record.path, "/items/7");
        assert_eq!(record.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_elapsed_covers_downstream() {
        let chain = Chain::builder(handler_fn(|_req: Request| async {
            tokio::time::sleep(Duration::from_millis(25)).await;
            Response::text(StatusCode::OK, "slow")
        }))
        .layer(LoggingMiddleware::new())
        .build();

        let mut ctx = MiddlewareContext::new();
        chain.call(&mut ctx, request(Method::GET, "/slow")).await;

        let record = ctx.get_extension::<AccessRecord>().unwrap();
        assert!(record.elapsed >= Duration::from_millis(25));
    }
}
