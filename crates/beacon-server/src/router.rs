//! Path-based request dispatch.
//!
//! Two kinds of routes, both method-agnostic:
//!
//! - **Exact** routes match one path (`/health`, `/`).
//! - **Mounts** match every path under a prefix ending in `/` and hand the
//!   remainder to their handler with the prefix stripped (`/static/app.js`
//!   reaches the mounted handler as `/app.js`).
//!
//! Exact routes are matched against the percent-decoded path; mounts match
//! the raw path and leave decoding to their handler. Exact routes win over
//! mounts; among mounts the longest prefix wins.
//! Anything else gets a JSON `404`:
//!
//! ```json
//! {"error": "Not Found", "path": "/nope"}
//! ```
//!
//! # Example
//!
//! ```rust
//! use beacon_server::endpoints::HealthHandler;
//! use beacon_server::Router;
//!
//! let router = Router::new().route("/health", HealthHandler);
//! assert_eq!(router.route_count(), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use beacon_middleware::{BoxFuture, Handler, MiddlewareContext, Request, Response, ResponseExt};
use http::uri::{PathAndQuery, Uri};
use http::StatusCode;
use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::endpoints::json_response;

/// Body of the not-found response.
#[derive(Debug, Serialize)]
struct NotFound<'a> {
    error: &'static str,
    path: &'a str,
}

/// Builds the JSON `404` for `path`.
#[must_use]
pub fn not_found(path: &str) -> Response {
    json_response(
        StatusCode::NOT_FOUND,
        &NotFound {
            error: "Not Found",
            path,
        },
    )
}

/// Exact-path and prefix dispatch to handlers.
#[derive(Default)]
pub struct Router {
    exact: HashMap<String, Arc<dyn Handler>>,
    mounts: Vec<(String, Arc<dyn Handler>)>,
}

impl Router {
    /// Creates an empty router; every request gets a `404`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes exactly `path` to `handler`, replacing any previous route.
    #[must_use]
    pub fn route<H: Handler>(mut self, path: impl Into<String>, handler: H) -> Self {
        self.exact.insert(path.into(), Arc::new(handler));
        self
    }

    /// Routes every path under `prefix` to `handler`, prefix stripped.
    ///
    /// A missing trailing `/` is added.
    #[must_use]
    pub fn mount<H: Handler>(mut self, prefix: impl Into<String>, handler: H) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.mounts.retain(|(existing, _)| *existing != prefix);
        self.mounts.push((prefix, Arc::new(handler)));
        self.mounts.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        self
    }

    /// Returns the number of exact routes and mounts.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.exact.len() + self.mounts.len()
    }

    fn find_mount(&self, path: &str) -> Option<(&str, &dyn Handler)> {
        self.mounts
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(prefix, handler)| (prefix.as_str(), handler.as_ref()))
    }
}

/// Rewrites the request URI so its path drops `prefix` but keeps a leading `/`.
fn strip_prefix(request: &mut Request, prefix: &str) -> Result<(), http::Error> {
    let uri = request.uri();
    let rest = &uri.path()[prefix.len() - 1..];
    let path_and_query = match uri.query() {
        Some(query) => format!("{rest}?{query}"),
        None => rest.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query)?);
    *request.uri_mut() = Uri::from_parts(parts)?;
    Ok(())
}

impl Handler for Router {
    fn call<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        mut request: Request,
    ) -> BoxFuture<'a, Response> {
        let path = request.uri().path().to_string();
        let decoded = percent_decode_str(&path).decode_utf8_lossy();

        if let Some(handler) = self.exact.get(decoded.as_ref()) {
            return handler.call(ctx, request);
        }

        if let Some((prefix, handler)) = self.find_mount(&path) {
            return match strip_prefix(&mut request, prefix) {
                Ok(()) => handler.call(ctx, request),
                Err(error) => {
                    tracing::debug!(%path, %error, "failed to strip mount prefix");
                    Box::pin(async { Response::error(StatusCode::BAD_REQUEST, "Bad Request") })
                }
            };
        }

        Box::pin(async move { not_found(&path) })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut exact: Vec<_> = self.exact.keys().collect();
        exact.sort();
        let mounts: Vec<_> = self.mounts.iter().map(|(prefix, _)| prefix).collect();
        f.debug_struct("Router")
            .field("exact", &exact)
            .field("mounts", &mounts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_middleware::handler_fn;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};

    fn echo(tag: &'static str) -> impl Handler {
        handler_fn(move |req: Request| async move {
            let uri = req.uri().to_string();
            Response::text(StatusCode::OK, format!("{tag} {uri}"))
        })
    }

    fn request(uri: &str) -> Request {
        http::Request::builder()
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn dispatch(router: &Router, uri: &str) -> (StatusCode, String) {
        let mut ctx = MiddlewareContext::new();
        let response = router.call(&mut ctx, request(uri)).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn router() -> Router {
        Router::new()
            .route("/", echo("index"))
            .route("/health", echo("health"))
            .mount("/static", echo("static"))
            .mount("/static/img/", echo("img"))
    }

    #[test]
    fn test_route_count() {
        assert_eq!(router().route_count(), 4);
    }

    #[tokio::test]
    async fn test_exact_match() {
        assert_eq!(dispatch(&router(), "/health").await, (StatusCode::OK, "health /health".into()));
        assert_eq!(dispatch(&router(), "/").await, (StatusCode::OK, "index /".into()));
    }

    #[tokio::test]
    async fn test_exact_match_ignores_query() {
        let (status, body) = dispatch(&router(), "/health?verbose=1").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("health"));
    }

    #[tokio::test]
    async fn test_exact_match_decodes_path() {
        let (status, body) = dispatch(&router(), "/heal%74h").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("health"));
    }

    #[tokio::test]
    async fn test_mount_strips_prefix() {
        let (status, body) = dispatch(&router(), "/static/app.js?v=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "static /app.js?v=2");
    }

    #[tokio::test]
    async fn test_longest_mount_wins() {
        let (_, body) = dispatch(&router(), "/static/img/logo.png").await;
        assert_eq!(body, "img /logo.png");
    }

    #[tokio::test]
    async fn test_unmatched_is_json_404() {
        for uri in ["/nonexistent", "/health/extra", "/index.html", "/static"] {
            let (status, body) = dispatch(&router(), uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            let value: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(value["error"], "Not Found");
            assert_eq!(value["path"], uri);
        }
    }

    #[test]
    fn test_not_found_content_type() {
        let response = not_found("/x");
        assert_eq!(
            response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            crate::endpoints::JSON_CONTENT_TYPE
        );
    }
}
