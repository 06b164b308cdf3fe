//! HTTP request and response types used throughout the chain.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::StatusCode;
use http_body_util::Full;

/// The HTTP request type seen by interceptors and handlers.
///
/// The body is fully buffered by the server before the chain runs.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type produced by interceptors and handlers.
pub type Response = http::Response<Full<Bytes>>;

/// Extension trait for building plain responses without fallible builders.
pub trait ResponseExt {
    /// Creates a `text/plain` response with the given status and body.
    fn text(status: StatusCode, body: impl Into<Bytes>) -> Response;

    /// Creates a plain-text error response.
    ///
    /// Mirrors the conventional error shape: `text/plain`, `nosniff`, and the
    /// message as the whole body.
    fn error(status: StatusCode, message: &str) -> Response;
}

impl ResponseExt for Response {
    fn text(status: StatusCode, body: impl Into<Bytes>) -> Response {
        let mut response = http::Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    fn error(status: StatusCode, message: &str) -> Response {
        let mut response = Self::text(status, Bytes::copy_from_slice(message.as_bytes()));
        response
            .headers_mut()
            .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        response
    }
}
