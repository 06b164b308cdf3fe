//! JSON endpoints.
//!
//! - `/health` - liveness: `{"ok": true, "time": "<RFC3339>"}`
//! - `/api/time` - current time: `{"unix": <seconds>, "iso": "<RFC3339>"}`
//!
//! Both read the clock at request time and answer `200 OK` regardless of
//! method.

use beacon_middleware::{BoxFuture, Handler, MiddlewareContext, Request, Response, ResponseExt};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use serde::{Deserialize, Serialize};

/// Content type of every JSON response.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Serializes `value` as a JSON response.
///
/// Falls back to a plain `500` if serialization fails.
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = http::Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            response
        }
        Err(error) => {
            tracing::error!(%error, "failed to serialize JSON response");
            Response::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Body of the `/health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Always `true` while the server answers.
    pub ok: bool,
    /// Server time, RFC 3339.
    pub time: String,
}

impl HealthStatus {
    /// Builds the status for the given instant.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            ok: true,
            time: rfc3339(now),
        }
    }
}

/// Body of the `/api/time` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInfo {
    /// Seconds since the Unix epoch.
    pub unix: i64,
    /// The same instant, RFC 3339.
    pub iso: String,
}

impl TimeInfo {
    /// Builds the time info for the given instant.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            unix: now.timestamp(),
            iso: rfc3339(now),
        }
    }
}

/// Handler for `/health`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthHandler;

impl Handler for HealthHandler {
    fn call<'a>(
        &'a self,
        _ctx: &'a mut MiddlewareContext,
        _request: Request,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async { json_response(StatusCode::OK, &HealthStatus::at(Utc::now())) })
    }
}

/// Handler for `/api/time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeHandler;

impl Handler for TimeHandler {
    fn call<'a>(
        &'a self,
        _ctx: &'a mut MiddlewareContext,
        _request: Request,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async { json_response(StatusCode::OK, &TimeInfo::at(Utc::now())) })
    }
}
