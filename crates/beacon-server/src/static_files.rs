//! Static file serving.
//!
//! Serves files below a root directory:
//!
//! - `GET` and `HEAD` only; other methods get `405` unless
//!   [`StaticFiles::any_method`] is set
//! - the path is percent-decoded first; invalid UTF-8 gets `400`
//! - `..` segments and hidden names (leading `.`) are refused with `403`
//! - directories fall back to their index file, `404` otherwise
//! - `Content-Type` from the file extension, `Content-Length`,
//!   `Last-Modified`; `If-Modified-Since` yields `304`
//!
//! Used both for the site root (`/` serves `index.html`) and for the
//! `/static/` mount.
//!
//! # Example
//!
//! ```rust
//! use beacon_server::static_files::StaticFiles;
//!
//! let files = StaticFiles::new("./static").cache_control("no-cache");
//! assert_eq!(files.index_file(), "index.html");
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use beacon_middleware::{BoxFuture, Handler, MiddlewareContext, Request, Response, ResponseExt};
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use http_body_util::Full;
use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Default index file served for directory requests.
pub const DEFAULT_INDEX_FILE: &str = "index.html";

/// Reasons a static file request fails.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// Nothing to serve at this path.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path is refused (traversal or hidden file).
    #[error("forbidden path {path}: {reason}")]
    Forbidden {
        /// The requested path.
        path: String,
        /// Why it was refused.
        reason: &'static str,
    },

    /// The path does not decode to UTF-8.
    #[error("invalid path encoding: {0}")]
    InvalidPath(String),

    /// Only `GET` and `HEAD` are served.
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    /// Reading the file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StaticFileError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response =
            Response::error(status, status.canonical_reason().unwrap_or("Error"));
        if matches!(self, Self::MethodNotAllowed(_)) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        }
        response
    }
}

/// A static file handler rooted at a directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index_file: String,
    cache_control: Option<HeaderValue>,
    serve_hidden: bool,
    any_method: bool,
}

impl StaticFiles {
    /// Serves files below `root`, with `index.html` as the directory index.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_file: DEFAULT_INDEX_FILE.to_string(),
            cache_control: None,
            serve_hidden: false,
            any_method: false,
        }
    }

    /// Adds a `Cache-Control` header to every file response.
    ///
    /// Values that are not valid header text are ignored.
    #[must_use]
    pub fn cache_control(mut self, value: &str) -> Self {
        self.cache_control = HeaderValue::from_str(value).ok();
        self
    }

    /// Allows names starting with `.`.
    #[must_use]
    pub fn serve_hidden(mut self, enabled: bool) -> Self {
        self.serve_hidden = enabled;
        self
    }

    /// Serves files for every method, not only `GET` and `HEAD`.
    ///
    /// `HEAD` still gets an empty body.
    #[must_use]
    pub fn any_method(mut self, enabled: bool) -> Self {
        self.any_method = enabled;
        self
    }

    /// Returns the index file name.
    #[must_use]
    pub fn index_file(&self) -> &str {
        &self.index_file
    }

    /// Serves `request_path`, relative to the root.
    ///
    /// # Errors
    ///
    /// See [`StaticFileError`].
    pub async fn serve(
        &self,
        method: &Method,
        request_path: &str,
        headers: &HeaderMap,
    ) -> Result<Response, StaticFileError> {
        if !self.any_method && method != Method::GET && method != Method::HEAD {
            return Err(StaticFileError::MethodNotAllowed(method.clone()));
        }

        let decoded = percent_decode_str(request_path)
            .decode_utf8()
            .map_err(|_| StaticFileError::InvalidPath(request_path.to_string()))?;
        let mut path = self.resolve_path(&decoded)?;
        let mut metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;

        if metadata.is_dir() {
            path = path.join(&self.index_file);
            metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;
            if !metadata.is_file() {
                return Err(StaticFileError::NotFound(request_path.to_string()));
            }
        }

        let modified = metadata.modified().ok();
        if let (Some(modified), Some(since)) = (modified, if_modified_since(headers)) {
            if unix_secs(modified) <= unix_secs(since) {
                return Ok(self.not_modified(modified));
            }
        }

        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::from(tokio::fs::read(&path).await?)
        };

        Ok(self.file_response(body, metadata.len(), detect_mime_type(&path), modified))
    }

    /// Maps a decoded request path onto the filesystem, refusing traversal
    /// and hidden names.
    fn resolve_path(&self, request_path: &str) -> Result<PathBuf, StaticFileError> {
        let relative = request_path.trim_start_matches('/');
        let forbidden = |reason| StaticFileError::Forbidden {
            path: request_path.to_string(),
            reason,
        };

        for component in Path::new(relative).components() {
            match component {
                Component::ParentDir => return Err(forbidden("directory traversal")),
                Component::Normal(name) => {
                    if !self.serve_hidden && name.to_string_lossy().starts_with('.') {
                        return Err(forbidden("hidden file"));
                    }
                }
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => {
                    return Err(forbidden("absolute path"));
                }
            }
        }

        Ok(self.root.join(relative))
    }

    fn file_response(
        &self,
        body: Bytes,
        len: u64,
        mime_type: &'static str,
        modified: Option<SystemTime>,
    ) -> Response {
        let mut response = http::Response::new(Full::new(body));
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_type));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        if let Some(modified) = modified {
            if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(modified)) {
                headers.insert(header::LAST_MODIFIED, value);
            }
        }
        if let Some(cache_control) = &self.cache_control {
            headers.insert(header::CACHE_CONTROL, cache_control.clone());
        }
        response
    }

    fn not_modified(&self, modified: SystemTime) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(modified)) {
            response.headers_mut().insert(header::LAST_MODIFIED, value);
        }
        if let Some(cache_control) = &self.cache_control {
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, cache_control.clone());
        }
        response
    }
}

impl Handler for StaticFiles {
    fn call<'a>(
        &'a self,
        _ctx: &'a mut MiddlewareContext,
        request: Request,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let path = request.uri().path();
            match self.serve(request.method(), path, request.headers()).await {
                Ok(response) => response,
                Err(StaticFileError::Io(error)) => {
                    tracing::error!(%path, %error, "failed to read static file");
                    StaticFileError::Io(error).into_response()
                }
                Err(error) => {
                    tracing::debug!(%path, %error, "static file not served");
                    error.into_response()
                }
            }
        })
    }
}

fn if_modified_since(headers: &HeaderMap) -> Option<SystemTime> {
    let value = headers.get(header::IF_MODIFIED_SINCE)?.to_str().ok()?;
    httpdate::parse_http_date(value).ok()
}

/// HTTP dates have second precision.
fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

/// Picks a content type from the file extension.
fn detect_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "<html>Hello</html>").unwrap();
        fs::write(dir.path().join("style.css"), "body { color: red }").unwrap();
        fs::write(dir.path().join("app.js"), "console.log('hi')").unwrap();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join("index.html"), "<html>Docs</html>").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        dir
    }

    async fn get(files: &StaticFiles, path: &str) -> Result<Response, StaticFileError> {
        files.serve(&Method::GET, path, &HeaderMap::new()).await
    }

    async fn body(response: Response) -> String {
        use http_body_util::BodyExt;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let files = StaticFiles::new("./static");
        assert_eq!(files.root, Path::new("./static"));
        assert_eq!(files.index_file(), "index.html");
        assert!(!files.serve_hidden);
        assert!(!files.any_method);
        assert!(files.cache_control.is_none());
    }

    #[tokio::test]
    async fn test_serve_html_file() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let response = get(&files, "/index.html").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "18");
        assert!(response.headers().contains_key(header::LAST_MODIFIED));
        assert_eq!(body(response).await, "<html>Hello</html>");
    }

    #[tokio::test]
    async fn test_root_serves_index() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let response = get(&files, "/").await.unwrap();
        assert_eq!(body(response).await, "<html>Hello</html>");
    }

    #[tokio::test]
    async fn test_subdirectory_index() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let response = get(&files, "/docs/").await.unwrap();
        assert_eq!(body(response).await, "<html>Docs</html>");
    }

    #[tokio::test]
    async fn test_directory_without_index() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let err = get(&files, "/empty").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let err = get(&files, "/nope.txt").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_directory_traversal_blocked() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let err = get(&files, "/../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StaticFileError::Forbidden { reason: "directory traversal", .. }));
    }

    #[tokio::test]
    async fn test_hidden_files_blocked_by_default() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let err = get(&files, "/.env").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let files = files.serve_hidden(true);
        assert!(get(&files, "/.env").await.is_ok());
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let err = files
            .serve(&Method::POST, "/index.html", &HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);

        let response = err.into_response();
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET, HEAD");
    }

    #[tokio::test]
    async fn test_any_method_serves_post() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path()).any_method(true);

        let response = files
            .serve(&Method::POST, "/", &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "<html>Hello</html>");
    }

    #[tokio::test]
    async fn test_percent_encoded_name() {
        let dir = create_test_dir();
        fs::write(dir.path().join("my file.txt"), "spaced").unwrap();
        let files = StaticFiles::new(dir.path());

        let response = get(&files, "/my%20file.txt").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "spaced");
    }

    #[tokio::test]
    async fn test_encoded_traversal_and_hidden_blocked() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let err = get(&files, "/%2e%2e/etc/passwd").await.unwrap_err();
        assert!(matches!(err, StaticFileError::Forbidden { reason: "directory traversal", .. }));

        let err = get(&files, "/%2Eenv").await.unwrap_err();
        assert!(matches!(err, StaticFileError::Forbidden { reason: "hidden file", .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_path() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let err = get(&files, "/%ff.txt").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_head_request() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let response = files
            .serve(&Method::HEAD, "/style.css", &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "19");
        assert_eq!(body(response).await, "");
    }

    #[tokio::test]
    async fn test_if_modified_since_returns_304() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let future = SystemTime::now() + Duration::from_secs(3600);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&httpdate::fmt_http_date(future)).unwrap(),
        );

        let response = files.serve(&Method::GET, "/app.js", &headers).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(body(response).await, "");
    }

    #[tokio::test]
    async fn test_stale_if_modified_since_serves_file() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"),
        );

        let response = files.serve(&Method::GET, "/app.js", &headers).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cache_control_header() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path()).cache_control("max-age=60");

        let response = get(&files, "/app.js").await.unwrap();
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "max-age=60");
    }

    #[test]
    fn test_mime_type_detection() {
        assert_eq!(detect_mime_type(Path::new("a.HTML")), "text/html; charset=utf-8");
        assert_eq!(detect_mime_type(Path::new("a.js")), "text/javascript; charset=utf-8");
        assert_eq!(detect_mime_type(Path::new("a.png")), "image/png");
        assert_eq!(detect_mime_type(Path::new("Makefile")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_handler_maps_errors() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());
        let mut ctx = MiddlewareContext::new();

        let request = http::Request::builder()
            .uri("/missing.css")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = files.call(&mut ctx, request).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(response).await, "Not Found");
    }
}
