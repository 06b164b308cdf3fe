//! HTTP server.
//!
//! [`Server::start`] spawns a serve task and returns a [`ServerHandle`]
//! immediately. The task binds the listener, accepts connections and spawns
//! one task per connection. Bind failures are not returned from `start`:
//! they arrive later through [`ServerHandle::serve_outcome`].
//!
//! # Timeouts
//!
//! | Setting | Effect |
//! |---|---|
//! | read-header | a request head must arrive in full within this period of its first byte (or of accept, for the first request); the connection is closed otherwise |
//! | read | request body collection; `408 Request Timeout` on expiry |
//! | write | handler execution, enforced by the chain's timeout stage (see [`crate::app`]) |
//! | idle | keep-alive connections without a request are closed gracefully |
//!
//! The read-header and idle deadlines are tracked per connection by a
//! watchdog fed from the socket reads, so the header deadline never cuts a
//! keep-alive pause short.
//!
//! # Shutdown
//!
//! [`ServerHandle::shutdown`] stops the accept loop, asks every connection to
//! finish its current request and close, then waits for them to drain. If
//! the deadline elapses first, the remaining connections are dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_server::{Server, ServerConfig};
//!
//! let handle = Server::new(ServerConfig::from_env()?, app).start();
//! let addr = handle.local_addr().await;
//! // ...
//! handle.shutdown().await?;
//! ```

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use beacon_middleware::stages::AccessRecord;
use beacon_middleware::{Handler, MiddlewareContext, Response, ResponseExt};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::error::{ConfigError, ServeError, ShutdownError};
use crate::lifecycle::{LifecycleState, StateCell};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// First delay after a failed `accept`.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);

/// Upper bound for the accept back-off.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// How the serve task ended.
#[derive(Debug)]
pub enum ServeOutcome {
    /// The server was shut down deliberately. Not an error.
    Closed,
    /// The server could not start or stopped on a fatal error.
    Failed(ServeError),
}

impl From<Result<(), ServeError>> for ServeOutcome {
    fn from(result: Result<(), ServeError>) -> Self {
        match result {
            Ok(()) => Self::Closed,
            Err(error) => Self::Failed(error),
        }
    }
}

/// A configured server that has not started yet.
pub struct Server {
    config: ServerConfig,
    handler: Arc<dyn Handler>,
}

impl Server {
    /// Creates a server that answers every request with `handler`.
    #[must_use]
    pub fn new<H: Handler>(config: ServerConfig, handler: H) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Spawns the serve task and returns its handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> ServerHandle {
        let state = StateCell::new();
        state.transition(LifecycleState::Starting);

        let shutdown = ShutdownSignal::new();
        let abort = ShutdownSignal::new();
        let tracker = ConnectionTracker::new();
        let (addr_tx, addr_rx) = watch::channel(None);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let shutdown_timeout = self.config.shutdown_timeout();

        let task = tokio::spawn(serve(
            self.config,
            self.handler,
            ServeControl {
                shutdown: shutdown.clone(),
                abort: abort.clone(),
                tracker: tracker.clone(),
                state: state.clone(),
                local_addr: addr_tx,
            },
            outcome_tx,
        ));

        ServerHandle {
            shutdown,
            abort,
            tracker,
            state,
            local_addr: addr_rx,
            outcome: Some(outcome_rx),
            task,
            shutdown_timeout,
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Control surface of a running server.
///
/// Stopping consumes the handle, so a server is shut down at most once.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown: ShutdownSignal,
    abort: ShutdownSignal,
    tracker: ConnectionTracker,
    state: StateCell,
    local_addr: watch::Receiver<Option<SocketAddr>>,
    outcome: Option<oneshot::Receiver<ServeOutcome>>,
    task: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl ServerHandle {
    /// Waits for the listener to bind and returns its address.
    ///
    /// Returns `None` if binding failed.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut rx = self.local_addr.clone();
        let bound = rx.wait_for(Option::is_some).await;
        bound.ok().and_then(|addr| *addr)
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.tracker.active_connections()
    }

    /// Waits for the serve task to report how it ended.
    ///
    /// Cancel-safe: if the returned future is dropped, a later call still
    /// observes the outcome. Once the outcome has been returned, later calls
    /// never complete.
    pub async fn serve_outcome(&mut self) -> ServeOutcome {
        let Some(rx) = self.outcome.as_mut() else {
            return std::future::pending().await;
        };
        let outcome = rx.await;
        self.outcome = None;
        outcome.unwrap_or_else(|_| {
            ServeOutcome::Failed(ServeError::TaskFailed(
                "serve task exited without reporting".to_string(),
            ))
        })
    }

    /// Shuts the server down, bounded by the configured deadline.
    ///
    /// Stops accepting immediately, lets in-flight requests finish, and
    /// waits for every connection to close. Connections still open at the
    /// deadline are abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::DeadlineExceeded`] if connections were
    /// abandoned, or [`ShutdownError::TaskFailed`] if the serve task
    /// panicked.
    pub async fn shutdown(self) -> Result<(), ShutdownError> {
        let Self {
            shutdown,
            abort,
            tracker,
            state,
            task,
            shutdown_timeout,
            ..
        } = self;

        state.transition(LifecycleState::ShuttingDown);
        shutdown.trigger();
        tracing::info!(
            active_connections = tracker.active_connections(),
            timeout = ?shutdown_timeout,
            "Shutting down"
        );

        let deadline = Instant::now() + shutdown_timeout;
        let drained = tokio::time::timeout_at(deadline, async {
            let joined = task.await;
            tracker.wait_for_drain().await;
            joined
        })
        .await;

        let result = match drained {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_error)) => Err(ShutdownError::TaskFailed(join_error.to_string())),
            Err(_) => {
                let active = tracker.active_connections();
                abort.trigger();
                Err(ShutdownError::DeadlineExceeded {
                    active,
                    timeout: shutdown_timeout,
                })
            }
        };

        state.transition(LifecycleState::Stopped);
        result
    }
}

/// Shared state the serve task needs besides config and handler.
struct ServeControl {
    shutdown: ShutdownSignal,
    abort: ShutdownSignal,
    tracker: ConnectionTracker,
    state: StateCell,
    local_addr: watch::Sender<Option<SocketAddr>>,
}

/// Per-connection settings derived from the config.
#[derive(Debug, Clone, Copy)]
struct ConnSettings {
    read_timeout: Duration,
    read_header_timeout: Duration,
    idle_timeout: Duration,
}

impl From<&ServerConfig> for ConnSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            read_header_timeout: config.read_header_timeout(),
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// The serve task: bind, accept until shutdown, report the outcome.
async fn serve(
    config: ServerConfig,
    handler: Arc<dyn Handler>,
    control: ServeControl,
    outcome: oneshot::Sender<ServeOutcome>,
) {
    let result = async {
        let listener = bind(&config).await?;
        accept_loop(listener, handler, ConnSettings::from(&config), &control).await
    }
    .await;
    // The handle may already be gone.
    let _ = outcome.send(ServeOutcome::from(result));
}

/// Binds the first candidate address that accepts; reports the last failure.
async fn bind(config: &ServerConfig) -> Result<TcpListener, ServeError> {
    let mut candidates = config.socket_addrs()?.into_iter().peekable();

    while let Some(addr) = candidates.next() {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(source) if candidates.peek().is_none() => {
                return Err(ServeError::Bind { addr, source });
            }
            Err(error) => tracing::debug!(%addr, %error, "bind failed, trying next address"),
        }
    }

    Err(ConfigError::NoAddress {
        addr: config.http_addr().to_string(),
    }
    .into())
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    settings: ConnSettings,
    control: &ServeControl,
) -> Result<(), ServeError> {
    let local_addr = listener.local_addr().map_err(ServeError::LocalAddr)?;
    control.state.transition(LifecycleState::Running);
    control.local_addr.send_replace(Some(local_addr));
    tracing::info!(addr = %local_addr, "Server listening");

    let mut backoff: Option<Duration> = None;
    loop {
        tokio::select! {
            biased;
            () = control.shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    backoff = None;
                    let token = control.tracker.acquire();
                    let handler = Arc::clone(&handler);
                    let shutdown = control.shutdown.clone();
                    let abort = control.abort.clone();
                    tokio::spawn(async move {
                        serve_connection(stream, remote_addr, handler, settings, shutdown, abort).await;
                        drop(token);
                    });
                }
                Err(error) => {
                    let delay = backoff.map_or(ACCEPT_BACKOFF_MIN, |d| (d * 2).min(ACCEPT_BACKOFF_MAX));
                    backoff = Some(delay);
                    tracing::warn!(%error, retry_in = ?delay, "accept error");
                    tokio::select! {
                        () = control.shutdown.recv() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            },
        }
    }

    tracing::debug!(addr = %local_addr, "Listener closed");
    Ok(())
}

/// Which per-connection deadline elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    /// No request for the idle period.
    Idle,
    /// A request head started but did not finish in time.
    HeaderTimeout,
}

/// Request activity on one connection, for the idle and read-header
/// deadlines.
struct Activity {
    state: Mutex<ActivityState>,
    changed: Notify,
}

struct ActivityState {
    in_flight: usize,
    last_active: Instant,
    /// When bytes of the next request head started arriving.
    head_started: Option<Instant>,
}

impl Activity {
    /// The first request head is timed from accept.
    fn new() -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(ActivityState {
                in_flight: 0,
                last_active: now,
                head_started: Some(now),
            }),
            changed: Notify::new(),
        }
    }

    fn begin(self: &Arc<Self>) -> ActivityGuard {
        {
            let mut state = self.state.lock();
            state.in_flight += 1;
            state.last_active = Instant::now();
            state.head_started = None;
        }
        self.changed.notify_waiters();
        ActivityGuard {
            activity: Arc::clone(self),
        }
    }

    fn end(&self) {
        {
            let mut state = self.state.lock();
            state.in_flight -= 1;
            state.last_active = Instant::now();
        }
        self.changed.notify_waiters();
    }

    /// Bytes arrived from the client. Between requests this starts the
    /// read-header deadline.
    fn bytes_received(&self) {
        let started = {
            let mut state = self.state.lock();
            if state.in_flight == 0 && state.head_started.is_none() {
                state.head_started = Some(Instant::now());
                true
            } else {
                false
            }
        };
        if started {
            self.changed.notify_waiters();
        }
    }

    /// Resolves when the pending request head is late or the connection has
    /// been idle for `idle`. Never resolves while a request is in flight.
    async fn expired(&self, idle: Duration, read_header: Duration) -> Expiry {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let deadline = {
                let state = self.state.lock();
                if state.in_flight > 0 {
                    None
                } else if let Some(started) = state.head_started {
                    Some((started + read_header, Expiry::HeaderTimeout))
                } else {
                    Some((state.last_active + idle, Expiry::Idle))
                }
            };

            match deadline {
                None => changed.await,
                Some((at, expiry)) => {
                    if Instant::now() >= at {
                        return expiry;
                    }
                    tokio::select! {
                        () = tokio::time::sleep_until(at) => {}
                        () = changed => {}
                    }
                }
            }
        }
    }
}

struct ActivityGuard {
    activity: Arc<Activity>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.activity.end();
    }
}

/// A client socket that reports reads to its connection's [`Activity`].
struct WatchedStream {
    inner: TcpStream,
    activity: Arc<Activity>,
}

impl AsyncRead for WatchedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let polled = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(polled, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.activity.bytes_received();
        }
        polled
    }
}

impl AsyncWrite for WatchedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    handler: Arc<dyn Handler>,
    settings: ConnSettings,
    shutdown: ShutdownSignal,
    abort: ShutdownSignal,
) {
    let activity = Arc::new(Activity::new());

    let service = {
        let activity = Arc::clone(&activity);
        service_fn(move |request: http::Request<Incoming>| {
            let handler = Arc::clone(&handler);
            let guard = activity.begin();
            async move {
                let response = handle_request(handler.as_ref(), settings, remote_addr, request).await;
                drop(guard);
                Ok::<_, Infallible>(response)
            }
        })
    };

    // hyper would time every wait for a head, keep-alive pauses included;
    // the watchdog below owns that deadline instead.
    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(None)
        .keep_alive(true);
    let io = TokioIo::new(WatchedStream {
        inner: stream,
        activity: Arc::clone(&activity),
    });
    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(error) = result {
                    tracing::debug!(%remote_addr, %error, "connection error");
                }
                break;
            }
            () = shutdown.recv(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
            expiry = activity.expired(settings.idle_timeout, settings.read_header_timeout), if !draining => {
                match expiry {
                    Expiry::Idle => {
                        tracing::debug!(%remote_addr, "closing idle connection");
                        draining = true;
                        conn.as_mut().graceful_shutdown();
                    }
                    Expiry::HeaderTimeout => {
                        tracing::debug!(%remote_addr, "request head timed out");
                        break;
                    }
                }
            }
            () = abort.recv() => {
                tracing::warn!(%remote_addr, "abandoning connection at shutdown deadline");
                break;
            }
        }
    }
}

/// Buffers the request body under the read timeout, then runs the handler.
///
/// Requests rejected here never reach the handler chain, so their access
/// record is emitted directly.
async fn handle_request(
    handler: &dyn Handler,
    settings: ConnSettings,
    remote_addr: SocketAddr,
    request: http::Request<Incoming>,
) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();

    let rejected = match tokio::time::timeout(settings.read_timeout, body.collect()).await {
        Ok(Ok(collected)) => {
            let request = http::Request::from_parts(parts, Full::new(collected.to_bytes()));
            let mut ctx = MiddlewareContext::new().with_remote_addr(remote_addr);
            return handler.call(&mut ctx, request).await;
        }
        Ok(Err(error)) => {
            tracing::debug!(%remote_addr, %error, "failed to read request body");
            Response::error(StatusCode::BAD_REQUEST, "Bad Request")
        }
        Err(_) => {
            tracing::warn!(%remote_addr, path = %parts.uri.path(), "request body read timed out");
            Response::error(StatusCode::REQUEST_TIMEOUT, "Request Timeout")
        }
    };

    AccessRecord {
        remote_addr: Some(remote_addr),
        method: parts.method,
        path: parts.uri.path().to_string(),
        status: rejected.status(),
        elapsed: started.elapsed(),
    }
    .emit();
    rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_middleware::{handler_fn, Request};

    fn ok_handler() -> impl Handler {
        handler_fn(|_req: Request| async { Response::text(StatusCode::OK, "ok") })
    }

    fn local_config() -> ServerConfig {
        ServerConfig::builder()
            .http_addr("127.0.0.1:0")
            .shutdown_timeout(Duration::from_millis(500))
            .build()
    }

    #[tokio::test]
    async fn test_start_binds_and_reports_address() {
        let handle = Server::new(local_config(), ok_handler()).start();

        let addr = handle.local_addr().await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert_eq!(handle.state(), LifecycleState::Running);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_address_is_reported_asynchronously() {
        let config = ServerConfig::builder().http_addr("not-an-address").build();
        let mut handle = Server::new(config, ok_handler()).start();

        assert!(handle.local_addr().await.is_none());
        let outcome = handle.serve_outcome().await;
        assert!(matches!(outcome, ServeOutcome::Failed(ServeError::Config(_))));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = Server::new(local_config(), ok_handler()).start();
        let addr = first.local_addr().await.unwrap();

        let config = ServerConfig::builder().http_addr(addr.to_string()).build();
        let mut second = Server::new(config, ok_handler()).start();

        match second.serve_outcome().await {
            ServeOutcome::Failed(ServeError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("expected bind failure, got {other:?}"),
        }

        second.shutdown().await.unwrap();
        first.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_reports_closed_outcome() {
        let mut handle = Server::new(local_config(), ok_handler()).start();
        handle.local_addr().await.unwrap();

        handle.shutdown.trigger();
        assert!(matches!(handle.serve_outcome().await, ServeOutcome::Closed));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_without_connections_is_immediate() {
        let handle = Server::new(local_config(), ok_handler()).start();
        handle.local_addr().await.unwrap();

        let started = std::time::Instant::now();
        handle.shutdown().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_outcome_from_result() {
        assert!(matches!(ServeOutcome::from(Ok(())), ServeOutcome::Closed));

        let failed = ServeOutcome::from(Err(ServeError::LocalAddr(io::Error::other("gone"))));
        assert!(matches!(failed, ServeOutcome::Failed(ServeError::LocalAddr(_))));
    }

    const IDLE: Duration = Duration::from_secs(60);
    const READ_HEADER: Duration = Duration::from_secs(3);

    fn watch(activity: &Arc<Activity>) -> JoinHandle<Expiry> {
        let activity = Arc::clone(activity);
        tokio::spawn(async move { activity.expired(IDLE, READ_HEADER).await })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_head_timed_from_accept() {
        let activity = Arc::new(Activity::new());
        let watchdog = watch(&activity);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!watchdog.is_finished());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(watchdog.await.unwrap(), Expiry::HeaderTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_pause_is_not_a_header_timeout() {
        let activity = Arc::new(Activity::new());
        drop(activity.begin());
        let watchdog = watch(&activity);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!watchdog.is_finished());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(watchdog.await.unwrap(), Expiry::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_head_after_pause_times_out() {
        let activity = Arc::new(Activity::new());
        drop(activity.begin());
        let watchdog = watch(&activity);

        tokio::time::sleep(Duration::from_secs(30)).await;
        activity.bytes_received();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!watchdog.is_finished());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(watchdog.await.unwrap(), Expiry::HeaderTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_request_never_expires() {
        let activity = Arc::new(Activity::new());
        let guard = activity.begin();
        let watchdog = watch(&activity);

        activity.bytes_received();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!watchdog.is_finished());

        drop(guard);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(watchdog.await.unwrap(), Expiry::Idle);
    }
}
