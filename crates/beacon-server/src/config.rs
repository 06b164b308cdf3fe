//! Server configuration types.
//!
//! The only value read from the environment is `PORT`; everything else has a
//! fixed default and can be overridden through the builder.
//!
//! # Example
//!
//! ```rust
//! use beacon_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .http_addr("127.0.0.1:3000")
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.http_addr(), "127.0.0.1:3000");
//! assert_eq!(config.read_timeout(), Duration::from_secs(5));
//! ```

use std::env::{self, VarError};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable holding the listen port.
pub const PORT_ENV: &str = "PORT";

/// Port used when `PORT` is unset or empty.
pub const DEFAULT_PORT: &str = "8080";

/// Default bind address: all interfaces, default port.
pub const DEFAULT_HTTP_ADDR: &str = ":8080";

/// Default time allowed to read a whole request, in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;

/// Default time allowed to read request headers, in seconds.
pub const DEFAULT_READ_HEADER_TIMEOUT_SECS: u64 = 3;

/// Default time allowed to produce a response, in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Default keep-alive idle period, in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Default graceful shutdown deadline, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Default static file directory.
pub const DEFAULT_STATIC_DIR: &str = "./static";

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] or [`ServerConfig::from_env()`] to
/// construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address; a leading `:` means all interfaces (e.g. `":8080"`).
    http_addr: String,

    /// Upper bound for reading the request body.
    read_timeout: Duration,

    /// Upper bound for reading the request head.
    read_header_timeout: Duration,

    /// Upper bound for producing the response.
    write_timeout: Duration,

    /// How long a keep-alive connection may sit without a request.
    idle_timeout: Duration,

    /// How long shutdown waits for in-flight requests.
    shutdown_timeout: Duration,

    /// Directory served at `/` and `/static/`.
    static_dir: PathBuf,
}

impl ServerConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Builds a configuration from the process environment.
    ///
    /// Reads `PORT`; unset or empty falls back to [`DEFAULT_PORT`]. The
    /// server binds to `":" + PORT`.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is not a valid port number or is not
    /// valid unicode.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var(PORT_ENV) {
            Ok(value) => Some(value),
            Err(VarError::NotPresent) => None,
            Err(VarError::NotUnicode(_)) => return Err(ConfigError::NotUnicode { name: PORT_ENV }),
        };
        Self::from_port(port.as_deref())
    }

    /// Builds a configuration listening on `":" + port`.
    ///
    /// `None` and the empty string select [`DEFAULT_PORT`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPort`] if `port` is not a `u16`.
    pub fn from_port(port: Option<&str>) -> Result<Self, ConfigError> {
        let port = match port.map(str::trim) {
            None | Some("") => DEFAULT_PORT,
            Some(value) => value,
        };
        port.parse::<u16>()
            .map_err(|source| ConfigError::InvalidPort {
                value: port.to_string(),
                source,
            })?;
        Ok(Self::builder().http_addr(format!(":{port}")).build())
    }

    /// Returns the configured bind address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Parses the bind address into the candidates to try, in order.
    ///
    /// A leading `:` means all interfaces: `[::]` first (dual-stack where
    /// the host allows it), then `0.0.0.0` for hosts without IPv6. An
    /// explicit host yields exactly one candidate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if the address cannot be parsed.
    pub fn socket_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        let invalid = |source| ConfigError::InvalidAddress {
            addr: self.http_addr.clone(),
            source,
        };

        match self.http_addr.strip_prefix(':') {
            Some(port) => {
                let port = format!("0.0.0.0:{port}")
                    .parse::<SocketAddr>()
                    .map_err(invalid)?
                    .port();
                Ok(vec![
                    SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
                    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                ])
            }
            None => Ok(vec![self.http_addr.parse().map_err(invalid)?]),
        }
    }

    /// Returns the configured port, if the address parses.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.socket_addrs()
            .ok()
            .and_then(|addrs| addrs.first().map(SocketAddr::port))
    }

    /// Returns the request body read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Returns the request header read timeout.
    #[must_use]
    pub fn read_header_timeout(&self) -> Duration {
        self.read_header_timeout
    }

    /// Returns the handler deadline, applied by [`crate::app::with_stages`]
    /// as the innermost chain stage.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Returns the keep-alive idle timeout.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Returns the graceful shutdown deadline.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the static file directory.
    #[must_use]
    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    http_addr: String,
    read_timeout: Duration,
    read_header_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    shutdown_timeout: Duration,
    static_dir: PathBuf,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            read_header_timeout: Duration::from_secs(DEFAULT_READ_HEADER_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
        }
    }

    /// Sets the bind address (e.g. `"127.0.0.1:0"`, `":9090"`).
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Sets the request body read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the request header read timeout.
    #[must_use]
    pub fn read_header_timeout(mut self, timeout: Duration) -> Self {
        self.read_header_timeout = timeout;
        self
    }

    /// Sets the response write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the keep-alive idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the graceful shutdown deadline.
    ///
    /// Connections still open when it elapses are abandoned.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the static file directory.
    #[must_use]
    pub fn static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            http_addr: self.http_addr,
            read_timeout: self.read_timeout,
            read_header_timeout: self.read_header_timeout,
            write_timeout: self.write_timeout,
            idle_timeout: self.idle_timeout,
            shutdown_timeout: self.shutdown_timeout,
            static_dir: self.static_dir,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
