//! Server configuration types.
//!
//! Everything serializable about a Conduit server lives here. Callbacks
//! (interceptors, the context function) are set on the
//! [`App`](crate::App) instead.
//!
//! # Example
//!
//! ```rust
//! use conduit_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .addr("127.0.0.1:3000")
//!     .base_url("api/")
//!     .request_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.addr(), "127.0.0.1:3000");
//! assert_eq!(config.base_url(), "/api");
//! ```

use conduit_core::naming::DEFAULT_SUFFIXES;
use crate::tls::TlsConfig;
use conduit_middleware::{OverloadConfig, stages::RateLimitConfig};
use std::net::SocketAddr;
use std::time::Duration;

/// Default HTTP bind address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default keep-alive timeout in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 75;

/// Default maximum request body size (2 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Default time allowed to read a request body, in seconds.
pub const DEFAULT_BODY_READ_TIMEOUT_SECS: u64 = 10;

/// Normalizes a base URL: leading `/`, no trailing `/`, empty for none.
///
/// ```
/// use conduit_server::config::normalize_base_url;
///
/// assert_eq!(normalize_base_url("api/"), "/api");
/// assert_eq!(normalize_base_url("/"), "");
/// assert_eq!(normalize_base_url(""), "");
/// ```
#[must_use]
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    addr: String,
    base_url: String,
    app_name: Option<String>,
    request_timeout: Duration,
    suffixes: Vec<String>,
    strict_auth: bool,
    rate_limit: Option<RateLimitConfig>,
    overload: Option<OverloadConfig>,
    shutdown_timeout: Duration,
    keep_alive_timeout: Option<Duration>,
    max_connections: Option<usize>,
    max_body_size: usize,
    body_read_timeout: Duration,
    tls: Option<TlsConfig>,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the bind address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Parses the bind address.
    ///
    /// A bare `:port` binds every interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        match self.addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}").parse(),
            None => self.addr.parse(),
        }
    }

    /// Returns the normalized base URL, empty when none.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the application name shown on `GET /`.
    #[must_use]
    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the service type name suffixes, in matching order.
    #[must_use]
    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Returns `true` if non-anonymous actions require an identity interceptor.
    #[must_use]
    pub fn strict_auth(&self) -> bool {
        self.strict_auth
    }

    /// Returns the rate limit, if enabled.
    #[must_use]
    pub fn rate_limit(&self) -> Option<&RateLimitConfig> {
        self.rate_limit.as_ref()
    }

    /// Returns the overload thresholds, if load shedding is enabled.
    #[must_use]
    pub fn overload(&self) -> Option<&OverloadConfig> {
        self.overload.as_ref()
    }

    /// Returns the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the keep-alive timeout, if configured.
    #[must_use]
    pub fn keep_alive_timeout(&self) -> Option<Duration> {
        self.keep_alive_timeout
    }

    /// Returns the maximum number of concurrent connections, if configured.
    #[must_use]
    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }

    /// Returns the largest accepted request body, in bytes.
    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Returns the time allowed to read a request body.
    #[must_use]
    pub fn body_read_timeout(&self) -> Duration {
        self.body_read_timeout
    }

    /// Returns the TLS settings; `None` serves plain HTTP.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
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
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig {
                addr: DEFAULT_ADDR.to_string(),
                base_url: String::new(),
                app_name: None,
                request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                suffixes: DEFAULT_SUFFIXES.iter().map(ToString::to_string).collect(),
                strict_auth: false,
                rate_limit: None,
                overload: None,
                shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
                keep_alive_timeout: Some(Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS)),
                max_connections: None,
                max_body_size: DEFAULT_MAX_BODY_SIZE,
                body_read_timeout: Duration::from_secs(DEFAULT_BODY_READ_TIMEOUT_SECS),
                tls: None,
            },
        }
    }

    /// Sets the bind address (`"0.0.0.0:8080"`, `":8080"`).
    #[must_use]
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    /// Sets the base URL every version prefix is nested under.
    #[must_use]
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = normalize_base_url(base_url);
        self
    }

    /// Sets the application name shown on `GET /`.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.config.app_name = (!name.is_empty()).then_some(name);
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Replaces the service type name suffixes.
    #[must_use]
    pub fn suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    /// Requires an identity interceptor for non-anonymous actions.
    #[must_use]
    pub fn strict_auth(mut self, strict: bool) -> Self {
        self.config.strict_auth = strict;
        self
    }

    /// Enables the token bucket rate limiter.
    #[must_use]
    pub fn rate_limit(mut self, config: Option<RateLimitConfig>) -> Self {
        self.config.rate_limit = config;
        self
    }

    /// Enables load shedding with the given thresholds.
    #[must_use]
    pub fn overload(mut self, config: Option<OverloadConfig>) -> Self {
        self.config.overload = config;
        self
    }

    /// Sets the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Sets the keep-alive timeout. `None` disables keep-alive.
    #[must_use]
    pub fn keep_alive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.keep_alive_timeout = timeout;
        self
    }

    /// Sets the maximum number of concurrent connections.
    #[must_use]
    pub fn max_connections(mut self, max: Option<usize>) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Sets the largest accepted request body, in bytes.
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Sets the time allowed to read a request body.
    #[must_use]
    pub fn body_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.body_read_timeout = timeout;
        self
    }

    /// Serves HTTPS with the given certificate and key.
    #[must_use]
    pub fn tls(mut self, config: Option<TlsConfig>) -> Self {
        self.config.tls = config;
        self
    }

    /// Builds the [`ServerConfig`].
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
