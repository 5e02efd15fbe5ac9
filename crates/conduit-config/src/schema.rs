//! Configuration schema types.
//!
//! This module defines the structure of every configuration section. Every
//! field has a default, so a section may be partially specified; unknown
//! fields are rejected.

use conduit_core::naming::DEFAULT_SUFFIXES;
use conduit_server::config::{
    DEFAULT_ADDR, DEFAULT_BODY_READ_TIMEOUT_SECS, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_MAX_BODY_SIZE,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration section.
///
/// # Example
///
/// ```
/// use conduit_config::ServerSection;
///
/// let section: ServerSection = toml::from_str(r#"
///     addr = ":9000"
///     base_url = "api"
/// "#).unwrap();
///
/// assert_eq!(section.addr, ":9000");
/// assert_eq!(section.request_timeout_ms, 30_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address; `":port"` binds every interface.
    pub addr: String,

    /// Prefix of every route.
    pub base_url: String,

    /// Name shown on `GET /`.
    pub app_name: Option<String>,

    /// Per-action deadline in milliseconds.
    pub request_timeout_ms: u64,

    /// Service type-name suffixes, matched in order.
    pub suffixes: Vec<String>,

    /// Refuse non-anonymous actions while no identity interceptor is set.
    pub strict_auth: bool,

    /// Graceful shutdown timeout in seconds.
    pub shutdown_timeout_secs: u64,

    /// Keep-alive timeout in seconds. None disables keep-alive.
    pub keep_alive_secs: Option<u64>,

    /// Maximum number of concurrent connections. None is unlimited.
    pub max_connections: Option<usize>,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Time allowed to read a request body, in seconds.
    pub body_read_timeout_secs: u64,

    /// PEM certificate chain; set with `tls_key` to serve HTTPS.
    pub tls_cert: Option<PathBuf>,

    /// PEM private key matching `tls_cert`.
    pub tls_key: Option<PathBuf>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            base_url: String::new(),
            app_name: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_SECS * 1000,
            suffixes: DEFAULT_SUFFIXES.iter().map(ToString::to_string).collect(),
            strict_auth: false,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            keep_alive_secs: Some(DEFAULT_KEEP_ALIVE_SECS),
            max_connections: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            body_read_timeout_secs: DEFAULT_BODY_READ_TIMEOUT_SECS,
            tls_cert: None,
            tls_key: None,
        }
    }
}

/// Token bucket rate limiting section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSection {
    /// Install the rate limit stage.
    pub enabled: bool,

    /// Time between refills in milliseconds.
    pub fill_interval_ms: u64,

    /// Maximum number of stored tokens.
    pub capacity: u64,

    /// Tokens added per refill.
    pub quantum: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: false,
            fill_interval_ms: 1000,
            capacity: 100,
            quantum: 100,
        }
    }
}

/// Host overload shedding section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OverloadSection {
    /// Install the overload stage and run the load monitor.
    pub enabled: bool,

    /// CPU usage, in percent, above which requests are shed.
    pub max_cpu_percent: f64,

    /// Memory usage, in percent, above which requests are shed.
    pub max_memory_percent: f64,

    /// Time between samples in seconds.
    pub interval_secs: u64,

    /// Window CPU usage is averaged over, in seconds.
    pub cpu_window_secs: u64,
}

impl Default for OverloadSection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_cpu_percent: 90.0,
            max_memory_percent: 90.0,
            interval_secs: 60,
            cpu_window_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Install a subscriber at all.
    pub enabled: bool,

    /// Filter directives (e.g. `"info,conduit_server=debug"`).
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Log span open and close events.
    pub span_events: bool,

    /// Include file and line.
    pub include_location: bool,

    /// Include thread IDs.
    pub thread_ids: bool,

    /// Include the target (module path).
    pub include_target: bool,

    /// Service name; falls back to `server.app_name`, then `"conduit"`.
    pub service_name: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            span_events: false,
            include_location: false,
            thread_ids: false,
            include_target: true,
            service_name: None,
        }
    }
}
