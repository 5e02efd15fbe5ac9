//! Main configuration types.
//!
//! This module provides the top-level [`ConduitConfig`] struct and its
//! conversions into the runtime configuration of the server and logger.

use crate::{ConfigError, LogFormat, LoggingSection, OverloadSection, RateLimitSection, ServerSection};
use conduit_middleware::stages::RateLimitConfig;
use conduit_middleware::OverloadConfig;
use conduit_server::{ServerConfig, TlsConfig};
use conduit_telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete Conduit server configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use conduit_config::ConduitConfig;
///
/// let config = ConduitConfig::default();
/// assert_eq!(config.server.addr, "0.0.0.0:8080");
/// assert!(config.to_server_config().rate_limit().is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConduitConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerSection,

    /// Rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitSection,

    /// Overload shedding.
    #[serde(default)]
    pub overload: OverloadSection,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ConduitConfig {
    /// Development preset: pretty `debug` logs.
    ///
    /// ```
    /// use conduit_config::{ConduitConfig, LogFormat};
    ///
    /// let config = ConduitConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert_eq!(config.logging.format, LogFormat::Pretty);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.include_location = true;
        config.logging.span_events = true;
        config
    }

    /// Production preset: JSON `info` logs and strict auth.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.server.strict_auth = true;
        config
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        self.to_server_config()
            .socket_addr()
            .map_err(|e| ConfigError::invalid_value("server.addr", format!("{}: {e}", server.addr)))?;

        if server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value("server.request_timeout_ms", "must be positive"));
        }
        if server.max_body_size == 0 {
            return Err(ConfigError::invalid_value("server.max_body_size", "must be positive"));
        }
        if server.body_read_timeout_secs == 0 {
            return Err(ConfigError::invalid_value("server.body_read_timeout_secs", "must be positive"));
        }
        if server.max_connections == Some(0) {
            return Err(ConfigError::invalid_value("server.max_connections", "must be positive when set"));
        }
        if server.tls_cert.is_some() != server.tls_key.is_some() {
            return Err(ConfigError::invalid_value("server.tls_key", "tls_cert and tls_key must be set together"));
        }
        if server.suffixes.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::invalid_value("server.suffixes", "at least one suffix is required"));
        }

        if self.rate_limit.enabled {
            let rate_limit = &self.rate_limit;
            if rate_limit.fill_interval_ms == 0 {
                return Err(ConfigError::invalid_value("rate_limit.fill_interval_ms", "must be positive"));
            }
            if rate_limit.capacity == 0 {
                return Err(ConfigError::invalid_value("rate_limit.capacity", "must be positive"));
            }
            if rate_limit.quantum == 0 {
                return Err(ConfigError::invalid_value("rate_limit.quantum", "must be positive"));
            }
        }

        if self.overload.enabled {
            let overload = &self.overload;
            for (field, value) in [
                ("overload.max_cpu_percent", overload.max_cpu_percent),
                ("overload.max_memory_percent", overload.max_memory_percent),
            ] {
                if !(value > 0.0 && value <= 100.0) {
                    return Err(ConfigError::invalid_value(field, "must be in (0, 100]"));
                }
            }
            if overload.interval_secs == 0 {
                return Err(ConfigError::invalid_value("overload.interval_secs", "must be positive"));
            }
            if overload.cpu_window_secs == 0 {
                return Err(ConfigError::invalid_value("overload.cpu_window_secs", "must be positive"));
            }
        }

        if self.logging.enabled {
            conduit_telemetry::create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        Ok(())
    }

    /// Builds the server configuration.
    #[must_use]
    pub fn to_server_config(&self) -> ServerConfig {
        let server = &self.server;
        let mut builder = ServerConfig::builder()
            .addr(server.addr.clone())
            .base_url(&server.base_url)
            .request_timeout(Duration::from_millis(server.request_timeout_ms))
            .suffixes(server.suffixes.iter().map(String::as_str))
            .strict_auth(server.strict_auth)
            .rate_limit(self.rate_limit_config())
            .overload(self.overload_config())
            .shutdown_timeout(Duration::from_secs(server.shutdown_timeout_secs))
            .keep_alive_timeout(server.keep_alive_secs.map(Duration::from_secs))
            .max_connections(server.max_connections)
            .max_body_size(server.max_body_size)
            .body_read_timeout(Duration::from_secs(server.body_read_timeout_secs))
            .tls(self.tls_config());

        if let Some(name) = &server.app_name {
            builder = builder.app_name(name.clone());
        }
        builder.build()
    }

    /// Builds the logging configuration.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        let logging = &self.logging;
        let service_name = logging
            .service_name
            .clone()
            .or_else(|| self.server.app_name.clone())
            .unwrap_or_else(|| "conduit".to_string());

        LogConfig {
            enabled: logging.enabled,
            level: logging.level.clone(),
            json_format: logging.format == LogFormat::Json,
            span_events: logging.span_events,
            file_line_info: logging.include_location,
            thread_ids: logging.thread_ids,
            include_target: logging.include_target,
            service_name,
        }
    }

    fn tls_config(&self) -> Option<TlsConfig> {
        match (&self.server.tls_cert, &self.server.tls_key) {
            (Some(cert), Some(key)) => Some(TlsConfig::new(cert, key)),
            _ => None,
        }
    }

    fn rate_limit_config(&self) -> Option<RateLimitConfig> {
        self.rate_limit.enabled.then(|| RateLimitConfig {
            fill_interval: Duration::from_millis(self.rate_limit.fill_interval_ms),
            capacity: self.rate_limit.capacity,
            quantum: self.rate_limit.quantum,
        })
    }

    fn overload_config(&self) -> Option<OverloadConfig> {
        self.overload.enabled.then(|| OverloadConfig {
            max_cpu_percent: self.overload.max_cpu_percent,
            max_memory_percent: self.overload.max_memory_percent,
            interval: Duration::from_secs(self.overload.interval_secs),
            cpu_window: Duration::from_secs(self.overload.cpu_window_secs),
        })
    }
}
