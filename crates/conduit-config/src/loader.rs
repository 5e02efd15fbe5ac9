//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, `.env` and environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{ConduitConfig, ConfigError, LogFormat};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "CONDUIT";

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, later layers overriding
/// earlier ones field by field:
/// 1. Default values (or a preset)
/// 2. Configuration files (TOML or JSON), in the order given
/// 3. A `.env` file, which only feeds the environment
/// 4. Environment variables named `{PREFIX}_{SECTION}__{KEY}`
///
/// # Example
///
/// ```no_run
/// use conduit_config::ConfigLoader;
///
/// # fn main() -> Result<(), conduit_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("conduit.toml")?
///     .with_dotenv()?
///     .with_env_prefix("CONDUIT")
///     .load()?;
///
/// println!("Server will listen on: {}", config.server.addr);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: ConduitConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ConduitConfig::default(),
            env_prefix: None,
        }
    }

    /// Reset to the default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = ConduitConfig::default();
        self
    }

    /// Reset to the development preset.
    ///
    /// ```
    /// use conduit_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = ConduitConfig::development();
        self
    }

    /// Reset to the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = ConduitConfig::production();
        self
    }

    /// Merge a configuration file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing or unreadable, does not
    /// parse, or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::missing_file(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::unreadable(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some(format @ ("toml" | "json")) => self.with_string(&content, format),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Merge a configuration file if it exists.
    ///
    /// # Errors
    ///
    /// Same as [`with_file`](Self::with_file) for an existing file.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merge configuration from a string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or `format` is neither
    /// `"toml"` nor `"json"`.
    ///
    /// # Example
    ///
    /// ```
    /// use conduit_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\naddr = \"127.0.0.1:3000\"", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.addr, "127.0.0.1:3000");
    /// assert_eq!(config.server.request_timeout_ms, 30_000);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        // Parse into the typed config first so errors point at the source.
        let overlay: Value = match format.to_lowercase().as_str() {
            "toml" => {
                toml::from_str::<ConduitConfig>(content)?;
                toml::from_str(content)?
            }
            "json" => {
                serde_json::from_str::<ConduitConfig>(content)?;
                serde_json::from_str(content)?
            }
            _ => return Err(ConfigError::UnsupportedFormat(format.to_string())),
        };

        let mut base = serde_json::to_value(&self.config)?;
        merge(&mut base, overlay);
        self.config = serde_json::from_value(base)?;
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// With prefix `CONDUIT`, `CONDUIT_SERVER__ADDR=:9000` sets
    /// `server.addr`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load `.env` from the current directory or its parents, if any.
    ///
    /// Variables already set in the environment win.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dotenv`] if a `.env` file exists but cannot
    /// be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(err) if err.not_found() => Ok(self),
            Err(err) => Err(err.into()),
        }
    }

    /// Load a specific `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dotenv`] if the file is missing or cannot
    /// be parsed.
    pub fn with_dotenv_path<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Ok(self)
    }

    /// Apply overrides from explicit key/value pairs, as if they were
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvVar`] for a value of the wrong type.
    pub fn with_env_vars<I, K, V>(mut self, prefix: &str, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let prefix = prefix.to_uppercase();
        for (key, value) in vars {
            self.apply_env_var(key.as_ref(), value.as_ref(), &prefix)?;
        }
        Ok(self)
    }

    /// Apply environment overrides, if a prefix was set, and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable does not parse or
    /// validation fails.
    pub fn load(mut self) -> Result<ConduitConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self = self.with_env_vars(&prefix, env::vars())?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> ConduitConfig {
        self.config
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix('_')) else {
            return Ok(());
        };

        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            // Server section
            ["SERVER", "ADDR"] => config.server.addr = value.to_string(),
            ["SERVER", "BASE_URL"] => config.server.base_url = value.to_string(),
            ["SERVER", "APP_NAME"] => config.server.app_name = non_empty(value),
            ["SERVER", "REQUEST_TIMEOUT_MS"] => config.server.request_timeout_ms = parse_number(key, value)?,
            ["SERVER", "SUFFIXES"] => {
                config.server.suffixes = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect();
            }
            ["SERVER", "STRICT_AUTH"] => config.server.strict_auth = parse_flag(key, value)?,
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "KEEP_ALIVE_SECS"] => config.server.keep_alive_secs = parse_optional(key, value)?,
            ["SERVER", "MAX_CONNECTIONS"] => config.server.max_connections = parse_optional(key, value)?,
            ["SERVER", "MAX_BODY_SIZE"] => config.server.max_body_size = parse_number(key, value)?,
            ["SERVER", "BODY_READ_TIMEOUT_SECS"] => {
                config.server.body_read_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "TLS_CERT"] => config.server.tls_cert = non_empty(value).map(PathBuf::from),
            ["SERVER", "TLS_KEY"] => config.server.tls_key = non_empty(value).map(PathBuf::from),

            // Rate limit section
            ["RATE_LIMIT", "ENABLED"] => config.rate_limit.enabled = parse_flag(key, value)?,
            ["RATE_LIMIT", "FILL_INTERVAL_MS"] => config.rate_limit.fill_interval_ms = parse_number(key, value)?,
            ["RATE_LIMIT", "CAPACITY"] => config.rate_limit.capacity = parse_number(key, value)?,
            ["RATE_LIMIT", "QUANTUM"] => config.rate_limit.quantum = parse_number(key, value)?,

            // Overload section
            ["OVERLOAD", "ENABLED"] => config.overload.enabled = parse_flag(key, value)?,
            ["OVERLOAD", "MAX_CPU_PERCENT"] => config.overload.max_cpu_percent = parse_number(key, value)?,
            ["OVERLOAD", "MAX_MEMORY_PERCENT"] => config.overload.max_memory_percent = parse_number(key, value)?,
            ["OVERLOAD", "INTERVAL_SECS"] => config.overload.interval_secs = parse_number(key, value)?,
            ["OVERLOAD", "CPU_WINDOW_SECS"] => config.overload.cpu_window_secs = parse_number(key, value)?,

            // Logging section
            ["LOGGING", "ENABLED"] => config.logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_var(key, "`json` or `pretty`")),
                };
            }
            ["LOGGING", "SPAN_EVENTS"] => config.logging.span_events = parse_flag(key, value)?,
            ["LOGGING", "INCLUDE_LOCATION"] => config.logging.include_location = parse_flag(key, value)?,
            ["LOGGING", "THREAD_IDS"] => config.logging.thread_ids = parse_flag(key, value)?,
            ["LOGGING", "INCLUDE_TARGET"] => config.logging.include_target = parse_flag(key, value)?,
            ["LOGGING", "SERVICE_NAME"] => config.logging.service_name = non_empty(value),

            // Unknown keys under the prefix are left alone.
            _ => {}
        }

        Ok(())
    }
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_var(key, "a boolean"))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_var(key, "a number"))
}

fn parse_optional<T: std::str::FromStr>(key: &str, value: &str) -> Result<Option<T>, ConfigError> {
    if value.eq_ignore_ascii_case("none") || value.is_empty() {
        Ok(None)
    } else {
        parse_number(key, value).map(Some)
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
