//! Typed configuration for Conduit servers.
//!
//! This crate loads a [`ConduitConfig`] from layered sources and turns it
//! into the runtime configuration of the server
//! ([`ConduitConfig::to_server_config`]) and the logger
//! ([`ConduitConfig::to_log_config`]):
//!
//! - Defaults, or the development/production preset
//! - TOML or JSON files, merged field by field
//! - A `.env` file
//! - `CONDUIT_*` environment variables
//!
//! Unknown fields in files are rejected.
//!
//! # Example
//!
//! ```no_run
//! use conduit_config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("conduit.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix("CONDUIT")
//!     .load()?;
//!
//! conduit_telemetry::init_logging(&config.to_log_config())?;
//! let server_config = config.to_server_config();
//! # let _ = server_config;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! addr = ":8080"
//! base_url = "/api"
//! app_name = "orders"
//! request_timeout_ms = 30000
//! suffixes = ["service", "handler"]
//! strict_auth = true
//! max_body_size = 2097152
//!
//! [rate_limit]
//! enabled = true
//! fill_interval_ms = 1000
//! capacity = 100
//! quantum = 100
//!
//! [overload]
//! enabled = true
//! max_cpu_percent = 90.0
//! max_memory_percent = 90.0
//!
//! [logging]
//! level = "info,conduit_server=debug"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Variables use the format `PREFIX_SECTION__KEY`:
//!
//! - `CONDUIT_SERVER__ADDR=:9000`
//! - `CONDUIT_RATE_LIMIT__ENABLED=true`
//! - `CONDUIT_LOGGING__LEVEL=debug`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::ConduitConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{LogFormat, LoggingSection, OverloadSection, RateLimitSection, ServerSection};
