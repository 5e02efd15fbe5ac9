//! Logging setup for Conduit services.
//!
//! Conduit crates emit `tracing` events; this crate installs the subscriber
//! that turns them into output:
//!
//! | Preset | Format | Level | Extras |
//! |--------|--------|-------|--------|
//! | [`LogConfig::production`] | JSON lines | `info` | target |
//! | [`LogConfig::development`] | pretty | `debug` | file/line, span events |
//!
//! # Example
//!
//! ```rust,no_run
//! use conduit_telemetry::{init_logging, LogConfig};
//!
//! fn main() -> Result<(), conduit_telemetry::TelemetryError> {
//!     init_logging(&LogConfig::development())?;
//!     tracing::debug!("ready");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
