//! Errors raised while layering configuration.
//!
//! Each variant belongs to one layer of [`ConfigLoader`](crate::ConfigLoader):
//! a TOML or JSON file, a `.env` file, the `CONDUIT_*` variables, or the
//! final validation of the merged result.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by [`ConfigLoader`](crate::ConfigLoader).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required file layer does not exist.
    #[error("config file {} does not exist", path.display())]
    MissingFile {
        /// The missing file.
        path: PathBuf,
    },

    /// A file layer exists but could not be read.
    #[error("cannot read config file {}: {source}", path.display())]
    Unreadable {
        /// The file.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A file layer is neither TOML nor JSON.
    #[error("unsupported config format `{0}`; expected toml or json")]
    UnsupportedFormat(String),

    /// A TOML layer does not fit the schema.
    #[error("bad TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// A JSON layer does not fit the schema.
    #[error("bad JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// A `.env` file exists but could not be loaded.
    #[error("bad .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// A prefixed variable such as `CONDUIT_SERVER__MAX_BODY_SIZE` holds
    /// the wrong kind of value.
    #[error("{var} must be {expected}")]
    EnvVar {
        /// The variable name.
        var: String,
        /// What the variable should hold.
        expected: &'static str,
    },

    /// The merged configuration breaks a constraint.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted path of the field, e.g. `server.addr`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn missing_file(path: impl Into<PathBuf>) -> Self {
        Self::MissingFile { path: path.into() }
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn env_var(var: impl Into<String>, expected: &'static str) -> Self {
        Self::EnvVar {
            var: var.into(),
            expected,
        }
    }

    /// Reports `field` as invalid.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns the dotted field or variable name the error points at, if
    /// any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::EnvVar { var, .. } => Some(var),
            Self::InvalidValue { field, .. } => Some(field),
            _ => None,
        }
    }
}
