//! The request capability.

use serde::de::DeserializeOwned;
use thiserror::Error;

/// A payload an action accepts.
///
/// Requests are decoded from the JSON body and then validated. A failing
/// [`Request::validate`] answers `400 Bad Request` and the action is never
/// invoked.
///
/// # Example
///
/// ```
/// use conduit_core::{Request, ValidationError};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct SumRequest {
///     x: i64,
///     y: i64,
/// }
///
/// impl Request for SumRequest {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.x < 0 {
///             return Err(ValidationError::field("x", "must not be negative"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Request: DeserializeOwned + Send + 'static {
    /// Checks business-level constraints on the decoded payload.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// A request that failed [`Request::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render(.field, .message))]
pub struct ValidationError {
    field: Option<String>,
    message: String,
}

fn render(field: &Option<String>, message: &str) -> String {
    match field {
        Some(field) => format!("{field}: {message}"),
        None => message.to_string(),
    }
}

impl ValidationError {
    /// Creates an error about the request as a whole.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    /// Creates an error about one field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Returns the offending field, if any.
    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
