//! Error types for Conduit.
//!
//! Errors fall in three groups:
//!
//! | Group | Type | Surfaced |
//! |---|---|---|
//! | Configuration | [`BuildError`] | while the application is built |
//! | Business | [`KnownError`] | `409 Conflict` with a structured body |
//! | Everything returned by an action | [`ActionError`] | 409, 504 or a masked 500 |

use crate::action::DiscoveryError;
use crate::resolver::ResolveError;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An expected business failure reported to the client.
///
/// Equality is by value: two independently built errors with the same
/// status and message are equal.
///
/// # Example
///
/// ```
/// use conduit_core::KnownError;
///
/// let a = KnownError::new("dup", "already exists");
/// let b = KnownError::new("dup", "already exists");
/// assert_eq!(a, b);
/// assert_eq!(
///     serde_json::to_string(&a).unwrap(),
///     r#"{"status":"dup","message":"already exists"}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[error("[Status] {status} [Message] {message}")]
pub struct KnownError {
    /// Machine-readable status string chosen by the application.
    pub status: String,
    /// Human-readable message.
    pub message: String,
}

impl KnownError {
    /// Creates a known error.
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }
}

/// Error returned by an action.
///
/// Actions may return any `E: Into<ActionError>`; `anyhow::Error`,
/// [`KnownError`] and tokio's `Elapsed` convert directly.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A business failure, answered with `409 Conflict`.
    #[error(transparent)]
    Known(#[from] KnownError),

    /// The call outlived its context deadline, answered with `504`.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Any other failure. Logged and answered with a bare `500`.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ActionError {
    /// Creates a known error.
    pub fn known(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Known(KnownError::new(status, message))
    }

    /// Wraps any error as an internal failure.
    pub fn internal(error: impl Into<anyhow::Error>) -> Self {
        Self::Internal(error.into())
    }

    /// Returns the business error carried by this error, if any.
    ///
    /// Internal errors are searched along their source chain, so a
    /// [`KnownError`] wrapped with `anyhow::Context` is still recognized.
    #[must_use]
    pub fn as_known(&self) -> Option<&KnownError> {
        match self {
            Self::Known(known) => Some(known),
            Self::DeadlineExceeded => None,
            Self::Internal(error) => error.chain().find_map(|e| e.downcast_ref::<KnownError>()),
        }
    }

    /// Returns `true` if this error reports an expired deadline.
    #[must_use]
    pub fn is_deadline_exceeded(&self) -> bool {
        match self {
            Self::DeadlineExceeded => true,
            Self::Known(_) => false,
            Self::Internal(error) => error
                .chain()
                .any(|e| e.is::<tokio::time::error::Elapsed>()),
        }
    }

    /// Returns the HTTP status this error is answered with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.is_deadline_exceeded() {
            StatusCode::GATEWAY_TIMEOUT
        } else if self.as_known().is_some() {
            StatusCode::CONFLICT
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<tokio::time::error::Elapsed> for ActionError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::DeadlineExceeded
    }
}

/// Configuration fault detected while building the route table.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A service or one of its dependencies could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A service could not be turned into actions.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Two actions derived the same route.
    #[error("route `{path}` is bound by both `{first}` and `{second}`")]
    RouteCollision {
        /// The colliding path.
        path: String,
        /// The service that bound the path first.
        first: String,
        /// The service that tried to bind it again.
        second: String,
    },

    /// No version group was mapped.
    #[error("no version group mapped")]
    NoGroups,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    #[test]
    fn test_known_error_value_equality() {
        let a = KnownError::new("dup", "already exists");
        let b = KnownError::new(String::from("dup"), String::from("already exists"));
        assert_eq!(a, b);
        assert_ne!(a, KnownError::new("dup", "other"));
        assert_ne!(a, KnownError::new("other", "already exists"));
    }

    #[test]
    fn test_known_error_display() {
        let err = KnownError::new("dup", "already exists");
        assert_eq!(err.to_string(), "[Status] dup [Message] already exists");
    }

    #[test]
    fn test_known_error_serialization() {
        let err = KnownError::new("dup", "already exists");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "dup", "message": "already exists"})
        );
    }

    #[test]
    fn test_action_error_status_codes() {
        assert_eq!(
            ActionError::known("dup", "already exists").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ActionError::DeadlineExceeded.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ActionError::internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_known_error_found_in_chain() {
        let wrapped: anyhow::Result<()> =
            Err(KnownError::new("dup", "already exists")).context("creating user");
        let err = ActionError::from(wrapped.unwrap_err());

        assert_eq!(err.as_known(), Some(&KnownError::new("dup", "already exists")));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_elapsed_maps_to_deadline() {
        async fn elapsed() -> tokio::time::error::Elapsed {
            tokio::time::timeout(
                std::time::Duration::from_millis(1),
                std::future::pending::<()>(),
            )
            .await
            .unwrap_err()
        }

        let direct = ActionError::from(elapsed().await);
        assert!(direct.is_deadline_exceeded());

        let wrapped = ActionError::internal(elapsed().await);
        assert!(wrapped.is_deadline_exceeded());
        assert_eq!(wrapped.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_build_error_display() {
        let err = BuildError::RouteCollision {
            path: "/v1/demo/sum".to_string(),
            first: "DemoService".to_string(),
            second: "DemoHandler".to_string(),
        };
        assert!(err.to_string().contains("/v1/demo/sum"));
        assert!(err.to_string().contains("DemoHandler"));
    }
}
