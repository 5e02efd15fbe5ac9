//! Identity and permission checks for non-anonymous actions.
//!
//! An [`AuthPolicy`] holds two optional [`Interceptor`]s that inspect the
//! request headers:
//!
//! - the identity interceptor decides who is calling; a failure answers
//!   `401 Unauthorized`;
//! - the permission interceptor is only consulted once an identity was
//!   established; a failure answers `403 Forbidden`.
//!
//! Without an identity interceptor no check runs, unless the policy is
//! strict, in which case every non-anonymous call is refused with
//! `503 Service Unavailable`.
//!
//! ```
//! use conduit_middleware::auth::{AuthPolicy, InterceptError};
//! use http::HeaderMap;
//!
//! let policy = AuthPolicy::new().identity(|headers: &HeaderMap| {
//!     if headers.contains_key("x-api-key") {
//!         Ok(())
//!     } else {
//!         Err(InterceptError::new("missing api key"))
//!     }
//! });
//!
//! let err = policy.check(&HeaderMap::new()).unwrap_err();
//! assert_eq!(err.status_code(), http::StatusCode::UNAUTHORIZED);
//! ```

use http::{header, HeaderMap, StatusCode};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Why an interceptor refused a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InterceptError {
    message: String,
}

impl InterceptError {
    /// Creates an error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A check over request headers.
pub trait Interceptor: Send + Sync + 'static {
    /// Accepts or refuses the request.
    ///
    /// # Errors
    ///
    /// Returns [`InterceptError`] to refuse the request.
    fn intercept(&self, headers: &HeaderMap) -> Result<(), InterceptError>;
}

impl<F> Interceptor for F
where
    F: Fn(&HeaderMap) -> Result<(), InterceptError> + Send + Sync + 'static,
{
    fn intercept(&self, headers: &HeaderMap) -> Result<(), InterceptError> {
        self(headers)
    }
}

/// Outcome of a refused auth check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The identity interceptor refused the request.
    #[error("unauthenticated: {0}")]
    Unauthenticated(InterceptError),

    /// The permission interceptor refused the request.
    #[error("forbidden: {0}")]
    Forbidden(InterceptError),

    /// Strict auth is on but no identity interceptor is configured.
    #[error("no identity interceptor configured")]
    Misconfigured,
}

impl AuthError {
    /// Returns the HTTP status this error is answered with.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Misconfigured => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Identity and permission interceptors applied to non-anonymous actions.
#[derive(Clone, Default)]
pub struct AuthPolicy {
    identity: Option<Arc<dyn Interceptor>>,
    permission: Option<Arc<dyn Interceptor>>,
    strict: bool,
}

impl AuthPolicy {
    /// Creates a policy with no interceptors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identity interceptor.
    #[must_use]
    pub fn identity(mut self, interceptor: impl Interceptor) -> Self {
        self.identity = Some(Arc::new(interceptor));
        self
    }

    /// Sets the permission interceptor.
    #[must_use]
    pub fn permission(mut self, interceptor: impl Interceptor) -> Self {
        self.permission = Some(Arc::new(interceptor));
        self
    }

    /// Refuses every non-anonymous call while no identity interceptor is set.
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Returns `true` if an identity interceptor is set.
    #[must_use]
    pub const fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    /// Runs the interceptors against `headers`.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] matching the refusing interceptor.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let Some(identity) = &self.identity else {
            return if self.strict {
                Err(AuthError::Misconfigured)
            } else {
                Ok(())
            };
        };

        identity
            .intercept(headers)
            .map_err(AuthError::Unauthenticated)?;

        if let Some(permission) = &self.permission {
            permission.intercept(headers).map_err(AuthError::Forbidden)?;
        }
        Ok(())
    }
}

impl fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPolicy")
            .field("identity", &self.identity.is_some())
            .field("permission", &self.permission.is_some())
            .field("strict", &self.strict)
            .finish()
    }
}

/// Claims carried by bearer tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Tenant the caller belongs to.
    #[serde(rename = "TenantID", default)]
    pub tenant_id: String,
    /// Kind of user.
    #[serde(rename = "UserType", default)]
    pub user_type: String,
    /// Role of the user.
    #[serde(rename = "UserRole", default)]
    pub user_role: String,
    /// User identifier.
    #[serde(rename = "UserID", default)]
    pub user_id: String,
    /// Expiry, in seconds since the Unix epoch.
    pub exp: u64,
    /// Not valid before, in seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

/// Identity interceptor accepting signed bearer tokens.
///
/// Expects `Authorization: Bearer <token>`; the token must be signed with
/// the configured key, not be expired, and be past its `nbf` if it has one.
/// Both time checks allow [`leeway`](Self::leeway) seconds of clock skew
/// (60 by default).
#[derive(Clone)]
pub struct JwtIdentity {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentity {
    /// Accepts HS256 tokens signed with `secret`.
    #[must_use]
    pub fn hs256(secret: &[u8]) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    /// Accepts RS256 tokens verified against a PEM-encoded RSA public key.
    ///
    /// # Errors
    ///
    /// Returns the decoding error if `pem` is not an RSA key.
    pub fn rs256_pem(pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self::with_key(DecodingKey::from_rsa_pem(pem)?, Algorithm::RS256))
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_nbf = true;
        Self { key, validation }
    }

    /// Sets the clock skew tolerated on `exp` and `nbf`, in seconds.
    #[must_use]
    pub fn leeway(mut self, secs: u64) -> Self {
        self.validation.leeway = secs;
        self
    }

    /// Decodes and verifies the bearer token in `headers`.
    ///
    /// # Errors
    ///
    /// Returns [`InterceptError`] when the header is missing or malformed,
    /// or the token fails verification.
    pub fn claims(&self, headers: &HeaderMap) -> Result<JwtClaims, InterceptError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| InterceptError::new("missing authorization header"))?
            .to_str()
            .map_err(|_| InterceptError::new("authorization header is not ASCII"))?;

        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .ok_or_else(|| InterceptError::new("authorization header is not a bearer token"))?;

        decode::<JwtClaims>(token.trim(), &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| InterceptError::new(format!("invalid token: {err}")))
    }
}

impl Interceptor for JwtIdentity {
    fn intercept(&self, headers: &HeaderMap) -> Result<(), InterceptError> {
        self.claims(headers).map(|_| ())
    }
}

impl fmt::Debug for JwtIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtIdentity")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}
