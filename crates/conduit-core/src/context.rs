//! Per-call context handed to actions.
//!
//! Every invocation receives a fresh [`Context`] carrying the request
//! identifier, the deadline the call must finish by, and a bag of values
//! inherited from the application's base context.

use crate::error::ActionError;
use http::Extensions;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps request identifiers sortable in logs.
///
/// # Example
///
/// ```
/// use conduit_core::RequestId;
///
/// let id = RequestId::new();
/// assert_eq!(id.to_string().len(), 36);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Execution context of one action call.
///
/// A context starts empty ([`Context::background`]) or from the
/// application's base context, and the request pipeline tags it with a
/// request ID and a deadline before handing it to the action.
///
/// # Example
///
/// ```
/// use conduit_core::{Context, RequestId};
/// use std::time::Duration;
///
/// #[derive(Clone)]
/// struct Tenant(&'static str);
///
/// let ctx = Context::background()
///     .with_value(Tenant("acme"))
///     .with_request_id(RequestId::new())
///     .with_timeout(Duration::from_secs(30));
///
/// assert_eq!(ctx.value::<Tenant>().map(|t| t.0), Some("acme"));
/// assert!(ctx.deadline().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    request_id: Option<RequestId>,
    deadline: Option<Instant>,
    values: Extensions,
}

impl Context {
    /// Returns an empty context: no request ID, no deadline, no values.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns the request ID, if the context was tagged with one.
    #[must_use]
    pub const fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    /// Returns a context tagged with `request_id`.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns a context bounded by `deadline`.
    ///
    /// An existing earlier deadline is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Returns a context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns the time left before the deadline.
    ///
    /// `None` means the context has no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Stores a value, replacing any previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) {
        self.values.insert(value);
    }

    /// Returns a context carrying `value`.
    #[must_use]
    pub fn with_value<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.values.insert(value);
        self
    }

    /// Returns the stored value of type `T`.
    #[must_use]
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }

    /// Drives `future` to completion unless the deadline passes first.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::DeadlineExceeded`] when the deadline passes
    /// before `future` completes.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, ActionError> {
        match self.deadline {
            Some(deadline) => Ok(tokio::time::timeout_at(deadline, future).await?),
            None => Ok(future.await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_request_id_display_is_uuid() {
        let id = RequestId::new();
        let parsed = Uuid::parse_str(&id.to_string()).unwrap();
        assert_eq!(&parsed, id.as_uuid());
    }

    #[test]
    fn test_request_id_serializes_transparently() {
        let id = RequestId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn test_background_is_empty() {
        let ctx = Context::background();
        assert!(ctx.request_id().is_none());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(!ctx.is_expired());
    }

    #[test]
    fn test_values() {
        #[derive(Clone, Debug, PartialEq)]
        struct UserId(u64);

        let mut ctx = Context::background();
        assert!(ctx.value::<UserId>().is_none());

        ctx.insert(UserId(7));
        assert_eq!(ctx.value::<UserId>(), Some(&UserId(7)));

        let ctx = ctx.with_value(UserId(8));
        assert_eq!(ctx.value::<UserId>(), Some(&UserId(8)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_earliest() {
        let ctx = Context::background()
            .with_timeout(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(30));

        let remaining = ctx.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        assert!(!ctx.is_expired());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_within_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let value = ctx.run(async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_past_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let err = ctx
            .run(tokio::time::sleep(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(err.is_deadline_exceeded());
    }

    #[tokio::test]
    async fn test_run_without_deadline() {
        let ctx = Context::background();
        assert_eq!(ctx.run(async { "done" }).await.unwrap(), "done");
    }
}
