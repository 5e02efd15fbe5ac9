//! Services and the actions discovered on them.
//!
//! A service exposes its action methods through [`Service::actions`]. Each
//! action method has the same shape:
//!
//! ```text
//! async fn name(self: Arc<Self>, ctx: Context, req: impl Request)
//!     -> Result<Option<impl Response>, impl Into<ActionError>>
//! ```
//!
//! Methods of any other shape cannot be registered, so helper methods live
//! on the same type without ever becoming routes.
//!
//! # Example
//!
//! ```
//! use conduit_core::{
//!     discover, ActionError, ActionSet, Context, JsonResponse, Naming, Request, Service,
//!     ValidationError,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Deserialize)]
//! struct SumRequest {
//!     x: i64,
//!     y: i64,
//! }
//!
//! impl Request for SumRequest {}
//!
//! #[derive(Serialize)]
//! struct SumResponse {
//!     sum: i64,
//! }
//!
//! impl JsonResponse for SumResponse {}
//!
//! struct DemoService;
//!
//! impl DemoService {
//!     async fn sum(
//!         self: Arc<Self>,
//!         _ctx: Context,
//!         req: SumRequest,
//!     ) -> Result<Option<SumResponse>, ActionError> {
//!         Ok(Some(SumResponse { sum: req.x + req.y }))
//!     }
//! }
//!
//! impl Service for DemoService {
//!     fn actions(set: &mut ActionSet<Self>) {
//!         set.action("Sum", Self::sum);
//!     }
//! }
//!
//! let actions = discover(Arc::new(DemoService), &Naming::default()).unwrap();
//! assert_eq!(actions[0].resource(), "demo");
//! assert_eq!(actions[0].method(), "sum");
//! ```

use crate::context::Context;
use crate::error::ActionError;
use crate::naming::{short_type_name, Naming};
use crate::request::{Request, ValidationError};
use crate::response::{Payload, Response, ResponseKind};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type Invocation = Box<dyn FnOnce(Context) -> BoxFuture<'static, Result<Option<Payload>, ActionError>> + Send>;
type Binder = Arc<dyn Fn(&[u8]) -> Result<PreparedCall, BindError> + Send + Sync>;

/// A type whose methods are exposed as actions.
pub trait Service: Sized + Send + Sync + 'static {
    /// The name routes are derived from.
    ///
    /// Defaults to the last segment of the Rust type name.
    fn type_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// When `true`, routes drop the resource segment: `{prefix}/{method}`.
    fn omitted(&self) -> bool {
        false
    }

    /// When `true`, calls skip identity and permission checks.
    fn anonymous(&self) -> bool {
        false
    }

    /// Registers the service's action methods.
    fn actions(set: &mut ActionSet<Self>);
}

/// Error raised while turning a service into actions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// The type name does not end with a recognized suffix.
    #[error("service `{type_name}` must end with one of: {suffixes}")]
    MissingSuffix {
        /// The service type name.
        type_name: String,
        /// The recognized suffixes, comma separated.
        suffixes: String,
    },

    /// Stripping the suffix left nothing to name the resource.
    #[error("service `{type_name}` has an empty resource name")]
    EmptyResource {
        /// The service type name.
        type_name: String,
    },

    /// An action was registered with a name that has no usable characters.
    #[error("service `{type_name}` registers an action with invalid name `{name}`")]
    InvalidMethodName {
        /// The service type name.
        type_name: String,
        /// The registered name.
        name: String,
    },

    /// Two actions of one service derive the same method name.
    #[error("service `{type_name}` registers `{method}` more than once")]
    DuplicateAction {
        /// The service type name.
        type_name: String,
        /// The derived method name.
        method: String,
    },
}

/// Why a request body was rejected before invocation.
#[derive(Debug, Error)]
pub enum BindError {
    /// The body is not valid JSON for the request type.
    #[error("malformed request body: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The decoded request failed validation.
    #[error("invalid request: {0}")]
    Invalid(#[from] ValidationError),
}

/// A bound and validated call, waiting for its context.
pub struct PreparedCall(Invocation);

impl PreparedCall {
    /// Invokes the action with `ctx`.
    pub fn call(self, ctx: Context) -> BoxFuture<'static, Result<Option<Payload>, ActionError>> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for PreparedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedCall").finish_non_exhaustive()
    }
}

struct Registered {
    name: String,
    kind: ResponseKind,
    binder: Binder,
}

/// Collects the action methods of one service instance.
pub struct ActionSet<S> {
    service: Arc<S>,
    registered: Vec<Registered>,
}

impl<S: Service> ActionSet<S> {
    fn new(service: Arc<S>) -> Self {
        Self {
            service,
            registered: Vec::new(),
        }
    }

    /// Registers an action method under `name`.
    ///
    /// The name is converted to snake case when routes are derived, so both
    /// `"GetFile"` and `"get_file"` produce `get_file`.
    pub fn action<Req, Res, E, F, Fut>(&mut self, name: &str, method: F) -> &mut Self
    where
        Req: Request,
        Res: Response,
        E: Into<ActionError> + 'static,
        F: Fn(Arc<S>, Context, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Res>, E>> + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        let method = Arc::new(method);

        let binder: Binder = Arc::new(move |body: &[u8]| {
            let request = decode::<Req>(body)?;
            request.validate()?;

            let service = Arc::clone(&service);
            let method = Arc::clone(&method);
            let invocation: Invocation = Box::new(move |ctx| {
                Box::pin(async move {
                    match method(service, ctx, request).await {
                        Ok(Some(value)) => value.into_payload().map(Some),
                        Ok(None) => Ok(None),
                        Err(err) => Err(err.into()),
                    }
                })
            });
            Ok(PreparedCall(invocation))
        });

        self.registered.push(Registered {
            name: name.to_string(),
            kind: Res::KIND,
            binder,
        });
        self
    }

    /// Returns the number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// Returns `true` if no action is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}

/// Decodes a JSON body; a blank body decodes as an empty object.
fn decode<Req: Request>(body: &[u8]) -> Result<Req, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_slice(b"{}")
    } else {
        serde_json::from_slice(body)
    }
}

/// One discovered action, ready to be bound to a route.
#[derive(Clone)]
pub struct Action {
    service: &'static str,
    resource: String,
    method: String,
    kind: ResponseKind,
    omitted: bool,
    anonymous: bool,
    binder: Binder,
}

impl Action {
    /// Returns the owning service's type name.
    #[must_use]
    pub const fn service(&self) -> &'static str {
        self.service
    }

    /// Returns the resource segment.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Returns the method segment.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns how results are written.
    #[must_use]
    pub const fn kind(&self) -> ResponseKind {
        self.kind
    }

    /// Returns `true` if routes drop the resource segment.
    #[must_use]
    pub const fn is_omitted(&self) -> bool {
        self.omitted
    }

    /// Returns `true` if calls skip identity and permission checks.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// Returns the route path below a tier prefix.
    #[must_use]
    pub fn relative_path(&self) -> String {
        if self.omitted {
            format!("/{}", self.method)
        } else {
            format!("/{}/{}", self.resource, self.method)
        }
    }

    /// Decodes and validates `body` into a call waiting for its context.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Malformed`] for undecodable bodies and
    /// [`BindError::Invalid`] when validation fails.
    pub fn prepare(&self, body: &[u8]) -> Result<PreparedCall, BindError> {
        (self.binder)(body)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("service", &self.service)
            .field("resource", &self.resource)
            .field("method", &self.method)
            .field("kind", &self.kind)
            .field("omitted", &self.omitted)
            .field("anonymous", &self.anonymous)
            .finish_non_exhaustive()
    }
}

/// Turns a service instance into its actions.
///
/// # Errors
///
/// Fails when the type name lacks a recognized suffix, when nothing is left
/// after stripping it, or when action names are unusable or repeated.
pub fn discover<S: Service>(service: Arc<S>, naming: &Naming) -> Result<Vec<Action>, DiscoveryError> {
    let type_name = S::type_name();
    let resource = naming
        .resource_name(type_name)
        .ok_or_else(|| DiscoveryError::MissingSuffix {
            type_name: type_name.to_string(),
            suffixes: naming.suffixes().join(", "),
        })?;
    if resource.is_empty() {
        return Err(DiscoveryError::EmptyResource {
            type_name: type_name.to_string(),
        });
    }

    let omitted = service.omitted();
    let anonymous = service.anonymous();

    let mut set = ActionSet::new(service);
    S::actions(&mut set);
    if set.is_empty() {
        tracing::warn!(service = type_name, "service registers no actions");
    }

    let mut seen = HashSet::new();
    let mut actions = Vec::with_capacity(set.len());
    for registered in set.registered {
        let method = naming.method_name(&registered.name);
        if method.is_empty() {
            return Err(DiscoveryError::InvalidMethodName {
                type_name: type_name.to_string(),
                name: registered.name,
            });
        }
        if !seen.insert(method.clone()) {
            return Err(DiscoveryError::DuplicateAction {
                type_name: type_name.to_string(),
                method,
            });
        }

        actions.push(Action {
            service: type_name,
            resource: resource.clone(),
            method,
            kind: registered.kind,
            omitted,
            anonymous,
            binder: registered.binder,
        });
    }

    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KnownError;
    use crate::response::{FileStream, JsonResponse};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize)]
    struct SumRequest {
        x: i64,
        y: i64,
    }

    impl Request for SumRequest {
        fn validate(&self) -> Result<(), ValidationError> {
            if self.x < 0 {
                return Err(ValidationError::field("x", "must not be negative"));
            }
            Ok(())
        }
    }

    #[derive(Debug, Serialize)]
    struct SumResponse {
        sum: i64,
    }

    impl JsonResponse for SumResponse {}

    #[derive(Debug, Deserialize)]
    struct Empty {}

    impl Request for Empty {}

    #[derive(Default)]
    struct DemoService {
        calls: AtomicUsize,
    }

    impl DemoService {
        async fn sum(
            self: Arc<Self>,
            _ctx: Context,
            req: SumRequest,
        ) -> Result<Option<SumResponse>, ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(SumResponse { sum: req.x + req.y }))
        }

        async fn find(self: Arc<Self>, _ctx: Context, _req: Empty) -> anyhow::Result<Option<SumResponse>> {
            Ok(None)
        }

        async fn download(
            self: Arc<Self>,
            _ctx: Context,
            _req: Empty,
        ) -> Result<Option<FileStream>, ActionError> {
            Ok(Some(FileStream::from_reader(&b"data"[..], 4)))
        }

        async fn reject(self: Arc<Self>, _ctx: Context, _req: Empty) -> Result<Option<SumResponse>, KnownError> {
            Err(KnownError::new("dup", "already exists"))
        }

        // Not an action: never registered.
        #[allow(dead_code)]
        fn helper(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Service for DemoService {
        fn actions(set: &mut ActionSet<Self>) {
            set.action("Sum", Self::sum)
                .action("find", Self::find)
                .action("Download", Self::download)
                .action("reject", Self::reject);
        }
    }

    struct Plain;

    impl Service for Plain {
        fn actions(_set: &mut ActionSet<Self>) {}
    }

    struct BareService;

    impl Service for BareService {
        fn type_name() -> &'static str {
            "Service"
        }

        fn actions(_set: &mut ActionSet<Self>) {}
    }

    struct TwiceService;

    impl TwiceService {
        async fn ping(self: Arc<Self>, _ctx: Context, _req: Empty) -> Result<Option<SumResponse>, ActionError> {
            Ok(None)
        }
    }

    impl Service for TwiceService {
        fn actions(set: &mut ActionSet<Self>) {
            set.action("Ping", Self::ping).action("ping", Self::ping);
        }
    }

    struct BlankNameService;

    impl BlankNameService {
        async fn ping(self: Arc<Self>, _ctx: Context, _req: Empty) -> Result<Option<SumResponse>, ActionError> {
            Ok(None)
        }
    }

    impl Service for BlankNameService {
        fn actions(set: &mut ActionSet<Self>) {
            set.action("__", Self::ping);
        }
    }

    struct HealthService;

    impl HealthService {
        async fn health(self: Arc<Self>, _ctx: Context, _req: Empty) -> Result<Option<SumResponse>, ActionError> {
            Ok(Some(SumResponse { sum: 0 }))
        }
    }

    impl Service for HealthService {
        fn omitted(&self) -> bool {
            true
        }

        fn anonymous(&self) -> bool {
            true
        }

        fn actions(set: &mut ActionSet<Self>) {
            set.action("health", Self::health);
        }
    }

    fn demo_actions() -> (Arc<DemoService>, Vec<Action>) {
        let service = Arc::new(DemoService::default());
        let actions = discover(Arc::clone(&service), &Naming::default()).unwrap();
        (service, actions)
    }

    fn find<'a>(actions: &'a [Action], method: &str) -> &'a Action {
        actions.iter().find(|a| a.method() == method).unwrap()
    }

    #[test]
    fn test_discover_registered_methods_only() {
        let (_, actions) = demo_actions();
        let mut methods: Vec<&str> = actions.iter().map(Action::method).collect();
        methods.sort_unstable();
        assert_eq!(methods, vec!["download", "find", "reject", "sum"]);
        assert!(actions.iter().all(|a| a.resource() == "demo"));
        assert!(actions.iter().all(|a| a.service() == "DemoService"));
    }

    #[test]
    fn test_discover_response_kinds() {
        let (_, actions) = demo_actions();
        assert_eq!(find(&actions, "sum").kind(), ResponseKind::Json);
        assert_eq!(find(&actions, "download").kind(), ResponseKind::Stream);
    }

    #[test]
    fn test_discover_missing_suffix() {
        let err = discover(Arc::new(Plain), &Naming::default()).unwrap_err();
        assert!(matches!(err, DiscoveryError::MissingSuffix { .. }));
        assert!(err.to_string().contains("service, handler, usecase, controller"));
    }

    #[test]
    fn test_discover_empty_resource() {
        let err = discover(Arc::new(BareService), &Naming::default()).unwrap_err();
        assert!(matches!(err, DiscoveryError::EmptyResource { .. }));
    }

    #[test]
    fn test_discover_duplicate_action() {
        let err = discover(Arc::new(TwiceService), &Naming::default()).unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::DuplicateAction {
                type_name: "TwiceService".to_string(),
                method: "ping".to_string(),
            }
        );
    }

    #[test]
    fn test_discover_invalid_method_name() {
        let err = discover(Arc::new(BlankNameService), &Naming::default()).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidMethodName { .. }));
    }

    #[test]
    fn test_relative_paths() {
        let (_, actions) = demo_actions();
        assert_eq!(find(&actions, "sum").relative_path(), "/demo/sum");

        let health = discover(Arc::new(HealthService), &Naming::default()).unwrap();
        assert_eq!(health[0].relative_path(), "/health");
        assert!(health[0].is_omitted());
        assert!(health[0].is_anonymous());
    }

    #[tokio::test]
    async fn test_prepare_and_call() {
        let (service, actions) = demo_actions();
        let call = find(&actions, "sum").prepare(br#"{"x":1000,"y":500}"#).unwrap();
        let payload = call.call(Context::background()).await.unwrap().unwrap();

        match payload {
            Payload::Json(value) => assert_eq!(value, serde_json::json!({"sum": 1500})),
            Payload::Stream(_) => panic!("expected json"),
        }
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prepare_rejects_invalid_without_invoking() {
        let (service, actions) = demo_actions();
        let err = find(&actions, "sum").prepare(br#"{"x":-1,"y":500}"#).unwrap_err();
        assert!(matches!(err, BindError::Invalid(_)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_prepare_rejects_malformed() {
        let (_, actions) = demo_actions();
        let err = find(&actions, "sum").prepare(b"{not json").unwrap_err();
        assert!(matches!(err, BindError::Malformed(_)));

        let err = find(&actions, "sum").prepare(br#"{"x":"one","y":2}"#).unwrap_err();
        assert!(matches!(err, BindError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_blank_body_binds_empty_object() {
        let (_, actions) = demo_actions();
        let call = find(&actions, "find").prepare(b"  ").unwrap();
        assert!(call.call(Context::background()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_conversion() {
        let (_, actions) = demo_actions();
        let call = find(&actions, "reject").prepare(b"{}").unwrap();
        let err = call.call(Context::background()).await.unwrap_err();
        assert_eq!(err.as_known(), Some(&KnownError::new("dup", "already exists")));
    }

    #[tokio::test]
    async fn test_stream_payload() {
        let (_, actions) = demo_actions();
        let call = find(&actions, "download").prepare(b"{}").unwrap();
        match call.call(Context::background()).await.unwrap().unwrap() {
            Payload::Stream(stream) => assert_eq!(stream.size(), 4),
            Payload::Json(_) => panic!("expected stream"),
        }
    }

    #[test]
    fn test_action_debug() {
        let (_, actions) = demo_actions();
        let debug = format!("{:?}", find(&actions, "sum"));
        assert!(debug.contains("resource: \"demo\""));
        assert!(debug.contains("kind: Json"));
    }
}
