//! The application object.
//!
//! An [`App`] collects everything a server needs before it starts:
//! dependency constructors, version groups, auth interceptors and the base
//! context function. [`App::build`] resolves and binds it all into a
//! [`Server`]; every configuration fault surfaces there, never per request.
//!
//! # Example
//!
//! ```rust
//! use conduit_core::{ActionSet, Context, JsonResponse, Request, Service, VersionGroup};
//! use conduit_server::{App, ServerConfig};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! struct Clock;
//!
//! #[derive(Deserialize)]
//! struct NowRequest {}
//! impl Request for NowRequest {}
//!
//! #[derive(Serialize)]
//! struct NowResponse { unix: u64 }
//! impl JsonResponse for NowResponse {}
//!
//! struct TimeService { _clock: Arc<Clock> }
//!
//! impl TimeService {
//!     async fn now(self: Arc<Self>, _ctx: Context, _req: NowRequest) -> anyhow::Result<Option<NowResponse>> {
//!         Ok(Some(NowResponse { unix: 0 }))
//!     }
//! }
//!
//! impl Service for TimeService {
//!     fn actions(set: &mut ActionSet<Self>) {
//!         set.action("Now", Self::now);
//!     }
//! }
//!
//! let server = App::new(ServerConfig::default())
//!     .provide(|| Arc::new(Clock))
//!     .map(VersionGroup::new(1).stable(|clock: Arc<Clock>| Arc::new(TimeService { _clock: clock })))
//!     .build()
//!     .unwrap();
//!
//! assert!(server.routes().get("/v1/time/now").is_some());
//! ```

use crate::binder;
use crate::config::ServerConfig;
use crate::pipeline::{ContextFn, Pipeline};
use crate::server::{Server, ServerError};
use conduit_core::{BuildError, Constructor, Context, Naming, ResolveError, Resolver, VersionGroup, VersionGroups};
use conduit_middleware::{AuthPolicy, Interceptor};
use std::sync::Arc;

/// Builder of a Conduit server.
pub struct App {
    config: ServerConfig,
    resolver: Resolver,
    groups: VersionGroups,
    auth: AuthPolicy,
    context_fn: ContextFn,
    deferred: Vec<ResolveError>,
}

impl App {
    /// Creates an application with no services.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            resolver: Resolver::new(),
            groups: VersionGroups::new(),
            auth: AuthPolicy::new(),
            context_fn: Arc::new(Context::background),
            deferred: Vec::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registers a dependency constructor.
    ///
    /// A rejected constructor is reported by [`build`](Self::build).
    #[must_use]
    pub fn provide<C, Deps>(mut self, constructor: C) -> Self
    where
        C: Constructor<Deps>,
        Deps: 'static,
    {
        if let Err(err) = self.resolver.provide(constructor) {
            self.deferred.push(err);
        }
        self
    }

    /// Registers a dependency constructor, failing immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::DuplicateProvider`] or a self-dependency
    /// [`ResolveError::Cycle`].
    pub fn try_provide<C, Deps>(&mut self, constructor: C) -> Result<(), ResolveError>
    where
        C: Constructor<Deps>,
        Deps: 'static,
    {
        self.resolver.provide(constructor)
    }

    /// Mounts a version group.
    ///
    /// # Panics
    ///
    /// Panics with "duplicated major version" when the group's major
    /// version is already mapped.
    #[must_use]
    pub fn map(mut self, group: VersionGroup) -> Self {
        self.groups.insert(group);
        self
    }

    /// Sets the identity interceptor (failures answer `401`).
    #[must_use]
    pub fn identity(mut self, interceptor: impl Interceptor) -> Self {
        self.auth = self.auth.identity(interceptor);
        self
    }

    /// Sets the permission interceptor (failures answer `403`).
    #[must_use]
    pub fn permission(mut self, interceptor: impl Interceptor) -> Self {
        self.auth = self.auth.permission(interceptor);
        self
    }

    /// Sets the function producing the base context of every call.
    #[must_use]
    pub fn context<F>(mut self, context_fn: F) -> Self
    where
        F: Fn() -> Context + Send + Sync + 'static,
    {
        self.context_fn = Arc::new(context_fn);
        self
    }

    /// Returns the dependency resolver.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Resolves every service and binds every route.
    ///
    /// # Errors
    ///
    /// Returns the first rejected constructor, missing dependency, cycle,
    /// discovery failure or route collision, or [`BuildError::NoGroups`].
    pub fn build(self) -> Result<Server, BuildError> {
        if let Some(err) = self.deferred.into_iter().next() {
            return Err(err.into());
        }
        self.resolver.verify()?;

        let naming = Naming::new(self.config.suffixes());
        let routes = binder::bind(&self.groups, &self.resolver, &naming, self.config.base_url())?;
        tracing::info!(routes = routes.len(), groups = self.groups.len(), "application built");

        let auth = self.auth.strict(self.config.strict_auth());
        let pipeline = Pipeline::new(auth, self.context_fn, self.config.request_timeout());
        Ok(Server::new(self.config, routes, pipeline))
    }

    /// Builds the server and serves until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns build failures and bind failures.
    pub async fn run(self) -> Result<(), ServerError> {
        self.build()?.run().await
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("groups", &self.groups.len())
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}
