//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that all global stages
//! implement, and the [`Endpoint`] a chain ends in. Middleware processes
//! requests before they reach the endpoint and responses after it returns.
//!
//! # Example
//!
//! ```
//! use conduit_middleware::{BoxFuture, Middleware, MiddlewareContext, Next, Request, Response};
//!
//! struct LoggingMiddleware;
//!
//! impl Middleware for LoggingMiddleware {
//!     fn name(&self) -> &'static str {
//!         "logging"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             tracing::debug!(request_id = %ctx.request_id(), "request");
//!             let response = next.run(ctx, request).await;
//!             tracing::debug!(status = %response.status(), "response");
//!             response
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{Request, Response};
use std::sync::Arc;

pub use conduit_core::BoxFuture;

/// The core middleware trait.
///
/// Middleware receives a mutable context, the incoming request, and a
/// [`Next`] callback to invoke the rest of the chain. A stage that answers
/// on its own (a rejection, a preflight) simply does not call `next`.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this stage, used in logs.
    fn name(&self) -> &'static str;

    /// Process the request through this middleware.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// The terminal handler of a middleware chain.
pub trait Endpoint: Send + Sync {
    /// Produces the response for a request that passed every stage.
    fn call<'a>(&'a self, ctx: &'a mut MiddlewareContext, request: Request) -> BoxFuture<'a, Response>;
}

/// Callback to invoke the rest of the chain.
///
/// `run` consumes `self`, so the rest of the chain runs at most once.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Creates a chain running `stages` in order, then `endpoint`.
    pub(crate) fn new(stages: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self { stages, endpoint }
    }

    /// Invokes the next middleware, or the endpoint when none is left.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    endpoint: self.endpoint,
                };
                stage.process(ctx, request, next).await
            }
            None => self.endpoint.call(ctx, request).await,
        }
    }
}
