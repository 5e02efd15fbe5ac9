//! Fixed-order global middleware chain.
//!
//! Every request passes the same stages in the same order before it is
//! routed:
//!
//! 1. **Overload** - reject with `503` while the host is overloaded
//! 2. **Rate limit** - reject with `429` when the token bucket is empty
//! 3. **CORS** - answer preflight requests, tag responses
//! 4. **Compression** - gzip response bodies for clients that accept it
//!
//! Stages are optional, but their relative order is not: the builder sorts
//! them by [`Stage`] regardless of insertion order.

use crate::context::MiddlewareContext;
use crate::middleware::{Endpoint, Middleware, Next};
use crate::types::{Request, Response};
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Position of a stage in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Load shedding.
    Overload = 1,
    /// Token bucket.
    RateLimit = 2,
    /// Cross-origin headers and preflight.
    Cors = 3,
    /// Response compression.
    Compression = 4,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Overload => "overload",
            Self::RateLimit => "rate_limit",
            Self::Cors => "cors",
            Self::Compression => "compression",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Overload, Self::RateLimit, Self::Cors, Self::Compression]
    }
}

/// The global middleware chain.
///
/// # Example
///
/// ```
/// use conduit_middleware::chain::{Chain, Stage};
/// use conduit_middleware::stages::{CompressionMiddleware, CorsMiddleware};
///
/// let chain = Chain::builder()
///     .stage(Stage::Compression, CompressionMiddleware::new())
///     .stage(Stage::Cors, CorsMiddleware::allow_all())
///     .build();
///
/// assert_eq!(chain.stage_names(), vec!["cors", "compression"]);
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    stages: Vec<BoxedMiddleware>,
}

impl Chain {
    /// Creates a new chain builder.
    #[must_use]
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// Runs a request through every stage, then `endpoint`.
    pub async fn process(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        endpoint: &dyn Endpoint,
    ) -> Response {
        Next::new(&self.stages, endpoint).run(ctx, request).await
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for constructing a [`Chain`].
#[derive(Default)]
pub struct ChainBuilder {
    stages: Vec<(Stage, BoxedMiddleware)>,
}

impl ChainBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a middleware at `stage`, replacing any previous one there.
    #[must_use]
    pub fn stage<M: Middleware>(self, stage: Stage, middleware: M) -> Self {
        self.stage_arc(stage, Arc::new(middleware))
    }

    /// Adds a shared middleware at `stage`, replacing any previous one there.
    #[must_use]
    pub fn stage_arc(mut self, stage: Stage, middleware: BoxedMiddleware) -> Self {
        self.stages.retain(|(s, _)| *s != stage);
        self.stages.push((stage, middleware));
        self
    }

    /// Builds the chain in stage order.
    #[must_use]
    pub fn build(mut self) -> Chain {
        self.stages.sort_by_key(|(stage, _)| *stage);
        Chain {
            stages: self.stages.into_iter().map(|(_, mw)| mw).collect(),
        }
    }
}
