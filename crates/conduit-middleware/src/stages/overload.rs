//! Load shedding middleware.
//!
//! While the shared [`OverloadFlag`] is raised every request is answered
//! with `503 Service Unavailable` before any other work is done. The flag is
//! written by the [`LoadMonitor`](crate::monitor::LoadMonitor).

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use http::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "host is overloaded" flag.
///
/// One writer (the load monitor) and any number of readers.
#[derive(Debug, Clone, Default)]
pub struct OverloadFlag(Arc<AtomicBool>);

impl OverloadFlag {
    /// Creates a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while the host is overloaded.
    #[must_use]
    pub fn is_overloaded(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Raises or lowers the flag.
    pub fn set(&self, overloaded: bool) {
        self.0.store(overloaded, Ordering::Release);
    }
}

/// Rejects requests with `503` while the flag is raised.
#[derive(Debug, Clone)]
pub struct OverloadMiddleware {
    flag: OverloadFlag,
}

impl OverloadMiddleware {
    /// Creates a middleware reading `flag`.
    #[must_use]
    pub const fn new(flag: OverloadFlag) -> Self {
        Self { flag }
    }

    /// Returns the flag this middleware reads.
    #[must_use]
    pub const fn flag(&self) -> &OverloadFlag {
        &self.flag
    }
}

impl Middleware for OverloadMiddleware {
    fn name(&self) -> &'static str {
        "overload"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if self.flag.is_overloaded() {
                tracing::warn!(request_id = %ctx.request_id(), "shedding load");
                return Response::empty(StatusCode::SERVICE_UNAVAILABLE);
            }
            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Chain, Stage};
    use crate::middleware::tests::{request, EchoPath};

    #[test]
    fn test_flag_shared_between_clones() {
        let flag = OverloadFlag::new();
        let reader = flag.clone();
        assert!(!reader.is_overloaded());

        flag.set(true);
        assert!(reader.is_overloaded());

        flag.set(false);
        assert!(!reader.is_overloaded());
    }

    #[tokio::test]
    async fn test_middleware_follows_flag() {
        let flag = OverloadFlag::new();
        let chain = Chain::builder()
            .stage(Stage::Overload, OverloadMiddleware::new(flag.clone()))
            .build();

        let response = chain
            .process(&mut MiddlewareContext::new(), request(http::Method::GET, "/"), &EchoPath)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        flag.set(true);
        let response = chain
            .process(&mut MiddlewareContext::new(), request(http::Method::GET, "/"), &EchoPath)
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
