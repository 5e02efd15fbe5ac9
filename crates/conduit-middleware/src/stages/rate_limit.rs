//! Token-bucket rate limiting middleware.
//!
//! One bucket is shared by every request. It starts full; every
//! `fill_interval` it gains `quantum` tokens, never exceeding `capacity`.
//! A request takes one token or is rejected with `429 Too Many Requests`
//! and a `Retry-After` header counting the seconds to the next refill.
//!
//! ```
//! use conduit_middleware::stages::{RateLimitConfig, TokenBucket};
//! use std::time::Duration;
//!
//! let bucket = TokenBucket::new(RateLimitConfig {
//!     fill_interval: Duration::from_secs(1),
//!     capacity: 2,
//!     quantum: 1,
//! });
//!
//! assert!(bucket.try_take());
//! assert!(bucket.try_take());
//! assert!(!bucket.try_take());
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use http::{header, HeaderValue, StatusCode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Time between refills. Must be non-zero.
    pub fill_interval: Duration,
    /// Maximum number of stored tokens.
    pub capacity: u64,
    /// Tokens added per refill.
    pub quantum: u64,
}

impl RateLimitConfig {
    /// Allows `per_second` requests per second with bursts of the same size.
    #[must_use]
    pub const fn per_second(per_second: u64) -> Self {
        Self {
            fill_interval: Duration::from_secs(1),
            capacity: per_second,
            quantum: per_second,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    available: u64,
    latest_tick: u64,
}

/// A token bucket refilled in discrete ticks.
#[derive(Debug)]
pub struct TokenBucket {
    config: RateLimitConfig,
    start: Instant,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let config = RateLimitConfig {
            fill_interval: config.fill_interval.max(Duration::from_nanos(1)),
            ..config
        };
        Self {
            config,
            start: Instant::now(),
            state: Mutex::new(BucketState {
                available: config.capacity,
                latest_tick: 0,
            }),
        }
    }

    /// Returns the bucket parameters.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn tick(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.start).as_nanos();
        let interval = self.config.fill_interval.as_nanos();
        u64::try_from(elapsed / interval).unwrap_or(u64::MAX)
    }

    fn refill(&self, state: &mut BucketState, tick: u64) {
        let ticks = tick.saturating_sub(state.latest_tick);
        state.latest_tick = tick;
        state.available = state
            .available
            .saturating_add(ticks.saturating_mul(self.config.quantum))
            .min(self.config.capacity);
    }

    /// Takes one token if available.
    pub fn try_take(&self) -> bool {
        let tick = self.tick(Instant::now());
        let mut state = self.state.lock();
        self.refill(&mut state, tick);
        if state.available == 0 {
            return false;
        }
        state.available -= 1;
        true
    }

    /// Returns the tokens currently available.
    #[must_use]
    pub fn available(&self) -> u64 {
        let tick = self.tick(Instant::now());
        let mut state = self.state.lock();
        self.refill(&mut state, tick);
        state.available
    }

    /// Returns the time until the next refill.
    #[must_use]
    pub fn until_next_refill(&self) -> Duration {
        let now = Instant::now();
        let next_tick = self.tick(now).saturating_add(1);
        let interval = self.config.fill_interval;
        let next = u32::try_from(next_tick)
            .ok()
            .and_then(|n| interval.checked_mul(n))
            .unwrap_or(Duration::MAX);
        next.saturating_sub(now.saturating_duration_since(self.start))
    }
}

/// Rejects requests with `429` once the shared bucket is empty.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    bucket: Arc<TokenBucket>,
}

impl RateLimitMiddleware {
    /// Creates a middleware with a fresh, full bucket.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Arc::new(TokenBucket::new(config)),
        }
    }

    /// Returns the shared bucket.
    #[must_use]
    pub fn bucket(&self) -> &Arc<TokenBucket> {
        &self.bucket
    }

    fn too_many_requests(&self) -> Response {
        let wait = self.bucket.until_next_refill();
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        let mut response = Response::empty(StatusCode::TOO_MANY_REQUESTS);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        response
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if !self.bucket.try_take() {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    path = %request.uri().path(),
                    "rate limit exceeded"
                );
                return self.too_many_requests();
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

    fn config(capacity: u64, quantum: u64) -> RateLimitConfig {
        RateLimitConfig {
            fill_interval: Duration::from_secs(1),
            capacity,
            quantum,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_starts_full() {
        let bucket = TokenBucket::new(config(3, 1));
        assert_eq!(bucket.available(), 3);
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(!bucket.try_take());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_refills_by_quantum() {
        let bucket = TokenBucket::new(config(10, 2));
        for _ in 0..10 {
            assert!(bucket.try_take());
        }
        assert_eq!(bucket.available(), 0);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(bucket.available(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(bucket.available(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_capped_at_capacity() {
        let bucket = TokenBucket::new(config(4, 3));
        assert!(bucket.try_take());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(bucket.available(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_next_refill() {
        let bucket = TokenBucket::new(config(1, 1));
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(bucket.until_next_refill(), Duration::from_millis(750));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let bucket = TokenBucket::new(RateLimitConfig {
            fill_interval: Duration::ZERO,
            capacity: 1,
            quantum: 1,
        });
        assert!(bucket.config().fill_interval > Duration::ZERO);
    }

    #[test]
    fn test_per_second() {
        let config = RateLimitConfig::per_second(50);
        assert_eq!(config.capacity, 50);
        assert_eq!(config.quantum, 50);
        assert_eq!(config.fill_interval, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_middleware_rejects_when_empty() {
        let chain = Chain::builder()
            .stage(Stage::RateLimit, RateLimitMiddleware::new(config(1, 1)))
            .build();

        let mut ctx = MiddlewareContext::new();
        let first = chain
            .process(&mut ctx, request(http::Method::POST, "/v1/demo/sum"), &EchoPath)
            .await;
        assert_eq!(first.status(), StatusCode::OK);

        let mut ctx = MiddlewareContext::new();
        let second = chain
            .process(&mut ctx, request(http::Method::POST, "/v1/demo/sum"), &EchoPath)
            .await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get(header::RETRY_AFTER).unwrap(), "1");

        tokio::time::advance(Duration::from_secs(1)).await;
        let mut ctx = MiddlewareContext::new();
        let third = chain
            .process(&mut ctx, request(http::Method::POST, "/v1/demo/sum"), &EchoPath)
            .await;
        assert_eq!(third.status(), StatusCode::OK);
    }
}
