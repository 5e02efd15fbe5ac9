//! Global middleware stages.
//!
//! In chain order:
//!
//! 1. [`overload`] - shed load while the host is overloaded
//! 2. [`rate_limit`] - shared token bucket
//! 3. [`cors`] - preflight answers and allow-origin headers
//! 4. [`compression`] - gzip response bodies

pub mod compression;
pub mod cors;
pub mod overload;
pub mod rate_limit;

pub use compression::CompressionMiddleware;
pub use cors::{AllowedOrigins, CorsMiddleware};
pub use overload::{OverloadFlag, OverloadMiddleware};
pub use rate_limit::{RateLimitConfig, RateLimitMiddleware, TokenBucket};
