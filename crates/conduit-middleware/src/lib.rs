//! # Conduit Middleware
//!
//! The global middleware chain every Conduit request passes before routing,
//! plus the per-action auth interceptors.
//!
//! ## Chain
//!
//! ```text
//! Request → Overload → RateLimit → CORS → Compression → Endpoint
//!                                                          ↓
//! Response ←──────────────────────── Compression ←─────────┘
//! ```
//!
//! | Stage | Middleware    | Rejects with            |
//! |-------|---------------|-------------------------|
//! | 1     | Overload      | `503 Service Unavailable` |
//! | 2     | Rate limit    | `429 Too Many Requests` |
//! | 3     | CORS          | `204` for preflight, `403` for refused origins |
//! | 4     | Compression   | never                   |
//!
//! The order is fixed; the builder sorts stages whatever order they are
//! added in.
//!
//! ```
//! use conduit_middleware::{Chain, Stage};
//! use conduit_middleware::stages::{CorsMiddleware, OverloadFlag, OverloadMiddleware};
//!
//! let chain = Chain::builder()
//!     .stage(Stage::Cors, CorsMiddleware::allow_all())
//!     .stage(Stage::Overload, OverloadMiddleware::new(OverloadFlag::new()))
//!     .build();
//!
//! assert_eq!(chain.stage_names(), vec!["overload", "cors"]);
//! ```
//!
//! ## Load monitor
//!
//! [`LoadMonitor`] samples CPU and memory in the background and drives the
//! [`OverloadFlag`](stages::OverloadFlag) read by the overload stage.
//!
//! ## Auth
//!
//! [`AuthPolicy`] runs the identity and permission interceptors for
//! non-anonymous actions. [`JwtIdentity`](auth::JwtIdentity) is a ready-made
//! identity interceptor for HS256 or RS256 bearer tokens.

#![doc(html_root_url = "https://docs.rs/conduit-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod chain;
pub mod context;
pub mod middleware;
pub mod monitor;
pub mod stages;
pub mod types;

pub use auth::{AuthError, AuthPolicy, InterceptError, Interceptor};
pub use chain::{BoxedMiddleware, Chain, ChainBuilder, Stage};
pub use context::MiddlewareContext;
pub use middleware::{BoxFuture, Endpoint, Middleware, Next};
pub use monitor::{LoadMonitor, LoadSample, LoadSampler, OverloadConfig, SampleError, SysinfoSampler};
pub use types::{full_body, is_streaming, reader_body, Body, Request, Response, ResponseExt};
