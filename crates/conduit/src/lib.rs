//! # Conduit
//!
//! **Convention-driven HTTP action servers**
//!
//! Conduit turns plain service types into an HTTP API:
//!
//! - **Constructor injection**: services declare dependencies as `Arc<T>`
//!   parameters of a constructor; a [`Resolver`](core::Resolver) builds each
//!   type once, in dependency order
//! - **Action discovery**: every registered method `(Arc<Self>, Context,
//!   Req) -> Result<Option<Res>, E>` becomes a route
//! - **Versioned routing**: `POST {base_url}/v{major}{tier}/{resource}/{method}`,
//!   with `beta` and `alpha` tiers beside stable
//! - **Uniform envelopes**: `{"result": ..}` on success, `409 {"error": ..}`
//!   for known business errors, empty bodies otherwise
//! - **Load protection**: overload shedding and token bucket rate limiting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conduit::prelude::*;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Deserialize)]
//! struct SumRequest { x: i64, y: i64 }
//! impl Request for SumRequest {}
//!
//! #[derive(Serialize)]
//! struct SumResponse { sum: i64 }
//! impl JsonResponse for SumResponse {}
//!
//! struct DemoService;
//!
//! impl DemoService {
//!     async fn sum(self: Arc<Self>, _ctx: Context, req: SumRequest) -> anyhow::Result<Option<SumResponse>> {
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
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     App::new(ServerConfig::default())
//!         .map(VersionGroup::new(1).stable(|| Arc::new(DemoService)))
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! `POST /v1/demo/sum` with `{"x":1000,"y":500}` answers
//! `{"result":{"sum":1500}}`.
//!
//! ## Request flow
//!
//! ```text
//! Request → Overload → RateLimit → CORS → Compression → Routing
//!                                                          ↓
//!                     Auth → Decode → Validate → Action (deadline) → Envelope
//! ```

#![doc(html_root_url = "https://docs.rs/conduit/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use conduit_core as core;

// Re-export server types
pub use conduit_server as server;

// Re-export middleware types
pub use conduit_middleware as middleware;

// Re-export logging setup
pub use conduit_telemetry as telemetry;

// Re-export configuration loading
pub use conduit_config as config;

/// Prelude module for convenient imports.
///
/// ```rust
/// use conduit::prelude::*;
///
/// let config = ServerConfig::builder().base_url("api").build();
/// assert_eq!(config.base_url(), "/api");
/// ```
pub mod prelude {
    pub use conduit_core::{
        ActionError, ActionSet, BuildError, Context, FileStream, JsonResponse, KnownError, Request,
        RequestId, Service, Tier, ValidationError, VersionGroup,
    };

    pub use conduit_server::{App, Server, ServerConfig, ServerError, ShutdownSignal, TlsConfig};

    pub use conduit_middleware::auth::JwtIdentity;
    pub use conduit_middleware::{InterceptError, OverloadConfig};
    pub use conduit_middleware::stages::RateLimitConfig;

    pub use conduit_config::{ConduitConfig, ConfigLoader};
    pub use conduit_telemetry::{init_logging, LogConfig};
}
