//! # Conduit Server
//!
//! HTTP server for the Conduit toolkit.
//!
//! This crate turns an [`App`] into a running server:
//!
//! - Route binding: every discovered action is mounted at
//!   `POST {base_url}/v{major}{tier}/{resource}/{method}`
//! - The per-action pipeline: auth, decoding, validation, deadline and the
//!   `{"result": ..}` envelope
//! - The global middleware chain (overload, rate limit, CORS, compression)
//! - Optional HTTPS through rustls ([`TlsConfig`])
//! - Graceful shutdown on SIGINT/SIGTERM
//!
//! ## Example
//!
//! ```rust,no_run
//! use conduit_core::VersionGroup;
//! use conduit_server::{App, ServerConfig};
//!
//! # async fn run(group: VersionGroup) -> Result<(), conduit_server::ServerError> {
//! let config = ServerConfig::builder()
//!     .addr(":8080")
//!     .base_url("api")
//!     .app_name("orders")
//!     .build();
//!
//! App::new(config).map(group).run().await
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
pub mod binder;
pub mod config;
mod pipeline;
mod router;
mod server;
mod shutdown;
pub mod tls;

pub use app::App;
pub use config::{normalize_base_url, ServerConfig, ServerConfigBuilder};
pub use pipeline::{ContextFn, Pipeline};
pub use router::{Route, RouteTable};
pub use server::{Server, ServerError, REQUEST_ID_HEADER};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
pub use tls::{TlsConfig, TlsError};
