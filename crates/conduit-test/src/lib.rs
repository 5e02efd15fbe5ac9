//! # Conduit Test
//!
//! In-memory testing for Conduit servers. A [`TestClient`] drives a built
//! [`Server`](conduit_server::Server) through its full middleware chain and
//! action pipeline without binding a port.
//!
//! - Fluent request building with JSON bodies and bearer tokens
//! - Envelope helpers: [`TestResponse::result`] and
//!   [`TestResponse::known_error`]
//! - Gzip responses are decoded transparently
//!
//! ## Example
//!
//! ```ignore
//! let client = TestClient::from_app(app)?;
//!
//! let response = client.call("/v1/demo/sum", &json!({"x": 1000, "y": 500})).await;
//! response.assert_status(StatusCode::OK);
//! assert_eq!(response.result::<SumResponse>()?.sum, 1500);
//!
//! let response = client.call("/v1/demo/create", &json!({"name": "taken"})).await;
//! response.assert_status(StatusCode::CONFLICT);
//! assert_eq!(response.known_error()?.status, "already_exists");
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;
