//! Test client for in-memory HTTP testing.

use crate::error::TestError;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;
use bytes::Bytes;
use conduit_core::BuildError;
use conduit_server::{App, Server};
use http::{HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

/// A test client for making in-memory requests to a Conduit server.
///
/// Requests go through the same middleware chain and action pipeline as
/// network traffic, without binding a port.
///
/// # Example
///
/// ```rust
/// use conduit_core::{ActionSet, Context, JsonResponse, Request, Service, VersionGroup};
/// use conduit_server::{App, ServerConfig};
/// use conduit_test::TestClient;
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Deserialize)]
/// struct Ping {}
/// impl Request for Ping {}
///
/// #[derive(Serialize)]
/// struct Pong { ok: bool }
/// impl JsonResponse for Pong {}
///
/// struct HealthService;
///
/// impl Service for HealthService {
///     fn actions(set: &mut ActionSet<Self>) {
///         set.action("Ping", |_s: Arc<Self>, _ctx: Context, _req: Ping| async {
///             Ok::<_, anyhow::Error>(Some(Pong { ok: true }))
///         });
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let client = TestClient::from_app(
///     App::new(ServerConfig::default()).map(VersionGroup::new(1).stable(|| Arc::new(HealthService))),
/// )
/// .unwrap();
///
/// let response = client.call("/v1/health/ping", &serde_json::json!({})).await;
/// assert_eq!(response.status_code(), 200);
/// assert_eq!(response.text().unwrap(), r#"{"result":{"ok":true}}"#);
/// # });
/// ```
#[must_use]
#[derive(Clone)]
pub struct TestClient {
    server: Arc<Server>,
    default_headers: Vec<(HeaderName, HeaderValue)>,
    remote_addr: Option<SocketAddr>,
}

impl TestClient {
    /// Creates a client for a built server.
    pub fn new(server: Server) -> Self {
        Self {
            server: Arc::new(server),
            default_headers: Vec::new(),
            remote_addr: None,
        }
    }

    /// Builds `app` and creates a client for it.
    ///
    /// # Errors
    ///
    /// Returns the [`BuildError`] of the application.
    pub fn from_app(app: App) -> Result<Self, BuildError> {
        app.build().map(Self::new)
    }

    /// Returns the server under test.
    #[must_use]
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Adds a header sent with every request.
    ///
    /// # Panics
    ///
    /// Panics if the header name or value is invalid.
    pub fn with_default_header(mut self, name: &str, value: &str) -> Self {
        let name = HeaderName::try_from(name).unwrap_or_else(|e| panic!("invalid header name {name:?}: {e}"));
        let value = HeaderValue::try_from(value).unwrap_or_else(|e| panic!("invalid header value {value:?}: {e}"));
        self.default_headers.push((name, value));
        self
    }

    /// Sets the peer address the server sees.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Creates a GET request builder.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::get(uri))
    }

    /// Creates a POST request builder.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::post(uri))
    }

    /// Creates an OPTIONS request builder.
    pub fn options(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::options(uri))
    }

    /// Creates a request builder with a custom method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequestBuilder::new(method, uri))
    }

    /// Posts `body` as JSON to an action path.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the response read.
    pub async fn call<T: Serialize>(&self, path: &str, body: &T) -> TestResponse {
        self.post(path).json(body).send().await
    }

    /// Sends a built request.
    ///
    /// # Errors
    ///
    /// Returns an error if the response body cannot be read.
    pub async fn execute(&self, request: TestRequest) -> Result<TestResponse, TestError> {
        let response = self
            .server
            .dispatch(request.into_http_request(), self.remote_addr)
            .await;
        TestResponse::from_http(response).await
    }
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("routes", &self.server.routes().len())
            .field("default_headers", &self.default_headers.len())
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

/// A request builder bound to a test client.
#[must_use]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl<'a> TestClientRequest<'a> {
    fn new(client: &'a TestClient, builder: TestRequestBuilder) -> Self {
        let builder = client
            .default_headers
            .iter()
            .fold(builder, |builder, (name, value)| builder.header_typed(name.clone(), value.clone()));
        Self { client, builder }
    }

    /// Sets a header on the request.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets the Content-Type header.
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.builder = self.builder.content_type(content_type);
        self
    }

    /// Sets the Authorization header with a Bearer token.
    pub fn bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.builder = self.builder.bearer_token(token);
        self
    }

    /// Sets the raw request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets the request body as JSON.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sends the request and returns the response.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the response read; use
    /// [`try_send`](Self::try_send) to handle those errors.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("test request failed: {e}"),
        }
    }

    /// Sends the request and returns a Result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built or the response
    /// read.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.execute(request).await
    }
}
