//! HTTP server implementation.
//!
//! The server is built on Hyper and Tokio. Each accepted connection is
//! served on its own task; each request goes through the global middleware
//! [`Chain`] and then the routing endpoint:
//!
//! - `GET /` answers the welcome text
//! - `POST` to a bound path runs the action [`Pipeline`]
//! - anything else answers `501 Not Implemented`
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_server::{App, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = App::new(ServerConfig::default()).map(groups()).build()?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use crate::config::ServerConfig;
use crate::pipeline::Pipeline;
use crate::router::RouteTable;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::tls::{self, TlsError};
use conduit_core::BuildError;
use conduit_middleware::stages::{
    CompressionMiddleware, CorsMiddleware, OverloadFlag, OverloadMiddleware, RateLimitMiddleware,
};
use conduit_middleware::{
    BoxFuture, Chain, Endpoint, LoadMonitor, MiddlewareContext, Request, Response, ResponseExt, Stage,
};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

/// Header carrying the per-request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address does not parse.
    #[error("invalid address `{addr}`: {source}")]
    InvalidAddr {
        /// The configured address.
        addr: String,
        /// The parse failure.
        #[source]
        source: std::net::AddrParseError,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address.
        addr: SocketAddr,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure of the listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The certificate or key could not be loaded.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// The application could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Terminal endpoint of the chain: welcome page, actions, or 501.
struct Routing {
    routes: RouteTable,
    pipeline: Pipeline,
    welcome: String,
}

impl Endpoint for Routing {
    fn call<'a>(&'a self, ctx: &'a mut MiddlewareContext, request: Request) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let path = request.uri().path();

            if request.method() == Method::GET && path == "/" {
                return Response::text(StatusCode::OK, self.welcome.clone());
            }

            let route = match (request.method(), self.routes.get(path)) {
                (&Method::POST, Some(route)) => route,
                _ => {
                    tracing::debug!(method = %request.method(), path, "no route");
                    return Response::empty(StatusCode::NOT_IMPLEMENTED);
                }
            };

            ctx.set_route(route.path().to_string());
            let (parts, body) = request.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };
            self.pipeline
                .handle(route.action(), &parts.headers, &body, ctx.request_id())
                .await
        })
    }
}

/// A built Conduit server.
///
/// Created by [`App::build`](crate::App::build). Use [`run`](Self::run) to
/// serve on the configured address, or [`dispatch`](Self::dispatch) to
/// answer a request in memory.
pub struct Server {
    config: ServerConfig,
    chain: Chain,
    routing: Arc<Routing>,
    overload: Option<OverloadFlag>,
}

impl Server {
    pub(crate) fn new(config: ServerConfig, routes: RouteTable, pipeline: Pipeline) -> Self {
        let mut chain = Chain::builder()
            .stage(Stage::Cors, CorsMiddleware::allow_all())
            .stage(Stage::Compression, CompressionMiddleware::new());

        let overload = config.overload().map(|_| OverloadFlag::new());
        if let Some(flag) = &overload {
            chain = chain.stage(Stage::Overload, OverloadMiddleware::new(flag.clone()));
        }
        if let Some(rate_limit) = config.rate_limit() {
            chain = chain.stage(Stage::RateLimit, RateLimitMiddleware::new(*rate_limit));
        }

        let welcome = match config.app_name() {
            Some(name) => format!("Welcome to {name}"),
            None => "Welcome".to_string(),
        };

        Self {
            config,
            chain: chain.build(),
            routing: Arc::new(Routing {
                routes,
                pipeline,
                welcome,
            }),
            overload,
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the bound action routes.
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routing.routes
    }

    /// Returns the global middleware chain.
    #[must_use]
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Returns the overload flag, when load shedding is enabled.
    #[must_use]
    pub fn overload_flag(&self) -> Option<&OverloadFlag> {
        self.overload.as_ref()
    }

    /// Answers one request without any network I/O.
    pub async fn dispatch(&self, request: Request, remote_addr: Option<SocketAddr>) -> Response {
        let mut ctx = MiddlewareContext::new();
        if let Some(addr) = remote_addr {
            ctx.set_remote_addr(addr);
        }

        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let limit = u64::try_from(self.config.max_body_size()).unwrap_or(u64::MAX);
        let too_large = request
            .body()
            .size_hint()
            .exact()
            .is_some_and(|size| size > limit);
        let response = if too_large {
            Response::empty(StatusCode::PAYLOAD_TOO_LARGE)
        } else {
            self.chain.process(&mut ctx, request, self.routing.as_ref()).await
        };

        tracing::debug!(
            request_id = %ctx.request_id(),
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            route = ctx.route().unwrap_or("-"),
            elapsed_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );
        response
    }

    /// Serves on the configured address until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Serves on the configured address until `shutdown` is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.socket_addr().map_err(|source| ServerError::InvalidAddr {
            addr: self.config.addr().to_string(),
            source,
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from `listener` until `shutdown` is triggered.
    ///
    /// In-flight connections are given the configured shutdown timeout to
    /// finish.
    ///
    /// With TLS configured, each connection completes its handshake
    /// before any request is read.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read or
    /// the TLS material cannot be loaded.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let acceptor = self.config.tls().map(tls::acceptor).transpose()?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            routes = self.routes().len(),
            tls = acceptor.is_some(),
            "http server is listening"
        );

        let monitor = match (self.config.overload(), &self.overload) {
            (Some(config), Some(flag)) => Some(LoadMonitor::new(*config, flag.clone()).spawn(shutdown.recv())),
            _ => None,
        };

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            tracing::error!(error = %err, "failed to accept connection");
                            continue;
                        }
                    };

                    if let Some(max) = server.config.max_connections() {
                        if tracker.active_connections() >= max {
                            tracing::warn!(remote_addr = %remote_addr, max, "connection limit reached; dropping connection");
                            drop(stream);
                            continue;
                        }
                    }

                    let server = Arc::clone(&server);
                    let token = tracker.acquire();
                    let shutdown = shutdown.clone();
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        let result = match acceptor {
                            Some(acceptor) => {
                                match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                                    Ok(Ok(stream)) => server.handle_connection(stream, remote_addr, shutdown).await,
                                    Ok(Err(err)) => {
                                        tracing::debug!(remote_addr = %remote_addr, error = %err, "TLS handshake failed");
                                        Ok(())
                                    }
                                    Err(_) => {
                                        tracing::debug!(remote_addr = %remote_addr, "TLS handshake timed out");
                                        Ok(())
                                    }
                                }
                            }
                            None => server.handle_connection(stream, remote_addr, shutdown).await,
                        };
                        if let Err(err) = result {
                            tracing::debug!(remote_addr = %remote_addr, error = %err, "connection error");
                        }
                        drop(token);
                    });
                }

                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, stopping server");
                    break;
                }
            }
        }

        let shutdown_timeout = server.config.shutdown_timeout();
        tracing::info!(
            timeout = ?shutdown_timeout,
            active = tracker.active_connections(),
            "waiting for connections to close"
        );
        if tokio::time::timeout(shutdown_timeout, tracker.wait_for_shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }

        if let Some(handle) = monitor {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "load monitor task failed");
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection<S>(
        self: Arc<Self>,
        stream: S,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |request: http::Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(request, remote_addr).await) }
        });

        let conn = http1::Builder::new()
            .keep_alive(self.config.keep_alive_timeout().is_some())
            .serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    async fn handle_request(&self, request: http::Request<Incoming>, remote_addr: SocketAddr) -> Response {
        let (parts, body) = request.into_parts();
        let limited = Limited::new(body, self.config.max_body_size());

        let body = match tokio::time::timeout(self.config.body_read_timeout(), limited.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(err)) if err.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::warn!(remote_addr = %remote_addr, "request body too large");
                return Response::empty(StatusCode::PAYLOAD_TOO_LARGE);
            }
            Ok(Err(err)) => {
                tracing::debug!(remote_addr = %remote_addr, error = %err, "failed to read request body");
                return Response::empty(StatusCode::BAD_REQUEST);
            }
            Err(_) => {
                tracing::warn!(remote_addr = %remote_addr, "request body read timed out");
                return Response::empty(StatusCode::REQUEST_TIMEOUT);
            }
        };

        let request = http::Request::from_parts(parts, Full::new(body));
        self.dispatch(request, Some(remote_addr)).await
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("chain", &self.chain)
            .field("routes", &self.routing.routes.len())
            .finish_non_exhaustive()
    }
}
