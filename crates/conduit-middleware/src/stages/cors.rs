//! CORS (Cross-Origin Resource Sharing) middleware.
//!
//! Preflight requests (`OPTIONS` with `Origin` and
//! `Access-Control-Request-Method`) are answered here with `204 No Content`
//! and never reach routing. Other requests carrying an allowed `Origin` get
//! `Access-Control-Allow-Origin` on the way out.
//!
//! The server installs [`CorsMiddleware::allow_all`]: any origin, the common
//! methods, and the `Origin`, `Content-Length` and `Content-Type` headers.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use http::{HeaderValue, Method, StatusCode};
use std::collections::HashSet;
use std::time::Duration;

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Request-Method` header (preflight).
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// The set of allowed origins.
#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    /// Allow any origin (wildcard `*`).
    Any,
    /// Allow specific origins.
    List(HashSet<String>),
}

impl AllowedOrigins {
    /// Checks if an origin is allowed.
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }

    fn header_value(&self, origin: &str) -> Option<HeaderValue> {
        match self {
            Self::Any => Some(HeaderValue::from_static("*")),
            Self::List(origins) if origins.contains(origin) => HeaderValue::from_str(origin).ok(),
            Self::List(_) => None,
        }
    }
}

/// CORS middleware that answers preflight requests and tags responses.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    origins: AllowedOrigins,
    methods: Vec<Method>,
    headers: Vec<String>,
    max_age: Duration,
}

impl CorsMiddleware {
    /// Allows any origin with the common methods and headers.
    ///
    /// Preflight results may be cached for 12 hours.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            origins: AllowedOrigins::Any,
            methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::HEAD,
                Method::OPTIONS,
            ],
            headers: vec![
                "Origin".to_string(),
                "Content-Length".to_string(),
                "Content-Type".to_string(),
            ],
            max_age: Duration::from_secs(12 * 60 * 60),
        }
    }

    /// Restricts the allowed origins.
    #[must_use]
    pub fn with_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origins = AllowedOrigins::List(origins.into_iter().map(Into::into).collect());
        self
    }

    /// Adds an allowed request header.
    #[must_use]
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    fn is_preflight(request: &Request) -> bool {
        request.method() == Method::OPTIONS
            && request.headers().contains_key(headers::ORIGIN)
            && request.headers().contains_key(headers::REQUEST_METHOD)
    }

    fn origin(request: &Request) -> Option<&str> {
        request
            .headers()
            .get(headers::ORIGIN)
            .and_then(|v| v.to_str().ok())
    }

    fn preflight(&self, request: &Request) -> Response {
        let Some(allow_origin) = Self::origin(request).and_then(|o| self.origins.header_value(o)) else {
            return Response::empty(StatusCode::FORBIDDEN);
        };

        let method_allowed = request
            .headers()
            .get(headers::REQUEST_METHOD)
            .and_then(|v| v.to_str().ok())
            .and_then(|m| m.parse::<Method>().ok())
            .is_some_and(|m| self.methods.contains(&m));
        if !method_allowed {
            return Response::empty(StatusCode::FORBIDDEN);
        }

        let mut response = Response::empty(StatusCode::NO_CONTENT);
        let map = response.headers_mut();
        map.insert(headers::ALLOW_ORIGIN, allow_origin);

        let methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
        if let Ok(value) = HeaderValue::from_str(&methods.join(", ")) {
            map.insert(headers::ALLOW_METHODS, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.headers.join(", ")) {
            map.insert(headers::ALLOW_HEADERS, value);
        }
        map.insert(headers::MAX_AGE, HeaderValue::from(self.max_age.as_secs()));
        map.insert(
            headers::VARY,
            HeaderValue::from_static("Origin, Access-Control-Request-Method, Access-Control-Request-Headers"),
        );
        response
    }
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if Self::is_preflight(&request) {
                tracing::debug!(request_id = %ctx.request_id(), "answering CORS preflight");
                return self.preflight(&request);
            }

            let allow_origin = Self::origin(&request).and_then(|o| self.origins.header_value(o));
            let mut response = next.run(ctx, request).await;

            if let Some(value) = allow_origin {
                let map = response.headers_mut();
                map.insert(headers::ALLOW_ORIGIN, value);
                if matches!(self.origins, AllowedOrigins::List(_)) {
                    map.append(headers::VARY, HeaderValue::from_static("Origin"));
                }
            }
            response
        })
    }
}
