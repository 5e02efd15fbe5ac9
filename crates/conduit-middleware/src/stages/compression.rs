//! Gzip compression middleware.
//!
//! Response bodies are gzip-encoded when the request's `Accept-Encoding`
//! admits gzip. An explicit `gzip;q=0` refuses it even when a `*` wildcard
//! is also listed. Responses that already carry a `Content-Encoding`, are
//! streamed, are empty, are smaller than the configured minimum, or would
//! not shrink are passed through unchanged. `Vary: Accept-Encoding` is
//! added either way.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{full_body, is_streaming, Request, Response, ResponseExt};
use flate2::write::GzEncoder;
use flate2::Compression;
use http::{header, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use std::io::Write;

/// Gzip compression middleware.
#[derive(Debug, Clone, Copy)]
pub struct CompressionMiddleware {
    level: Compression,
    min_size: usize,
}

impl CompressionMiddleware {
    /// Creates a middleware with the default level and no minimum size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
            min_size: 0,
        }
    }

    /// Sets the gzip level, from 0 (store) to 9 (best).
    #[must_use]
    pub fn level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Sets the smallest body worth compressing, in bytes.
    #[must_use]
    pub const fn min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Returns `true` if an `Accept-Encoding` value admits gzip.
    #[must_use]
    pub fn accepts_gzip(accept_encoding: &str) -> bool {
        let mut wildcard = None;
        for part in accept_encoding.split(',') {
            let mut params = part.split(';');
            let coding = params.next().unwrap_or_default().trim();
            let allowed = params
                .filter_map(|p| p.trim().strip_prefix("q="))
                .filter_map(|q| q.trim().parse::<f32>().ok())
                .all(|q| q > 0.0);

            if coding.eq_ignore_ascii_case("gzip") {
                return allowed;
            }
            if coding == "*" {
                wildcard = Some(allowed);
            }
        }
        wildcard.unwrap_or(false)
    }

    fn gzip(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder.write_all(data)?;
        encoder.finish()
    }

    async fn encode(&self, response: Response) -> Response {
        if is_streaming(response.body()) {
            return response;
        }

        let (mut parts, body) = response.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                tracing::error!(error = %err, "reading response body failed");
                return Response::empty(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        if bytes.is_empty() || bytes.len() < self.min_size {
            return Response::from_parts(parts, full_body(bytes));
        }

        match self.gzip(&bytes) {
            Ok(compressed) if compressed.len() < bytes.len() => {
                parts
                    .headers
                    .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                parts.headers.remove(header::CONTENT_LENGTH);
                Response::from_parts(parts, full_body(compressed))
            }
            Ok(_) => Response::from_parts(parts, full_body(bytes)),
            Err(err) => {
                tracing::warn!(error = %err, "gzip failed; sending uncompressed body");
                Response::from_parts(parts, full_body(bytes))
            }
        }
    }
}

impl Default for CompressionMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for CompressionMiddleware {
    fn name(&self) -> &'static str {
        "compression"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let wants_gzip = request
                .headers()
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .is_some_and(Self::accepts_gzip);

            let mut response = next.run(ctx, request).await;
            response
                .headers_mut()
                .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));

            if !wants_gzip || response.headers().contains_key(header::CONTENT_ENCODING) {
                return response;
            }
            self.encode(response).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Chain, Stage};
    use crate::middleware::{BoxFuture, Endpoint};
    use bytes::Bytes;
    use flate2::read::GzDecoder;
    use http_body_util::Full;
    use std::io::Read;

    struct Repeat(usize);

    impl Endpoint for Repeat {
        fn call<'a>(&'a self, _ctx: &'a mut MiddlewareContext, _request: Request) -> BoxFuture<'a, Response> {
            Box::pin(async move { Response::text(StatusCode::OK, "conduit ".repeat(self.0)) })
        }
    }

    fn request(accept: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method("POST").uri("/v1/demo/sum");
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT_ENCODING, accept);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    async fn run(mw: CompressionMiddleware, repeat: usize, accept: Option<&str>) -> Response {
        let chain = Chain::builder().stage(Stage::Compression, mw).build();
        chain
            .process(&mut MiddlewareContext::new(), request(accept), &Repeat(repeat))
            .await
    }

    #[test]
    fn test_accepts_gzip() {
        assert!(CompressionMiddleware::accepts_gzip("gzip"));
        assert!(CompressionMiddleware::accepts_gzip("deflate, GZIP;q=0.5"));
        assert!(CompressionMiddleware::accepts_gzip("*"));
        assert!(!CompressionMiddleware::accepts_gzip("gzip;q=0"));
        assert!(!CompressionMiddleware::accepts_gzip("gzip;q=0, *"));
        assert!(!CompressionMiddleware::accepts_gzip("*, gzip; q=0.0"));
        assert!(CompressionMiddleware::accepts_gzip("br, *;q=0.1"));
        assert!(!CompressionMiddleware::accepts_gzip("br, *;q=0"));
        assert!(!CompressionMiddleware::accepts_gzip("br, deflate"));
        assert!(!CompressionMiddleware::accepts_gzip(""));
    }

    #[tokio::test]
    async fn test_compresses_when_accepted() {
        let response = run(CompressionMiddleware::new(), 200, Some("gzip, deflate")).await;

        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(response.headers().get(header::VARY).unwrap(), "Accept-Encoding");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let mut decoded = String::new();
        GzDecoder::new(&body[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "conduit ".repeat(200));
    }

    #[tokio::test]
    async fn test_plain_without_accept_encoding() {
        let response = run(CompressionMiddleware::new(), 200, None).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(response.headers().get(header::VARY).unwrap(), "Accept-Encoding");
    }

    #[tokio::test]
    async fn test_skips_below_min_size() {
        let response = run(CompressionMiddleware::new().min_size(4096), 10, Some("gzip")).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_skips_empty_body() {
        let response = run(CompressionMiddleware::new(), 0, Some("gzip")).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    struct Download;

    impl Endpoint for Download {
        fn call<'a>(&'a self, _ctx: &'a mut MiddlewareContext, _request: Request) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                let data = "conduit ".repeat(4096).into_bytes();
                let size = data.len() as u64;
                Response::stream(StatusCode::OK, std::io::Cursor::new(data), size)
            })
        }
    }

    #[tokio::test]
    async fn test_streams_pass_through_uncompressed() {
        let chain = Chain::builder()
            .stage(Stage::Compression, CompressionMiddleware::new())
            .build();
        let response = chain
            .process(&mut MiddlewareContext::new(), request(Some("gzip")), &Download)
            .await;

        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert!(is_streaming(response.body()));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.len(), "conduit ".len() * 4096);
    }

    #[tokio::test]
    async fn test_level_clamped() {
        let response = run(CompressionMiddleware::new().level(42), 200, Some("gzip")).await;
        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
    }
}
