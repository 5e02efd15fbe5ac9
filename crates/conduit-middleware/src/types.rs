//! Common types used throughout the middleware chain.

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::{header, HeaderValue, StatusCode};
use http_body::Frame;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full, StreamBody};
use std::io;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// The HTTP request type used in the middleware chain.
///
/// This is a standard `http::Request` with a fully read `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// A boxed response body, either in memory or streamed from a reader.
pub type Body = UnsyncBoxBody<Bytes, io::Error>;

/// The HTTP response type used in the middleware chain.
pub type Response = http::Response<Body>;

/// Wraps in-memory bytes as a response body.
pub fn full_body(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Streams `reader` as a response body, chunk by chunk.
///
/// Nothing is read until the body is polled, and the body reports no exact
/// size, so buffering stages leave it alone.
pub fn reader_body(reader: impl AsyncRead + Send + 'static) -> Body {
    let frames = ReaderStream::new(reader).map_ok(Frame::data);
    StreamBody::new(frames).boxed_unsync()
}

/// Returns `true` if the body is produced incrementally.
pub fn is_streaming(body: &Body) -> bool {
    http_body::Body::size_hint(body).exact().is_none()
}

/// Shorthand constructors for responses.
pub trait ResponseExt {
    /// Creates a response with `status` and an empty body.
    fn empty(status: StatusCode) -> Response;

    /// Creates a `text/plain` response.
    fn text(status: StatusCode, body: impl Into<String>) -> Response;

    /// Creates an `application/json` response from a value.
    fn json(status: StatusCode, body: &serde_json::Value) -> Response;

    /// Creates an `application/octet-stream` response streamed from `reader`.
    ///
    /// `size` is sent as `Content-Length`; the reader must yield exactly
    /// that many bytes.
    fn stream(status: StatusCode, reader: impl AsyncRead + Send + 'static, size: u64) -> Response;
}

impl ResponseExt for Response {
    fn empty(status: StatusCode) -> Response {
        with_status(full_body(Bytes::new()), status)
    }

    fn text(status: StatusCode, body: impl Into<String>) -> Response {
        let mut response = with_status(full_body(body.into()), status);
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    fn json(status: StatusCode, body: &serde_json::Value) -> Response {
        let mut response = with_status(full_body(body.to_string()), status);
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        response
    }

    fn stream(status: StatusCode, reader: impl AsyncRead + Send + 'static, size: u64) -> Response {
        let mut response = with_status(reader_body(reader), status);
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        response
    }
}

fn with_status(body: Body, status: StatusCode) -> Response {
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    response
}
