//! The response capability and the payloads it produces.
//!
//! Response types declare how they are sent back:
//!
//! - structs implementing [`JsonResponse`] are serialized under the
//!   `"result"` envelope key with `200 OK`;
//! - [`FileStream`] is streamed as `application/octet-stream` with its size.

use crate::error::ActionError;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

/// How an action's result is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// JSON envelope `{"result": ...}`.
    Json,
    /// Raw octet stream.
    Stream,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Stream => f.write_str("stream"),
        }
    }
}

/// A successful action result, ready to be written.
#[derive(Debug)]
pub enum Payload {
    /// A JSON value to wrap in the result envelope.
    Json(serde_json::Value),
    /// A file-like stream with a known size.
    Stream(FileStream),
}

/// A value an action returns on success.
///
/// Implemented for every [`JsonResponse`] and for [`FileStream`].
pub trait Response: Send + 'static {
    /// The kind recorded on the action when it is discovered.
    const KIND: ResponseKind;

    /// Converts the value into a payload.
    fn into_payload(self) -> Result<Payload, ActionError>;
}

/// Marker for response structs serialized as JSON.
///
/// ```
/// use conduit_core::JsonResponse;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct SumResponse {
///     sum: i64,
/// }
///
/// impl JsonResponse for SumResponse {}
/// ```
pub trait JsonResponse: Serialize + Send + 'static {}

impl<T: JsonResponse> Response for T {
    const KIND: ResponseKind = ResponseKind::Json;

    fn into_payload(self) -> Result<Payload, ActionError> {
        serde_json::to_value(&self)
            .map(Payload::Json)
            .map_err(ActionError::internal)
    }
}

impl Response for FileStream {
    const KIND: ResponseKind = ResponseKind::Stream;

    fn into_payload(self) -> Result<Payload, ActionError> {
        Ok(Payload::Stream(self))
    }
}

/// A readable source with a size known up front.
///
/// # Example
///
/// ```no_run
/// use conduit_core::FileStream;
///
/// # async fn example() -> std::io::Result<()> {
/// let stream = FileStream::open("report.csv").await?;
/// println!("sending {} bytes", stream.size());
/// # Ok(())
/// # }
/// ```
pub struct FileStream {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    size: u64,
}

impl FileStream {
    /// Opens a file and reads its size.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from opening or inspecting the file.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Self::from_file(file).await
    }

    /// Wraps an open file, reading its size from metadata.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from inspecting the file.
    pub async fn from_file(file: tokio::fs::File) -> io::Result<Self> {
        let size = file.metadata().await?.len();
        Ok(Self::from_reader(file, size))
    }

    /// Wraps any reader that yields exactly `size` bytes.
    pub fn from_reader(reader: impl AsyncRead + Send + 'static, size: u64) -> Self {
        Self {
            reader: Box::pin(reader),
            size,
        }
    }

    /// Returns the number of bytes the stream yields.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the reader, limited to `size` bytes, for streaming out.
    pub fn into_reader(self) -> impl AsyncRead + Send + Unpin + 'static {
        self.reader.take(self.size)
    }

    /// Reads the whole stream into memory.
    ///
    /// # Errors
    ///
    /// Returns an `UnexpectedEof` error when the reader ends before `size`
    /// bytes, or the underlying read error.
    pub async fn read_all(mut self) -> io::Result<Bytes> {
        let capacity = usize::try_from(self.size).unwrap_or(usize::MAX);
        let mut buf = Vec::with_capacity(capacity.min(1 << 20));
        (&mut self.reader).take(self.size).read_to_end(&mut buf).await?;

        if (buf.len() as u64) < self.size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended after {} of {} bytes", buf.len(), self.size),
            ));
        }
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Serialize)]
    struct Total {
        sum: i64,
    }

    impl JsonResponse for Total {}

    #[test]
    fn test_kinds() {
        assert_eq!(<Total as Response>::KIND, ResponseKind::Json);
        assert_eq!(<FileStream as Response>::KIND, ResponseKind::Stream);
        assert_eq!(ResponseKind::Stream.to_string(), "stream");
    }

    #[test]
    fn test_json_payload() {
        match (Total { sum: 1500 }).into_payload().unwrap() {
            Payload::Json(value) => assert_eq!(value, serde_json::json!({"sum": 1500})),
            Payload::Stream(_) => panic!("expected json payload"),
        }
    }

    #[tokio::test]
    async fn test_stream_from_reader() {
        let stream = FileStream::from_reader(&b"hello world"[..], 11);
        assert_eq!(stream.size(), 11);
        assert_eq!(stream.read_all().await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_into_reader_stops_at_size() {
        let stream = FileStream::from_reader(&b"hello world"[..], 5);
        let mut out = Vec::new();
        stream.into_reader().read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_stream_truncates_to_size() {
        let stream = FileStream::from_reader(&b"hello world"[..], 5);
        assert_eq!(stream.read_all().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_stream_short_read_fails() {
        let stream = FileStream::from_reader(&b"abc"[..], 10);
        let err = stream.read_all().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_stream_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();

        let stream = FileStream::open(file.path()).await.unwrap();
        assert_eq!(stream.size(), 10);
        assert!(format!("{stream:?}").contains("size: 10"));
        assert_eq!(stream.read_all().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_stream_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileStream::open(dir.path().join("missing.bin")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
