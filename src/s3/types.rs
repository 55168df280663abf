//! S3 types and response structures

use bytes::Bytes;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// S3 Object metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Object {
    /// Object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp (optional)
    pub last_modified: Option<String>,
    /// ETag (optional)
    pub etag: Option<String>,
}

impl S3Object {
    pub fn new(key: String, size: u64) -> Self {
        Self {
            key,
            size,
            last_modified: None,
            etag: None,
        }
    }
}

/// One page of a ListObjectsV2 response
#[derive(Debug, Clone, Default)]
pub struct ListObjectsResponse {
    /// Objects in listing order
    pub contents: Vec<S3Object>,
    /// Common prefixes (subdirectories when using delimiter)
    pub common_prefixes: Vec<String>,
    /// Whether more results exist beyond this page
    pub is_truncated: bool,
    /// Continuation token for the next page
    pub next_continuation_token: Option<String>,
    /// Key count in this response
    pub key_count: Option<u32>,
}

impl ListObjectsResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of `contents`, in listing order
    pub fn keys(&self) -> Vec<String> {
        self.contents.iter().map(|obj| obj.key.clone()).collect()
    }
}

/// Payload for a PUT: either held in memory or read from a local file.
#[derive(Debug, Clone)]
pub enum ObjectBody {
    Bytes(Bytes),
    File(PathBuf),
}

impl ObjectBody {
    /// Zero-length payload (folder markers)
    pub fn empty() -> Self {
        ObjectBody::Bytes(Bytes::new())
    }
}

impl From<Bytes> for ObjectBody {
    fn from(data: Bytes) -> Self {
        ObjectBody::Bytes(data)
    }
}

impl From<Vec<u8>> for ObjectBody {
    fn from(data: Vec<u8>) -> Self {
        ObjectBody::Bytes(Bytes::from(data))
    }
}

impl From<&'static str> for ObjectBody {
    fn from(data: &'static str) -> Self {
        ObjectBody::Bytes(Bytes::from_static(data.as_bytes()))
    }
}

/// Readable content of a fetched object, positioned at the first byte.
///
/// The stream holds the underlying connection until it is dropped; read it to
/// the end or drop it to release the connection.
pub struct ObjectStream {
    content_length: Option<u64>,
    inner: Pin<Box<dyn AsyncRead + Send>>,
}

impl ObjectStream {
    pub fn new<R>(reader: R, content_length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            content_length,
            inner: Box::pin(reader),
        }
    }

    /// Stream over an in-memory buffer
    pub fn from_bytes(data: Bytes) -> Self {
        let len = data.len() as u64;
        Self::new(io::Cursor::new(data), Some(len))
    }

    /// Content-Length reported by the server, if any
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Read the remaining content into memory
    pub async fn into_bytes(mut self) -> io::Result<Bytes> {
        let capacity = self.content_length.unwrap_or(0).min(64 * 1024 * 1024) as usize;
        let mut buf = Vec::with_capacity(capacity);
        self.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl AsyncRead for ObjectStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().inner.as_mut().poll_read(cx, buf)
    }
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_object_stream_from_bytes() {
        let stream = ObjectStream::from_bytes(Bytes::from_static(b"hello"));
        assert_eq!(stream.content_length(), Some(5));
        assert_eq!(stream.into_bytes().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_list_response_keys_keep_order() {
        let mut response = ListObjectsResponse::new();
        response.contents.push(S3Object::new("b/".to_string(), 0));
        response.contents.push(S3Object::new("b/a.txt".to_string(), 3));
        assert_eq!(response.keys(), vec!["b/", "b/a.txt"]);
    }
}
