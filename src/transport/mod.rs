//! Transport module - moves requests and responses between client and server.
//!
//! Provides:
//! - [`Transport`] - the request/response exchange the client runs on
//! - [`LocalTransport`] - in-process, straight into a [`Dispatcher`](crate::server::Dispatcher)
//! - [`HttpTransport`] - HTTP/1.1 via `reqwest`
//!
//! Response bodies are exposed as a stream of chunks so streaming routes
//! can be decoded while the server is still producing. Dropping the
//! [`BodyStream`] releases the underlying connection.

mod local;
mod remote;

use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, Request, StatusCode};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{RapidError, Result};

pub use local::LocalTransport;
pub use remote::HttpTransport;

/// Chunks of a response body.
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Status, headers and body stream of a response.
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl TransportResponse {
    /// Read the whole body, failing once it exceeds `limit` bytes.
    pub async fn bytes(mut self, limit: usize) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            let chunk = chunk?;
            if buf.len() + chunk.len() > limit {
                return Err(RapidError::Protocol(format!("response body exceeds {limit} bytes")));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// One request/response exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return once the response head is available.
    async fn send(&self, request: Request<Bytes>) -> Result<TransportResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request<Bytes>) -> Result<TransportResponse> {
        (**self).send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(chunks: Vec<&'static [u8]>) -> TransportResponse {
        let body = futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))));
        TransportResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.boxed(),
        }
    }

    #[tokio::test]
    async fn test_bytes_concatenates_chunks() {
        let body = response(vec![b"ab", b"cd"]).bytes(16).await.unwrap();
        assert_eq!(body, "abcd");
    }

    #[tokio::test]
    async fn test_bytes_limit() {
        let err = response(vec![b"abc", b"def"]).bytes(4).await.unwrap_err();
        assert!(matches!(err, RapidError::Protocol(_)));
    }
}
