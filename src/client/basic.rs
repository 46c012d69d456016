//! Single-attempt client.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;

use super::{BeforeRequest, Client, ClientConfig, ClientStream, RequestTemplate};
use crate::codec::{decode_response, FileDownload, JsonProtocol, MessageBuffer, PayloadCodec, Protocol, RawData};
use crate::error::{RapidError, Result};
use crate::status::Status;
use crate::transport::{BodyStream, Transport, TransportResponse};

/// Sends each request once over a [`Transport`].
pub struct BasicClient<T> {
    transport: T,
    protocol: Arc<dyn Protocol>,
    config: ClientConfig,
    hooks: Vec<Arc<dyn BeforeRequest>>,
}

impl<T: Transport> BasicClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            protocol: Arc::new(JsonProtocol),
            config: ClientConfig::default(),
            hooks: Vec::new(),
        }
    }

    /// Decode responses with `protocol` instead of JSON.
    pub fn with_protocol(mut self, protocol: impl Protocol + 'static) -> Self {
        self.protocol = Arc::new(protocol);
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Run `hook` on the headers of every request, in registration order.
    pub fn before_request(mut self, hook: impl BeforeRequest + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn send(&self, template: &RequestTemplate) -> Result<TransportResponse> {
        let mut request = template.to_request();
        for hook in &self.hooks {
            hook.before_request(request.headers_mut())?;
        }
        tracing::debug!(request = %template, "sending");
        self.transport.send(request).await
    }

    /// Decode the error carried by a non-2xx response.
    async fn failure(&self, response: TransportResponse) -> RapidError {
        let status = response.status;
        match response.bytes(self.config.max_message_size).await {
            Ok(body) => match decode_response(self.protocol.as_ref(), status, &body) {
                Err(e) => e,
                Ok(_) => RapidError::Status(Status::for_code(status)),
            },
            Err(_) => RapidError::Status(Status::for_code(status)),
        }
    }

    /// Call a route answering with its own codec rather than an envelope.
    async fn call_codec<P: PayloadCodec>(&self, request: &RequestTemplate) -> Result<P> {
        let response = self.send(request).await?;
        if !response.status.is_success() {
            return Err(self.failure(response).await);
        }
        let headers = response.headers.clone();
        let body = response.bytes(self.config.max_message_size).await?;
        P::from_parts(&headers, body)
    }

    /// Call a route that replies with raw bytes.
    pub async fn call_raw(&self, request: &RequestTemplate) -> Result<RawData> {
        self.call_codec(request).await
    }

    /// Call a route that replies with a file.
    pub async fn call_file(&self, request: &RequestTemplate) -> Result<FileDownload> {
        self.call_codec(request).await
    }
}

#[async_trait]
impl<T: Transport> Client for BasicClient<T> {
    async fn call(&self, request: &RequestTemplate) -> Result<Value> {
        let response = self.send(request).await?;
        let status = response.status;
        let body = response.bytes(self.config.max_message_size).await?;
        decode_response(self.protocol.as_ref(), status, &body)
    }

    async fn stream(&self, request: &RequestTemplate) -> Result<Box<dyn ClientStream>> {
        let response = self.send(request).await?;
        if !response.status.is_success() {
            return Err(self.failure(response).await);
        }
        Ok(Box::new(BasicStream::new(
            response.body,
            self.protocol.clone(),
            self.config.max_message_size,
        )))
    }
}

/// Decodes framed envelopes from a response body.
pub struct BasicStream {
    body: Option<BodyStream>,
    buffer: MessageBuffer,
    pending: VecDeque<Bytes>,
    protocol: Arc<dyn Protocol>,
}

impl BasicStream {
    fn new(body: BodyStream, protocol: Arc<dyn Protocol>, max_message_size: usize) -> Self {
        Self {
            body: Some(body),
            buffer: MessageBuffer::with_max_message(protocol.framing(), max_message_size),
            pending: VecDeque::new(),
            protocol,
        }
    }

    fn finish(&mut self) {
        self.body = None;
        self.pending.clear();
        self.buffer.clear();
    }
}

#[async_trait]
impl ClientStream for BasicStream {
    async fn next(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                let item = self
                    .protocol
                    .decode_envelope(&message)
                    .and_then(|envelope| envelope.into_result());
                return match item {
                    Ok(value) => Ok(Some(value)),
                    Err(e) => {
                        self.finish();
                        Err(e)
                    }
                };
            }

            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };
            match body.next().await {
                Some(Ok(chunk)) => match self.buffer.push(&chunk) {
                    Ok(messages) => self.pending.extend(messages),
                    Err(e) => {
                        self.finish();
                        return Err(e);
                    }
                },
                Some(Err(e)) => {
                    self.finish();
                    return Err(e);
                }
                None => {
                    self.body = None;
                    if let Some(tail) = self.buffer.finish()? {
                        self.pending.push_back(tail);
                    }
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientExt, ClientStreamExt, RequestBuilder};
    use http::{HeaderMap, Method, Request, StatusCode};
    use std::sync::Mutex;

    /// Replays a canned response and records what was sent.
    struct Canned {
        status: StatusCode,
        chunks: Vec<&'static [u8]>,
        seen: Mutex<Vec<HeaderMap>>,
    }

    impl Canned {
        fn new(status: StatusCode, chunks: Vec<&'static [u8]>) -> Self {
            Self {
                status,
                chunks,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: Request<Bytes>) -> Result<TransportResponse> {
            self.seen.lock().unwrap().push(request.headers().clone());
            let chunks: Vec<Result<Bytes>> = self.chunks.iter().map(|c| Ok(Bytes::from_static(c))).collect();
            Ok(TransportResponse {
                status: self.status,
                headers: HeaderMap::new(),
                body: futures::stream::iter(chunks).boxed(),
            })
        }
    }

    fn get() -> RequestTemplate {
        RequestBuilder::new(Method::GET, "/x", &[]).build().unwrap()
    }

    #[tokio::test]
    async fn test_call_decodes_payload() {
        let client = BasicClient::new(Canned::new(StatusCode::CREATED, vec![br#"{"status":201,"data":{"ID":1}}"#]));
        let value: Value = client.call_as(&get()).await.unwrap();
        assert_eq!(value["ID"], 1);
    }

    #[tokio::test]
    async fn test_call_error_envelope() {
        let client = BasicClient::new(Canned::new(StatusCode::NOT_FOUND, vec![br#"{"status":404,"error":"Not Found"}"#]));
        match client.call(&get()).await.unwrap_err() {
            RapidError::Status(status) => {
                assert_eq!(status.code(), StatusCode::NOT_FOUND);
                assert_eq!(status.message(), "Not Found");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_error_falls_back_to_transport_status() {
        let client = BasicClient::new(Canned::new(StatusCode::BAD_GATEWAY, vec![b"<html>upstream down</html>"]));
        match client.call(&get()).await.unwrap_err() {
            RapidError::Status(status) => {
                assert_eq!(status.code(), StatusCode::BAD_GATEWAY);
                assert_eq!(status.message(), "Bad Gateway");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let client = BasicClient::new(Canned::new(StatusCode::OK, vec![br#"{"status":200}"#]))
            .before_request(|h: &mut HeaderMap| {
                h.insert("x-step", "one".parse().unwrap());
            })
            .before_request(|h: &mut HeaderMap| {
                h.append("x-step", "two".parse().unwrap());
            });
        client.call(&get()).await.unwrap();

        let seen = client.transport().seen.lock().unwrap();
        let steps: Vec<_> = seen[0].get_all("x-step").iter().collect();
        assert_eq!(steps, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_stream_split_across_chunks() {
        let client = BasicClient::new(Canned::new(
            StatusCode::OK,
            vec![&b"{\"status\":200,\"data\":0}\n{\"status\":2"[..], &b"00,\"data\":1}\n"[..]],
        ));
        let mut stream = client.stream(&get()).await.unwrap();
        assert_eq!(stream.next_as::<u32>().await.unwrap(), Some(0));
        assert_eq!(stream.next_as::<u32>().await.unwrap(), Some(1));
        assert_eq!(stream.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stream_error_item_ends_stream() {
        let client = BasicClient::new(Canned::new(
            StatusCode::OK,
            vec![b"{\"status\":200,\"data\":0}\n{\"status\":500,\"error\":\"boom\"}\n{\"status\":200,\"data\":9}\n"],
        ));
        let mut stream = client.stream(&get()).await.unwrap();
        assert_eq!(stream.next().await.unwrap(), Some(Value::from(0)));
        assert!(matches!(stream.next().await, Err(RapidError::Status(_))));
        assert_eq!(stream.next().await.unwrap(), None);
        stream.close().await.unwrap();
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_rejected_before_open() {
        let client = BasicClient::new(Canned::new(StatusCode::CONFLICT, vec![br#"{"status":409,"error":"busy"}"#]));
        let err = client.stream(&get()).await.err().unwrap();
        assert_eq!(err.status().message(), "busy");
    }

    #[tokio::test]
    async fn test_call_raw() {
        let client = BasicClient::new(Canned::new(StatusCode::OK, vec![b"\x00\x01"]));
        let raw = client.call_raw(&get()).await.unwrap();
        assert_eq!(&raw[..], b"\x00\x01");
    }
}
