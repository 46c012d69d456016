//! HTTP transport over `reqwest`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::Request;
use reqwest::Client;

use super::{Transport, TransportResponse};
use crate::error::{RapidError, Result};

/// Sends requests to a server at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for `base_url`, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Use a preconfigured `reqwest` client (timeouts, proxies, pools).
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, request: &Request<Bytes>) -> String {
        let path = request.uri().path_and_query().map(|p| p.as_str()).unwrap_or("/");
        format!("{}{}", self.base_url, path)
    }
}

fn transport_error(err: reqwest::Error) -> RapidError {
    RapidError::Transport(err.to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<TransportResponse> {
        let url = self.url(&request);
        let (parts, body) = request.into_parts();
        tracing::debug!(method = %parts.method, %url, "sending request");

        let response = self
            .client
            .request(parts.method, url)
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        Ok(TransportResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.bytes_stream().map(|chunk| chunk.map_err(transport_error)).boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_path() {
        let transport = HttpTransport::new("http://localhost:8080/");
        let request = Request::get("/users/bob?active=true").body(Bytes::new()).unwrap();
        assert_eq!(transport.url(&request), "http://localhost:8080/users/bob?active=true");
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1");
        let request = Request::get("/").body(Bytes::new()).unwrap();
        let err = transport.send(request).await.unwrap_err();
        assert!(matches!(err, RapidError::Transport(_)));
    }
}
