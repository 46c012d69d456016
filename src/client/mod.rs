//! Client module - building and issuing requests.
//!
//! Provides:
//! - [`RequestBuilder`] / [`RequestTemplate`] - reusable encoded requests
//! - [`Client`] - the calling surface, implemented by [`BasicClient`] and
//!   [`RetryingClient`]
//! - [`ClientStream`] - lazy, forward-only decoding of a streamed response
//! - [`Backoff`] policies for retries
//!
//! # Example
//!
//! ```no_run
//! use http::Method;
//! use rapidwire::client::{BasicClient, Client, ClientExt, RequestBuilder};
//! use rapidwire::transport::HttpTransport;
//!
//! # async fn run() -> rapidwire::Result<()> {
//! let client = BasicClient::new(HttpTransport::new("http://127.0.0.1:8080"));
//! let request = RequestBuilder::new(Method::GET, "/users/{username}", &[&"alice"]).build()?;
//! let user: serde_json::Value = client.call_as(&request).await?;
//!
//! let mut changes = client.stream(&rapidwire::request(Method::GET, "/changes", &[]).build()?).await?;
//! while let Some(change) = changes.next().await? {
//!     println!("{change}");
//! }
//! changes.close().await?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod basic;
mod hooks;
mod request;
mod retry;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::codec::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::Result;

pub use backoff::{
    Backoff, ConstantBackoff, ExponentialBackoff, DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_INTERVAL,
    DEFAULT_MULTIPLIER,
};
pub use basic::{BasicClient, BasicStream};
pub use hooks::{BearerAuth, BeforeRequest};
pub use request::{RequestBuilder, RequestTemplate};
pub use retry::{RetryingClient, RetryingStream};

/// Configuration for [`BasicClient`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Largest scalar body or single stream item accepted.
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

/// Issues requests and decodes their envelopes.
#[async_trait]
pub trait Client: Send + Sync {
    /// Send `request` and return the decoded payload.
    ///
    /// A failure envelope or a non-2xx status becomes
    /// [`RapidError::Status`](crate::RapidError::Status).
    async fn call(&self, request: &RequestTemplate) -> Result<Value>;

    /// Open a streamed response.
    async fn stream(&self, request: &RequestTemplate) -> Result<Box<dyn ClientStream>>;

    /// Release transport resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A streamed response, decoded one item at a time.
#[async_trait]
pub trait ClientStream: Send {
    /// The next item, or `None` once the stream ended cleanly.
    ///
    /// An error item ends the stream; later calls return `None`.
    async fn next(&mut self) -> Result<Option<Value>>;

    /// Release the connection. Safe to call after an error and more than
    /// once.
    async fn close(&mut self) -> Result<()>;
}

/// Typed helpers over [`Client`].
#[async_trait]
pub trait ClientExt: Client {
    async fn call_as<T: DeserializeOwned + Send>(&self, request: &RequestTemplate) -> Result<T> {
        let value = self.call(request).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl<C: Client + ?Sized> ClientExt for C {}

/// Typed helpers over [`ClientStream`].
#[async_trait]
pub trait ClientStreamExt: ClientStream {
    async fn next_as<T: DeserializeOwned + Send>(&mut self) -> Result<Option<T>> {
        match self.next().await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

impl<S: ClientStream + ?Sized> ClientStreamExt for S {}

#[async_trait]
impl<S: ClientStream + ?Sized> ClientStream for Box<S> {
    async fn next(&mut self) -> Result<Option<Value>> {
        (**self).next().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}
