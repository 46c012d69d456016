//! In-process transport.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::Request;

use super::{Transport, TransportResponse};
use crate::error::{RapidError, Result};
use crate::server::{channel_writer, Dispatcher, DEFAULT_BODY_CHANNEL_CAPACITY};

/// Runs every request through a [`Dispatcher`] in the same process.
///
/// Each request is dispatched on its own task, exactly as the HTTP
/// binding does, so streaming and disconnect behave the same way.
/// Dropping the response body is seen by the dispatcher as a disconnect.
#[derive(Clone)]
pub struct LocalTransport {
    dispatcher: Arc<Dispatcher>,
    body_capacity: usize,
}

impl LocalTransport {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            body_capacity: DEFAULT_BODY_CHANNEL_CAPACITY,
        }
    }

    /// Body chunks buffered between dispatcher and client.
    pub fn with_body_capacity(mut self, capacity: usize) -> Self {
        self.body_capacity = capacity;
        self
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<TransportResponse> {
        let (writer, rx) = channel_writer(self.body_capacity);
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(request, writer).await {
                tracing::debug!(error = %e, "local response not completed");
            }
        });

        let head = rx.head.await.map_err(|_| RapidError::ConnectionClosed)?;
        let body = futures::stream::unfold(rx.body, |mut body| async move {
            body.recv().await.map(|chunk| (Ok::<_, RapidError>(chunk), body))
        });
        Ok(TransportResponse {
            status: head.status,
            headers: head.headers,
            body: body.boxed(),
        })
    }
}
