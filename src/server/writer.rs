//! Response sink used by the dispatcher.
//!
//! The dispatcher writes through the [`ResponseWriter`] trait so it does
//! not depend on a particular HTTP stack. [`channel_writer`] provides the
//! standard implementation: the head goes over a oneshot, body chunks go
//! over a bounded mpsc channel, and dropping the body receiver is how the
//! peer signals a disconnect.
//!
//! ```text
//! Dispatcher ─► ChannelWriter ─► mpsc::Sender<Bytes> ─► HTTP body / client
//!                     ▲                                     │
//!                     └────────── closed() on drop ◄────────┘
//! ```
//!
//! Chunks are buffered until [`ResponseWriter::flush`], so a scalar
//! response reaches the peer as one chunk and every streamed item as one
//! chunk per flush.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use tokio::sync::{mpsc, oneshot};

use crate::error::{RapidError, Result};

/// Default number of body chunks buffered between writer and peer.
pub const DEFAULT_BODY_CHANNEL_CAPACITY: usize = 16;

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct Head {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// An incrementally written response.
#[async_trait]
pub trait ResponseWriter: Send + Sync {
    /// Write the status line and headers. Must be called exactly once,
    /// before any chunk.
    async fn write_head(&mut self, status: StatusCode, headers: HeaderMap) -> Result<()>;

    /// Append bytes to the body.
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()>;

    /// Push everything written so far to the peer.
    async fn flush(&mut self) -> Result<()>;

    /// Flush and end the body. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;

    /// Resolves once the peer has gone away.
    async fn disconnected(&self);
}

/// Receiving half of a [`channel_writer`].
#[derive(Debug)]
pub struct ResponseReceiver {
    pub head: oneshot::Receiver<Head>,
    pub body: mpsc::Receiver<Bytes>,
}

/// [`ResponseWriter`] backed by channels.
#[derive(Debug)]
pub struct ChannelWriter {
    head: Option<oneshot::Sender<Head>>,
    body: Option<mpsc::Sender<Bytes>>,
    buffer: BytesMut,
}

/// Create a writer and the receiver the peer reads from.
pub fn channel_writer(capacity: usize) -> (ChannelWriter, ResponseReceiver) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(capacity.max(1));
    (
        ChannelWriter {
            head: Some(head_tx),
            body: Some(body_tx),
            buffer: BytesMut::new(),
        },
        ResponseReceiver {
            head: head_rx,
            body: body_rx,
        },
    )
}

#[async_trait]
impl ResponseWriter for ChannelWriter {
    async fn write_head(&mut self, status: StatusCode, headers: HeaderMap) -> Result<()> {
        let head = self
            .head
            .take()
            .ok_or_else(|| RapidError::Protocol("response head already written".to_string()))?;
        head.send(Head { status, headers })
            .map_err(|_| RapidError::ConnectionClosed)
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        if self.head.is_some() {
            return Err(RapidError::Protocol("body written before head".to_string()));
        }
        if self.body.is_none() {
            return Err(RapidError::ConnectionClosed);
        }
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let Some(body) = &self.body else {
            return Err(RapidError::ConnectionClosed);
        };
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = self.buffer.split().freeze();
        body.send(chunk).await.map_err(|_| RapidError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        if self.body.is_none() {
            return Ok(());
        }
        let flushed = self.flush().await;
        self.body = None;
        flushed
    }

    async fn disconnected(&self) {
        match &self.body {
            Some(body) => body.closed().await,
            None => std::future::pending().await,
        }
    }
}
