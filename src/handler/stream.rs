//! Producer side of a streaming reply.
//!
//! A streaming handler returns a [`StreamReply`] and keeps the matching
//! [`Emitter`], usually inside a spawned task. Items and the terminal error
//! travel on two independent queues so the dispatcher can tell "next item"
//! and "stream failed" apart while waiting on both.
//!
//! # Example
//!
//! ```no_run
//! use rapidwire::handler::{stream, Reply};
//!
//! let (tx, reply) = stream::channel::<u32>(8);
//! tokio::spawn(async move {
//!     for i in 0..3 {
//!         if tx.send(i).await.is_err() {
//!             break;
//!         }
//!     }
//! });
//! let reply = Reply::Stream(reply);
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{RapidError, Result};
use crate::status::HandlerError;

/// Create a stream with room for `capacity` unread items.
pub fn channel<T: Serialize>(capacity: usize) -> (Emitter<T>, StreamReply) {
    let (data_tx, data_rx) = mpsc::channel(capacity.max(1));
    let (error_tx, error_rx) = mpsc::channel(1);
    (
        Emitter {
            data: data_tx,
            errors: error_tx,
            cancellation: None,
            _item: PhantomData,
        },
        StreamReply {
            data: data_rx,
            errors: error_rx,
        },
    )
}

/// Sends items of type `T` into a stream.
///
/// Dropping the emitter ends the stream cleanly.
pub struct Emitter<T> {
    data: mpsc::Sender<Value>,
    errors: mpsc::Sender<HandlerError>,
    cancellation: Option<CancellationToken>,
    _item: PhantomData<fn(T)>,
}

impl<T: Serialize> Emitter<T> {
    pub(crate) fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Send one item, waiting for queue space.
    ///
    /// # Errors
    ///
    /// Returns [`RapidError::ConnectionClosed`] once the consumer is gone,
    /// or a JSON error if the item cannot be represented.
    pub async fn send(&self, item: T) -> Result<()> {
        let value = serde_json::to_value(&item)?;
        self.data
            .send(value)
            .await
            .map_err(|_| RapidError::ConnectionClosed)
    }

    /// End the stream with an error. No further items are sent.
    pub async fn fail(self, err: impl Into<HandlerError>) -> Result<()> {
        self.errors
            .send(err.into())
            .await
            .map_err(|_| RapidError::ConnectionClosed)
    }

    /// Resolves once the consumer has gone away.
    pub async fn cancelled(&self) {
        match &self.cancellation {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = self.data.closed() => {}
                }
            }
            None => self.data.closed().await,
        }
    }

    /// Whether the consumer has gone away.
    pub fn is_cancelled(&self) -> bool {
        self.data.is_closed() || self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("closed", &self.data.is_closed())
            .finish()
    }
}

/// Consumer side of a stream, returned by the handler.
///
/// Dropping it closes both queues, which unblocks a producer waiting on a
/// full queue.
pub struct StreamReply {
    pub(crate) data: mpsc::Receiver<Value>,
    pub(crate) errors: mpsc::Receiver<HandlerError>,
}

impl fmt::Debug for StreamReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReply").finish_non_exhaustive()
    }
}
