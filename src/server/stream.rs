//! Streaming response loop.
//!
//! Multiplexes three event sources into one ordered chunked body:
//!
//! 1. Before anything is written, the error queue is probed without
//!    waiting. A pending error becomes a complete error response, head
//!    included.
//! 2. Otherwise the success head is written and flushed.
//! 3. The loop then waits on peer disconnect, the next item and the next
//!    error. When several are ready at once they are taken in that order,
//!    so queued items are always delivered before a queued error.
//!
//! The body is closed on every exit path. Dropping the [`StreamReply`] on
//! exit closes both queues, which releases a producer blocked on a full
//! queue.

use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

use super::writer::ResponseWriter;
use super::write_scalar;
use crate::codec::{Envelope, Payload, Protocol};
use crate::error::{RapidError, Result};
use crate::handler::StreamReply;
use crate::status::{translate, HandlerError, Status, Translated};

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    /// An error was pending before the head; sent as a scalar response.
    Rejected,
    /// The producer finished.
    Completed,
    /// The producer reported an error mid-stream.
    Failed,
    /// The peer went away.
    Disconnected,
}

pub(crate) async fn serve_stream<W: ResponseWriter + ?Sized>(
    writer: &mut W,
    protocol: &dyn Protocol,
    method: &Method,
    success: Translated,
    mut reply: StreamReply,
    cancellation: &CancellationToken,
) -> Result<StreamEnd> {
    if let Ok(err) = reply.errors.try_recv() {
        let t = translate(method, None, Some(err));
        write_scalar(writer, protocol, t, Payload::Empty).await?;
        return Ok(StreamEnd::Rejected);
    }

    let mut headers = success.headers;
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(protocol.content_type()));
    writer.write_head(success.code, headers).await?;
    writer.flush().await?;

    let end = pump(writer, protocol, method, &mut reply, cancellation).await;
    drop(reply);

    let closed = writer.close().await;
    match end {
        Ok(StreamEnd::Disconnected) => Ok(StreamEnd::Disconnected),
        Ok(end) => closed.map(|_| end),
        Err(RapidError::ConnectionClosed) => {
            tracing::warn!("peer disconnected while writing stream");
            cancellation.cancel();
            Ok(StreamEnd::Disconnected)
        }
        Err(e) => {
            cancellation.cancel();
            Err(e)
        }
    }
}

async fn pump<W: ResponseWriter + ?Sized>(
    writer: &mut W,
    protocol: &dyn Protocol,
    method: &Method,
    reply: &mut StreamReply,
    cancellation: &CancellationToken,
) -> Result<StreamEnd> {
    let mut errors_open = true;
    loop {
        tokio::select! {
            biased;

            _ = writer.disconnected() => {
                tracing::warn!("peer disconnected from stream");
                cancellation.cancel();
                return Ok(StreamEnd::Disconnected);
            }

            item = reply.data.recv() => match item {
                Some(value) => {
                    let chunk = protocol.encode_stream_item(&Envelope::success(StatusCode::OK.as_u16(), value))?;
                    writer.write_chunk(chunk).await?;
                    writer.flush().await?;
                }
                None => {
                    if let Ok(err) = reply.errors.try_recv() {
                        write_error(writer, protocol, method, err).await?;
                        return Ok(StreamEnd::Failed);
                    }
                    return Ok(StreamEnd::Completed);
                }
            },

            err = reply.errors.recv(), if errors_open => match err {
                Some(err) => {
                    write_error(writer, protocol, method, err).await?;
                    return Ok(StreamEnd::Failed);
                }
                None => errors_open = false,
            },
        }
    }
}

async fn write_error<W: ResponseWriter + ?Sized>(
    writer: &mut W,
    protocol: &dyn Protocol,
    method: &Method,
    err: HandlerError,
) -> Result<()> {
    let t = translate(method, None, Some(err));
    let status = t.error.unwrap_or_else(Status::internal);
    let chunk = protocol.encode_stream_item(&Envelope::failure(&status))?;
    writer.write_chunk(chunk).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Framing, JsonProtocol, MessageBuffer};
    use crate::handler::stream::channel;
    use crate::server::writer::channel_writer;
    use bytes::Bytes;
    use serde_json::Value;

    fn ok(method: &Method) -> Translated {
        translate(method, None, None)
    }

    async fn collect(mut body: tokio::sync::mpsc::Receiver<Bytes>) -> Vec<Value> {
        let mut buffer = MessageBuffer::new(Framing::Delimited(b'\n'));
        let mut out = Vec::new();
        while let Some(chunk) = body.recv().await {
            for message in buffer.push(&chunk).unwrap() {
                out.push(serde_json::from_slice(&message).unwrap());
            }
        }
        if let Some(tail) = buffer.finish().unwrap() {
            out.push(serde_json::from_slice(&tail).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_items_then_clean_end() {
        let (tx, reply) = channel::<u32>(8);
        for i in 0..3 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        let (mut writer, rx) = channel_writer(16);
        let end = serve_stream(&mut writer, &JsonProtocol, &Method::GET, ok(&Method::GET), reply, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(end, StreamEnd::Completed);
        assert_eq!(rx.head.await.unwrap().status, StatusCode::OK);

        let items = collect(rx.body).await;
        assert_eq!(items.len(), 3);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item["status"], 200);
            assert_eq!(item["data"], i);
        }
    }

    #[tokio::test]
    async fn test_pending_error_rejects_stream() {
        let (tx, reply) = channel::<u32>(8);
        tx.send(0).await.unwrap();
        tx.fail(Status::new(StatusCode::CONFLICT, "stale")).await.unwrap();

        let (mut writer, rx) = channel_writer(16);
        let end = serve_stream(&mut writer, &JsonProtocol, &Method::GET, ok(&Method::GET), reply, &CancellationToken::new())
            .await
            .unwrap();

        // The error was already queued, so the probe rejects the stream.
        assert_eq!(end, StreamEnd::Rejected);
        assert_eq!(rx.head.await.unwrap().status, StatusCode::CONFLICT);
        let body = collect(rx.body).await;
        assert_eq!(body, vec![serde_json::json!({"status": 409, "error": "stale"})]);
    }

    #[tokio::test]
    async fn test_error_mid_stream() {
        let (tx, reply) = channel::<u32>(8);
        let (mut writer, rx) = channel_writer(16);

        let producer = tokio::spawn(async move {
            tx.send(0).await.unwrap();
            tokio::task::yield_now().await;
            tx.fail(HandlerError::msg("disk on fire")).await.unwrap();
        });
        let end = serve_stream(&mut writer, &JsonProtocol, &Method::GET, ok(&Method::GET), reply, &CancellationToken::new())
            .await
            .unwrap();
        producer.await.unwrap();

        assert_eq!(end, StreamEnd::Failed);
        let items = collect(rx.body).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["data"], 0);
        assert_eq!(items[1], serde_json::json!({"status": 500, "error": "Internal Server Error"}));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_producer() {
        let (tx, reply) = channel::<u32>(1);
        let (mut writer, rx) = channel_writer(1);
        let token = CancellationToken::new();
        let tx = tx.with_cancellation(token.clone());

        let producer = tokio::spawn(async move {
            let mut sent = 0;
            while tx.send(sent).await.is_ok() {
                sent += 1;
            }
            sent
        });

        let consumer = tokio::spawn(async move {
            let mut body = rx.body;
            body.recv().await;
            drop(body);
        });

        let end = serve_stream(&mut writer, &JsonProtocol, &Method::GET, ok(&Method::GET), reply, &token)
            .await
            .unwrap();
        consumer.await.unwrap();

        assert_eq!(end, StreamEnd::Disconnected);
        assert!(token.is_cancelled());
        // The producer is released rather than left blocked on a full queue.
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_success_hint_used_for_head() {
        let (tx, reply) = channel::<u32>(1);
        drop(tx);
        let (mut writer, rx) = channel_writer(4);
        serve_stream(
            &mut writer,
            &JsonProtocol,
            &Method::POST,
            translate(&Method::POST, Some(StatusCode::ACCEPTED), None),
            reply,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let head = rx.head.await.unwrap();
        assert_eq!(head.status, StatusCode::ACCEPTED);
        assert_eq!(head.headers[CONTENT_TYPE], "application/json");
    }
}
