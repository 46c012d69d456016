//! Server core - request dispatch.
//!
//! A [`Dispatcher`] is built once from a validated [`Schema`] and a
//! [`HandlerRegistry`]. It compiles every route's path template up front
//! and is then immutable, so one `Arc<Dispatcher>` serves every request
//! concurrently.
//!
//! Per request it runs:
//!
//! ```text
//! Received ─► Matched ─► Decoded ─► Invoked ─► Scalar response
//!    │           │                      └────► Stream opened ─► items* ─► closed
//!    └► 404      └► 400
//! ```
//!
//! Routes are tried in declaration order and the first route whose method
//! and path both match wins. A wildcard-method route declared before a
//! specific one for the same path shadows it.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use http::StatusCode;
//! use rapidwire::handler::{Call, HandlerRegistry, Reply};
//! use rapidwire::schema::{Resource, ResponseSpec, Route, Schema};
//! use rapidwire::server::{channel_writer, Dispatcher};
//!
//! # tokio_test_block_on(async {
//! let schema = Schema::new("Hello")
//!     .resource(Resource::new("Hello", "/hello").route(
//!         Route::get("Hello", "/hello").response(ResponseSpec::new(StatusCode::OK).body::<String>()),
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register("Hello", |_: Call| async { Reply::data("world") });
//! let dispatcher = Dispatcher::new(schema, handlers).unwrap();
//!
//! let (writer, mut rx) = channel_writer(4);
//! let request = http::Request::get("/hello").body(Bytes::new()).unwrap();
//! dispatcher.dispatch(request, writer).await.unwrap();
//!
//! assert_eq!(rx.head.await.unwrap().status, StatusCode::OK);
//! assert_eq!(rx.body.recv().await.unwrap(), r#"{"status":200,"data":"world"}"#);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

mod router;
mod stream;
mod writer;

use std::sync::Arc;

use http::{Method, Request, StatusCode};
use bytes::Bytes;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::codec::{encode_response, JsonProtocol, Payload, Protocol};
use crate::error::{RapidError, Result};
use crate::handler::{HandlerRegistry, Reply, RequestParts};
use crate::schema::{Params, PathPattern, Schema};
use crate::status::{translate, HandlerError, Status, Translated};

pub use router::router;
pub use writer::{channel_writer, ChannelWriter, Head, ResponseReceiver, ResponseWriter, DEFAULT_BODY_CHANNEL_CAPACITY};

/// Default capacity of the item queue behind [`Call::stream`](crate::handler::Call::stream).
pub const DEFAULT_STREAM_CHANNEL_CAPACITY: usize = 16;

/// Default maximum accepted request body (8 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Configuration for a [`Dispatcher`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Unread items a stream producer may queue before `send` waits.
    pub stream_channel_capacity: usize,
    /// Larger request bodies are answered with `413 Payload Too Large`.
    pub max_body_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            stream_channel_capacity: DEFAULT_STREAM_CHANNEL_CAPACITY,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl DispatcherConfig {
    pub fn stream_channel_capacity(mut self, capacity: usize) -> Self {
        self.stream_channel_capacity = capacity;
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }
}

#[derive(Debug)]
struct CompiledRoute {
    name: String,
    method: Option<Method>,
    pattern: PathPattern,
    streaming: bool,
    success: Option<StatusCode>,
}

/// Routes requests to handlers and encodes their replies.
pub struct Dispatcher {
    schema: Arc<Schema>,
    routes: Vec<CompiledRoute>,
    handlers: HandlerRegistry,
    protocol: Arc<dyn Protocol>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Compile `schema` and bind every route to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`RapidError::HandlerNotFound`] if a route that is not hidden
    /// has no handler. Hidden routes without a handler are left unrouted.
    pub fn new(schema: Schema, handlers: HandlerRegistry) -> Result<Self> {
        let mut routes = Vec::new();
        for route in schema.routes() {
            if !handlers.contains(route.name()) {
                if route.is_hidden() {
                    tracing::debug!(route = route.name(), "hidden route has no handler, skipping");
                    continue;
                }
                tracing::error!(route = route.name(), "no handler registered for route");
                return Err(RapidError::HandlerNotFound(route.name().to_string()));
            }
            routes.push(CompiledRoute {
                name: route.name().to_string(),
                method: route.method().cloned(),
                pattern: PathPattern::compile(route.path())?,
                streaming: route.is_streaming(),
                success: route.success_status(),
            });
        }

        Ok(Self {
            schema: Arc::new(schema),
            routes,
            handlers,
            protocol: Arc::new(JsonProtocol),
            config: DispatcherConfig::default(),
        })
    }

    /// Replace the default JSON protocol.
    pub fn with_protocol(mut self, protocol: impl Protocol + 'static) -> Self {
        self.protocol = Arc::new(protocol);
        self
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn protocol(&self) -> Arc<dyn Protocol> {
        self.protocol.clone()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    fn match_route(&self, method: &Method, path: &str) -> Option<(&CompiledRoute, Params)> {
        self.routes.iter().find_map(|route| {
            if route.method.as_ref().is_some_and(|m| m != method) {
                return None;
            }
            route.pattern.matches(path).map(|params| (route, params))
        })
    }

    /// Serve one request, writing the response to `writer`.
    ///
    /// Routing, decode and handler errors all become responses. An `Err`
    /// means the response itself could not be written, typically because
    /// the peer went away.
    pub async fn dispatch<W: ResponseWriter>(&self, request: Request<Bytes>, mut writer: W) -> Result<()> {
        let (head, body) = request.into_parts();
        let method = head.method;
        let path = head.uri.path();
        tracing::debug!(%method, path, "dispatching request");

        let Some((route, params)) = self.match_route(&method, path) else {
            tracing::debug!(%method, path, "no route matched");
            return self.respond(&mut writer, &method, Status::not_found()).await;
        };
        tracing::debug!(route = %route.name, ?params, "matched route");

        if body.len() > self.config.max_body_size {
            let status = Status::for_code(StatusCode::PAYLOAD_TOO_LARGE);
            return self.respond(&mut writer, &method, status).await;
        }

        let Some(handler) = self.handlers.get(&route.name) else {
            tracing::error!(route = %route.name, "no handler registered for route");
            return self.respond(&mut writer, &method, Status::internal()).await;
        };

        let cancellation = CancellationToken::new();
        let parts = RequestParts {
            method: method.clone(),
            headers: head.headers,
            params,
            query: head.uri.query().map(str::to_string),
            body,
            protocol: self.protocol.clone(),
            cancellation: cancellation.clone(),
            stream_capacity: self.config.stream_channel_capacity,
        };

        let reply = match handler.call(parts).await {
            Ok(reply) => reply,
            Err(err) => {
                let t = translate(&method, route.success, Some(err));
                return write_scalar(&mut writer, self.protocol.as_ref(), t, Payload::Empty).await;
            }
        };

        let (status, reply) = reply.into_status();
        match (route.streaming, reply) {
            (true, Reply::Stream(stream)) => {
                let success = translate(&method, route.success, status.map(HandlerError::Status));
                if success.error.is_some() {
                    drop(stream);
                    return write_scalar(&mut writer, self.protocol.as_ref(), success, Payload::Empty).await;
                }
                tracing::debug!(route = %route.name, "streaming response");
                let end = stream::serve_stream(
                    &mut writer,
                    self.protocol.as_ref(),
                    &method,
                    success,
                    stream,
                    &cancellation,
                )
                .await?;
                tracing::debug!(route = %route.name, ?end, "stream finished");
                Ok(())
            }
            (false, reply) if !matches!(reply, Reply::Stream(_)) => {
                let t = translate(&method, route.success, status.map(HandlerError::Status));
                tracing::debug!(route = %route.name, status = t.code.as_u16(), "scalar response");
                write_scalar(&mut writer, self.protocol.as_ref(), t, into_payload(reply)).await
            }
            (streaming, _) => {
                tracing::error!(
                    route = %route.name,
                    streaming,
                    "handler reply does not match the route's streaming declaration"
                );
                self.respond(&mut writer, &method, Status::internal()).await
            }
        }
    }

    async fn respond<W: ResponseWriter + ?Sized>(&self, writer: &mut W, method: &Method, status: Status) -> Result<()> {
        let t = translate(method, None, Some(HandlerError::Status(status)));
        write_scalar(writer, self.protocol.as_ref(), t, Payload::Empty).await
    }

    /// Answer with `status` without routing, e.g. when the transport
    /// rejected the request body.
    pub async fn reject<W: ResponseWriter>(&self, method: &Method, status: Status, mut writer: W) -> Result<()> {
        self.respond(&mut writer, method, status).await
    }
}

fn into_payload(reply: Reply) -> Payload {
    match reply {
        Reply::Data(value) => Payload::Data(value),
        Reply::Raw(raw) => Payload::Raw(raw),
        Reply::File(file) => Payload::File(file),
        Reply::NoContent | Reply::Stream(_) | Reply::WithStatus(..) => Payload::Empty,
    }
}

/// Encode and write a complete, non-streamed response.
pub(crate) async fn write_scalar<W: ResponseWriter + ?Sized>(
    writer: &mut W,
    protocol: &dyn Protocol,
    t: Translated,
    payload: Payload,
) -> Result<()> {
    let encoded = encode_response(protocol, t.code, t.error.as_ref(), payload)?;
    let mut headers = t.headers;
    headers.extend(encoded.headers);
    writer.write_head(t.code, headers).await?;
    if !encoded.body.is_empty() {
        writer.write_chunk(encoded.body).await?;
    }
    writer.close().await
}
