//! # rapidwire
//!
//! Schema-driven RPC over HTTP.
//!
//! A service is described once as a [`Schema`](schema::Schema) of resources
//! and routes. The server side binds handlers to route names and serves
//! requests through a [`Dispatcher`](server::Dispatcher); the client side
//! builds requests from the same path templates and decodes the same
//! envelopes.
//!
//! ## Architecture
//!
//! - **Schema**: routes with path templates, declared types and statuses,
//!   validated once at build time
//! - **Codec**: pluggable wire protocols (JSON, MessagePack) plus raw byte
//!   and file payloads that bypass the envelope
//! - **Server**: route matching, parameter decoding, handler invocation and
//!   a streaming multiplexer with cooperative cancellation
//! - **Client**: reusable request templates, envelope decoding, streamed
//!   responses and retries with backoff
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use http::StatusCode;
//! use rapidwire::handler::{Call, HandlerRegistry, Path, Reply};
//! use rapidwire::schema::{Resource, ResponseSpec, Route, Schema};
//! use rapidwire::server::{router, Dispatcher};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct UserPath {
//!     username: String,
//! }
//! impl rapidwire::handler::Validate for UserPath {}
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = Schema::new("Users")
//!         .resource(Resource::new("Users", "/users").route(
//!             Route::get("GetUser", "/users/{username}")
//!                 .path_params::<UserPath>()
//!                 .response(ResponseSpec::new(StatusCode::OK).body::<String>()),
//!         ))
//!         .build()?;
//!
//!     let mut handlers = HandlerRegistry::new();
//!     handlers.register("GetUser", |call: Call<Path<UserPath>>| async move {
//!         Reply::data(&call.path().username)
//!     });
//!
//!     let dispatcher = Arc::new(Dispatcher::new(schema, handlers)?);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, router(dispatcher)).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod handler;
pub mod schema;
pub mod server;
pub mod status;
pub mod transport;

use std::fmt::Display;

use http::Method;

pub use error::{RapidError, Result};
pub use status::{HandlerError, Status};

/// Start building a client request.
///
/// Shorthand for [`client::RequestBuilder::new`].
pub fn request(method: Method, template: impl Into<String>, args: &[&dyn Display]) -> client::RequestBuilder {
    client::RequestBuilder::new(method, template, args)
}
