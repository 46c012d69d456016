//! Handler module - registration and parameter injection.
//!
//! Provides:
//! - [`HandlerRegistry`] - maps route names to handlers
//! - [`Call`] - the decoded inputs a handler asked for
//! - [`Reply`] - what a handler returns on success
//! - [`stream`] - the producer side of streaming replies
//!
//! # Example
//!
//! ```
//! use rapidwire::handler::{Call, HandlerRegistry, Reply};
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register("Count", |call: Call| async move {
//!     let (tx, reply) = call.stream::<u32>();
//!     tokio::spawn(async move {
//!         for i in 0..3 {
//!             if tx.send(i).await.is_err() {
//!                 return;
//!             }
//!         }
//!     });
//!     Ok(Reply::Stream(reply))
//! });
//! ```

mod context;
mod registry;
mod reply;
pub mod stream;

pub use context::{Body, Call, FromBody, FromPath, FromQuery, Path, Query, RequestParts, Validate};
pub use registry::{BoxFuture, Handler, HandlerRegistry, TypedHandler};
pub use reply::{HandlerResult, Reply};
pub use stream::{Emitter, StreamReply};
