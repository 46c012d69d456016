//! Handler registry binding route names to handlers.
//!
//! # Example
//!
//! ```
//! use rapidwire::handler::{Call, HandlerRegistry, Path, Reply};
//!
//! #[derive(serde::Deserialize)]
//! struct UserPath {
//!     username: String,
//! }
//! impl rapidwire::handler::Validate for UserPath {}
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("GetUser", |call: Call<Path<UserPath>>| async move {
//!     Reply::data(&call.path().username)
//! });
//! assert!(registry.contains("GetUser"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use super::context::{Call, FromBody, FromPath, FromQuery, RequestParts};
use super::reply::HandlerResult;
use crate::status::HandlerError;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handler with the fixed signature the dispatcher calls.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, parts: RequestParts) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that decodes the declared inputs before calling the handler.
pub struct TypedHandler<F, P, Q, B, Fut> {
    handler: F,
    _phantom: PhantomData<fn(P, Q, B) -> Fut>,
}

impl<F, P, Q, B, Fut> TypedHandler<F, P, Q, B, Fut>
where
    F: Fn(Call<P, Q, B>) -> Fut + Send + Sync + 'static,
    P: FromPath + 'static,
    Q: FromQuery + 'static,
    B: FromBody + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, P, Q, B, Fut> Handler for TypedHandler<F, P, Q, B, Fut>
where
    F: Fn(Call<P, Q, B>) -> Fut + Send + Sync + 'static,
    P: FromPath + 'static,
    Q: FromQuery + 'static,
    B: FromBody + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, parts: RequestParts) -> BoxFuture<'static, HandlerResult> {
        let call = match Call::<P, Q, B>::from_parts(parts) {
            Ok(call) => call,
            Err(status) => return Box::pin(async move { Err(HandlerError::Status(status)) }),
        };
        Box::pin((self.handler)(call))
    }
}

/// Registry mapping route names to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for the route called `name`.
    ///
    /// The handler's argument type decides what gets decoded; see
    /// [`Call`]. Registering a name twice replaces the earlier handler.
    pub fn register<F, P, Q, B, Fut>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(Call<P, Q, B>) -> Fut + Send + Sync + 'static,
        P: FromPath + 'static,
        Q: FromQuery + 'static,
        B: FromBody + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(name, TypedHandler::new(handler))
    }

    /// Register a handler that works on the undecoded request.
    pub fn register_handler(&mut self, name: &str, handler: impl Handler) -> &mut Self {
        self.handlers.insert(name.to_string(), Box::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.handlers.get(name).map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered route names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}
