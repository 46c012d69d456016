//! Call context and parameter extractors.
//!
//! A handler declares what it needs through the type parameters of
//! [`Call`]: `Call<Path<P>, Query<Q>, Body<B>>` receives all three, while
//! `Call` alone receives nothing but the raw params, headers and the
//! cancellation signal. Decoding runs in the order path, query, body, and
//! the first failure answers the request with `400 Bad Request`.
//!
//! # Example
//!
//! ```
//! use rapidwire::handler::{Body, Call, Path, Reply, Validate};
//! use rapidwire::Status;
//!
//! #[derive(serde::Deserialize)]
//! struct UserPath {
//!     username: String,
//! }
//! impl Validate for UserPath {}
//!
//! #[derive(serde::Deserialize)]
//! struct Rename {
//!     name: String,
//! }
//! impl Validate for Rename {
//!     fn validate(&self) -> Result<(), Status> {
//!         if self.name.is_empty() {
//!             return Err(Status::bad_request("name must not be empty"));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! async fn rename(call: Call<Path<UserPath>, (), Body<Rename>>) -> rapidwire::handler::HandlerResult {
//!     let (path, _, body) = call.into_parts();
//!     Reply::data(&format!("{} -> {}", path.username, body.name))
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::stream::{self, Emitter, StreamReply};
use crate::codec::{FileUpload, PayloadCodec, Protocol, RawData};
use crate::schema::Params;
use crate::status::Status;

/// Everything the dispatcher knows about one matched request.
pub struct RequestParts {
    pub method: Method,
    pub headers: HeaderMap,
    pub params: Params,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    pub body: Bytes,
    pub protocol: Arc<dyn Protocol>,
    pub cancellation: CancellationToken,
    /// Queue capacity for streams opened through [`Call::stream`].
    pub stream_capacity: usize,
}

/// Self-validation run right after a value is decoded.
///
/// The default accepts everything; record types opt in with an empty
/// `impl Validate for T {}` or override `validate`.
pub trait Validate {
    fn validate(&self) -> Result<(), Status> {
        Ok(())
    }
}

macro_rules! accept_all {
    ($($ty:ty),* $(,)?) => {
        $(impl Validate for $ty {})*
    };
}

accept_all!(
    bool, char, String, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    serde_json::Value,
);

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> Result<(), Status> {
        self.as_ref().map_or(Ok(()), Validate::validate)
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), Status> {
        self.iter().try_for_each(Validate::validate)
    }
}

impl<K, V: Validate, S> Validate for HashMap<K, V, S> {
    fn validate(&self) -> Result<(), Status> {
        self.values().try_for_each(Validate::validate)
    }
}

impl<K, V: Validate> Validate for BTreeMap<K, V> {
    fn validate(&self) -> Result<(), Status> {
        self.values().try_for_each(Validate::validate)
    }
}

macro_rules! extractor {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name<T>(pub T);

        impl<T> $name<T> {
            #[inline]
            pub fn into_inner(self) -> T {
                self.0
            }
        }

        impl<T> Deref for $name<T> {
            type Target = T;

            fn deref(&self) -> &T {
                &self.0
            }
        }

        impl<T> DerefMut for $name<T> {
            fn deref_mut(&mut self) -> &mut T {
                &mut self.0
            }
        }
    };
}

extractor! {
    /// Path parameters decoded from the matched template.
    Path
}

extractor! {
    /// Query parameters decoded from the query string.
    Query
}

extractor! {
    /// Request body decoded by the active protocol.
    Body
}

/// Types that can be built from matched path parameters.
pub trait FromPath: Sized {
    fn from_path(params: &Params) -> Result<Self, Status>;
}

/// Types that can be built from the query string.
pub trait FromQuery: Sized {
    fn from_query(query: Option<&str>) -> Result<Self, Status>;
}

/// Types that can be built from the request body.
pub trait FromBody: Sized {
    fn from_body(headers: &HeaderMap, body: Bytes, protocol: &dyn Protocol) -> Result<Self, Status>;
}

impl FromPath for () {
    fn from_path(_params: &Params) -> Result<Self, Status> {
        Ok(())
    }
}

impl<T: DeserializeOwned + Validate> FromPath for Path<T> {
    fn from_path(params: &Params) -> Result<Self, Status> {
        let value: T = params.decode()?;
        value.validate()?;
        Ok(Path(value))
    }
}

impl FromQuery for () {
    fn from_query(_query: Option<&str>) -> Result<Self, Status> {
        Ok(())
    }
}

impl<T: DeserializeOwned + Validate> FromQuery for Query<T> {
    fn from_query(query: Option<&str>) -> Result<Self, Status> {
        let value: T = serde_urlencoded::from_str(query.unwrap_or(""))
            .map_err(|e| Status::bad_request(format!("invalid query: {e}")))?;
        value.validate()?;
        Ok(Query(value))
    }
}

impl FromBody for () {
    fn from_body(_headers: &HeaderMap, _body: Bytes, _protocol: &dyn Protocol) -> Result<Self, Status> {
        Ok(())
    }
}

impl<T: DeserializeOwned + Validate> FromBody for Body<T> {
    fn from_body(_headers: &HeaderMap, body: Bytes, protocol: &dyn Protocol) -> Result<Self, Status> {
        let value = protocol
            .decode_value(&body)
            .map_err(|e| Status::bad_request(format!("invalid body: {e}")))?;
        let value: T =
            serde_json::from_value(value).map_err(|e| Status::bad_request(format!("invalid body: {e}")))?;
        value.validate()?;
        Ok(Body(value))
    }
}

impl FromBody for RawData {
    fn from_body(headers: &HeaderMap, body: Bytes, _protocol: &dyn Protocol) -> Result<Self, Status> {
        RawData::from_parts(headers, body).map_err(|e| Status::bad_request(e.to_string()))
    }
}

impl FromBody for FileUpload {
    fn from_body(headers: &HeaderMap, body: Bytes, _protocol: &dyn Protocol) -> Result<Self, Status> {
        FileUpload::from_parts(headers, body).map_err(|e| Status::bad_request(e.to_string()))
    }
}

/// The decoded inputs of one handler invocation.
pub struct Call<P = (), Q = (), B = ()> {
    path: P,
    query: Q,
    body: B,
    params: Params,
    method: Method,
    headers: HeaderMap,
    cancellation: CancellationToken,
    stream_capacity: usize,
}

impl<P, Q, B> Call<P, Q, B>
where
    P: FromPath,
    Q: FromQuery,
    B: FromBody,
{
    /// Decode path, query and body, in that order.
    pub fn from_parts(parts: RequestParts) -> Result<Self, Status> {
        let path = P::from_path(&parts.params)?;
        let query = Q::from_query(parts.query.as_deref())?;
        let body = B::from_body(&parts.headers, parts.body, parts.protocol.as_ref())?;
        Ok(Self {
            path,
            query,
            body,
            params: parts.params,
            method: parts.method,
            headers: parts.headers,
            cancellation: parts.cancellation,
            stream_capacity: parts.stream_capacity,
        })
    }
}

impl<P, Q, B> Call<P, Q, B> {
    #[inline]
    pub fn path(&self) -> &P {
        &self.path
    }

    #[inline]
    pub fn query(&self) -> &Q {
        &self.query
    }

    #[inline]
    pub fn body(&self) -> &B {
        &self.body
    }

    /// Raw path parameters.
    #[inline]
    pub fn params(&self) -> &Params {
        &self.params
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Cancelled when the peer disconnects from a streaming response.
    ///
    /// Cancellation is advisory; a handler that ignores it simply stops
    /// being read.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Open a stream reply with the dispatcher's configured capacity.
    pub fn stream<T: Serialize>(&self) -> (Emitter<T>, StreamReply) {
        let (emitter, reply) = stream::channel(self.stream_capacity);
        (emitter.with_cancellation(self.cancellation.clone()), reply)
    }

    /// Take ownership of the decoded path, query and body.
    pub fn into_parts(self) -> (P, Q, B) {
        (self.path, self.query, self.body)
    }
}
