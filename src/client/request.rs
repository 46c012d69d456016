//! Request construction.
//!
//! A [`RequestBuilder`] resolves a path template against positional
//! arguments and encodes query and body up front. The resulting
//! [`RequestTemplate`] is immutable and can be sent any number of times,
//! which is what lets [`RetryingClient`](super::RetryingClient) re-issue it.

use std::fmt::{self, Display};
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, Uri};
use serde::Serialize;
use serde_json::Value;

use crate::codec::{FileUpload, JsonProtocol, PayloadCodec, Protocol, RawData};
use crate::error::{RapidError, Result};
use crate::schema::path::interpolate;

#[derive(Debug)]
enum PendingBody {
    Empty,
    Data(Value),
    Raw(RawData),
    Upload(FileUpload),
}

/// Builder for a [`RequestTemplate`].
///
/// Errors are deferred to [`build`](Self::build) so calls can be chained.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    template: String,
    args: Vec<String>,
    query: Option<String>,
    body: PendingBody,
    headers: HeaderMap,
    protocol: Arc<dyn Protocol>,
    error: Option<RapidError>,
}

impl RequestBuilder {
    /// Start a request for `template`, filling its placeholders with `args`
    /// in declaration order.
    pub fn new(method: Method, template: impl Into<String>, args: &[&dyn Display]) -> Self {
        Self {
            method,
            template: template.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            query: None,
            body: PendingBody::Empty,
            headers: HeaderMap::new(),
            protocol: Arc::new(JsonProtocol),
            error: None,
        }
    }

    /// Encode the body with `protocol` instead of JSON.
    pub fn protocol(mut self, protocol: Arc<dyn Protocol>) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the query string from a serializable value.
    pub fn query<T: Serialize + ?Sized>(mut self, query: &T) -> Self {
        match serde_urlencoded::to_string(query) {
            Ok(encoded) => self.query = Some(encoded),
            Err(e) => self.fail(e.into()),
        }
        self
    }

    /// Set a structured body, encoded with the request protocol.
    pub fn body<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = PendingBody::Data(value),
            Err(e) => self.fail(e.into()),
        }
        self
    }

    /// Send raw bytes as the body.
    pub fn raw(mut self, raw: RawData) -> Self {
        self.body = PendingBody::Raw(raw);
        self
    }

    /// Send a file as the body.
    pub fn upload(mut self, file: FileUpload) -> Self {
        self.body = PendingBody::Upload(file);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    fn fail(&mut self, err: RapidError) {
        self.error.get_or_insert(err);
    }

    /// Resolve the path and encode everything.
    ///
    /// # Errors
    ///
    /// Returns the first error from a chained call, a
    /// [`RapidError::Protocol`] if the argument count does not match the
    /// template, or [`RapidError::Http`] if the resulting URI is invalid.
    pub fn build(self) -> Result<RequestTemplate> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let mut uri = interpolate(&self.template, &self.args)?;
        if let Some(query) = self.query.filter(|q| !q.is_empty()) {
            uri.push('?');
            uri.push_str(&query);
        }
        let uri: Uri = uri.parse().map_err(http::Error::from)?;

        let mut headers = self.headers;
        let content_type = HeaderValue::from_static(self.protocol.content_type());
        headers.entry(ACCEPT).or_insert(content_type.clone());
        let body = match self.body {
            PendingBody::Empty => Bytes::new(),
            PendingBody::Data(value) => {
                headers.insert(CONTENT_TYPE, content_type);
                self.protocol.encode_value(&value)?
            }
            PendingBody::Raw(raw) => {
                raw.write_headers(&mut headers)?;
                raw.into_bytes()
            }
            PendingBody::Upload(file) => {
                file.write_headers(&mut headers)?;
                file.into_bytes()
            }
        };

        Ok(RequestTemplate {
            method: self.method,
            uri,
            headers,
            body,
        })
    }
}

/// A fully encoded request, ready to be sent.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestTemplate {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Resolved path, including the query string.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// A fresh request for one attempt.
    pub fn to_request(&self) -> Request<Bytes> {
        let mut request = Request::new(self.body.clone());
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }
}

impl Display for RequestTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackProtocol;
    use serde::Deserialize;

    #[derive(Serialize)]
    struct Search<'a> {
        q: &'a str,
        limit: u32,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct User {
        name: String,
    }

    #[test]
    fn test_positional_args() {
        let request = RequestBuilder::new(Method::GET, "/users/{username}/posts/{id:[0-9]+}", &[&"alice", &7])
            .build()
            .unwrap();
        assert_eq!(request.uri().path(), "/users/alice/posts/7");
        assert_eq!(request.to_string(), "GET /users/alice/posts/7");
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_args_percent_encoded() {
        let request = RequestBuilder::new(Method::GET, "/users/{name}", &[&"a b/c"]).build().unwrap();
        assert_eq!(request.uri().path(), "/users/a%20b%2Fc");
    }

    #[test]
    fn test_arg_count_mismatch() {
        let err = RequestBuilder::new(Method::GET, "/users/{username}", &[]).build().unwrap_err();
        assert!(matches!(err, RapidError::Protocol(_)));
    }

    #[test]
    fn test_query_and_body() {
        let request = RequestBuilder::new(Method::POST, "/users", &[])
            .query(&Search { q: "a b", limit: 5 })
            .body(&User { name: "bob".into() })
            .build()
            .unwrap();
        assert_eq!(request.uri().query(), Some("q=a+b&limit=5"));
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(&request.body()[..], br#"{"name":"bob"}"#);
    }

    #[test]
    fn test_msgpack_body() {
        let request = RequestBuilder::new(Method::PUT, "/users", &[])
            .protocol(Arc::new(MsgPackProtocol))
            .body(&User { name: "bob".into() })
            .build()
            .unwrap();
        assert_eq!(request.headers()[ACCEPT], "application/msgpack");
        let decoded: User = MsgPackProtocol::decode(request.body()).unwrap();
        assert_eq!(decoded.name, "bob");
    }

    #[test]
    fn test_upload_sets_disposition() {
        let file = FileUpload::new("a.txt", "text/plain", Bytes::from_static(b"hi"));
        let request = RequestBuilder::new(Method::POST, "/files", &[]).upload(file).build().unwrap();
        assert_eq!(request.headers()[CONTENT_TYPE], "text/plain");
        assert!(request.headers().contains_key(http::header::CONTENT_DISPOSITION));
        assert_eq!(request.body(), "hi");
    }

    #[test]
    fn test_template_reusable() {
        let template = RequestBuilder::new(Method::DELETE, "/users/{id}", &[&1])
            .header(HeaderName::from_static("x-trace"), HeaderValue::from_static("t1"))
            .build()
            .unwrap();
        let first = template.to_request();
        let second = template.to_request();
        assert_eq!(first.uri(), second.uri());
        assert_eq!(second.headers()["x-trace"], "t1");
    }
}
