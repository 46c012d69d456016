//! Schema model - resources, routes and responses.
//!
//! A [`Schema`] is described once and drives both the server
//! [`Dispatcher`](crate::server::Dispatcher) and the client request
//! builder. It is assembled from plain values and validated by
//! [`Schema::build`]; after that it is immutable and shared read-only.
//!
//! # Example
//!
//! ```
//! use http::StatusCode;
//! use rapidwire::schema::{Resource, ResponseSpec, Route, Schema};
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct User {
//!     id: u32,
//!     name: String,
//! }
//!
//! let schema = Schema::new("Users")
//!     .describe("An API for managing users.")
//!     .resource(
//!         Resource::new("Users", "/users")
//!             .route(Route::post("CreateUser", "/users").request::<User>())
//!             .route(
//!                 Route::get("GetUser", "/users/{username}")
//!                     .response(ResponseSpec::new(StatusCode::OK).body::<User>()),
//!             ),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.routes().count(), 2);
//! ```

mod params;
pub mod path;

use std::any::TypeId;
use std::collections::HashSet;

use http::{Method, StatusCode};
use serde::{Serialize, Serializer};

use crate::codec::{FileDownload, FileUpload, RawData};
use crate::error::{RapidError, Result};

pub use params::Params;
pub use path::PathPattern;

/// How a payload type travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Encoded by the active protocol inside the envelope.
    Structured,
    /// Raw bytes, `application/octet-stream`.
    Raw,
    /// File sent by the client.
    FileUpload,
    /// File sent by the server.
    FileDownload,
}

/// Descriptor of a request, response, query or path type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeRef {
    /// Fully qualified Rust type name.
    pub name: &'static str,
    pub kind: PayloadKind,
}

impl TypeRef {
    /// Describe `T`, recognising the special payload kinds.
    pub fn of<T: ?Sized + 'static>() -> Self {
        let id = TypeId::of::<T>();
        let kind = if id == TypeId::of::<RawData>() {
            PayloadKind::Raw
        } else if id == TypeId::of::<FileUpload>() {
            PayloadKind::FileUpload
        } else if id == TypeId::of::<FileDownload>() {
            PayloadKind::FileDownload
        } else {
            PayloadKind::Structured
        };
        Self {
            name: std::any::type_name::<T>(),
            kind,
        }
    }
}

/// A declared response of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseSpec {
    #[serde(serialize_with = "serialize_status")]
    status: StatusCode,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(rename = "type")]
    type_ref: Option<TypeRef>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    streaming: bool,
}

impl ResponseSpec {
    /// A response with no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            description: String::new(),
            content_type: None,
            type_ref: None,
            streaming: false,
        }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Associate a body type.
    pub fn body<T: ?Sized + 'static>(mut self) -> Self {
        self.type_ref = Some(TypeRef::of::<T>());
        self
    }

    /// Mark the body as a stream of `T` items.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn type_ref(&self) -> Option<TypeRef> {
        self.type_ref
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

/// A named, path and method addressable operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    example: String,
    path: String,
    #[serde(serialize_with = "serialize_method")]
    method: Option<Method>,
    streaming: bool,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_opt_status")]
    success_status: Option<StatusCode>,
    request_type: Option<TypeRef>,
    query_type: Option<TypeRef>,
    path_type: Option<TypeRef>,
    responses: Vec<ResponseSpec>,
    secured_by: Vec<String>,
    #[serde(skip)]
    hidden: bool,
}

impl Route {
    /// Create a route; `None` matches any method.
    pub fn new(name: impl Into<String>, method: Option<Method>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            example: String::new(),
            path: path.into(),
            method,
            streaming: false,
            success_status: None,
            request_type: None,
            query_type: None,
            path_type: None,
            responses: Vec::new(),
            secured_by: Vec::new(),
            hidden: false,
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Some(Method::GET), path)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Some(Method::POST), path)
    }

    pub fn put(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Some(Method::PUT), path)
    }

    pub fn delete(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Some(Method::DELETE), path)
    }

    /// Match any method.
    pub fn any(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, None, path)
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn example(mut self, text: impl Into<String>) -> Self {
        self.example = text.into();
        self
    }

    /// Declare the request body type.
    pub fn request<T: ?Sized + 'static>(mut self) -> Self {
        self.request_type = Some(TypeRef::of::<T>());
        self
    }

    /// Declare the query parameters type.
    pub fn query<T: ?Sized + 'static>(mut self) -> Self {
        self.query_type = Some(TypeRef::of::<T>());
        self
    }

    /// Declare the path parameters type.
    pub fn path_params<T: ?Sized + 'static>(mut self) -> Self {
        self.path_type = Some(TypeRef::of::<T>());
        self
    }

    pub fn response(mut self, response: ResponseSpec) -> Self {
        self.responses.push(response);
        self
    }

    /// The response is a chunked stream of envelopes.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Override the status returned on success.
    pub fn success(mut self, status: StatusCode) -> Self {
        self.success_status = Some(status);
        self
    }

    /// Hide the route from generated documentation.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn secured_by(mut self, scheme: impl Into<String>) -> Self {
        self.secured_by.push(scheme.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `None` for wildcard routes.
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn request_type(&self) -> Option<TypeRef> {
        self.request_type
    }

    pub fn query_type(&self) -> Option<TypeRef> {
        self.query_type
    }

    pub fn path_type(&self) -> Option<TypeRef> {
        self.path_type
    }

    pub fn responses(&self) -> &[ResponseSpec] {
        &self.responses
    }

    pub fn security(&self) -> &[String] {
        &self.secured_by
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn success_status(&self) -> Option<StatusCode> {
        self.success_status
    }

    /// True if the route or any of its responses streams.
    pub fn is_streaming(&self) -> bool {
        self.streaming || self.responses.iter().any(ResponseSpec::is_streaming)
    }

    /// The first response with a 2xx status.
    pub fn default_response(&self) -> Option<&ResponseSpec> {
        self.responses.iter().find(|r| r.status.is_success())
    }

    /// The path with custom placeholder patterns stripped.
    pub fn simplified_path(&self) -> String {
        path::simplify(&self.path)
    }

    /// Whether this route accepts `method`.
    pub fn accepts(&self, method: &Method) -> bool {
        self.method.as_ref().map_or(true, |m| m == method)
    }

    fn validate(&mut self) -> Result<()> {
        PathPattern::compile(&self.path)?;

        let success_types: HashSet<Option<TypeRef>> = self
            .responses
            .iter()
            .filter(|r| r.status.is_success())
            .map(|r| r.type_ref)
            .collect();
        if success_types.len() > 1 {
            return Err(RapidError::InvalidSchema(format!(
                "route {} declares more than one success response type",
                self.name
            )));
        }

        if success_types.is_empty() {
            if self.method == Some(Method::GET) {
                return Err(RapidError::InvalidSchema(format!(
                    "GET route {} declares no success response",
                    self.name
                )));
            }
            let status = self.success_status.unwrap_or(match self.method {
                Some(Method::POST) => StatusCode::CREATED,
                _ => StatusCode::OK,
            });
            self.responses.push(ResponseSpec::new(status));
        }
        Ok(())
    }
}

/// A group of routes under a common path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    name: String,
    path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    routes: Vec<Route>,
}

impl Resource {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: String::new(),
            routes: Vec::new(),
        }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// True when every route is hidden.
    pub fn is_hidden(&self) -> bool {
        self.routes.iter().all(Route::is_hidden)
    }

    pub fn simplified_path(&self) -> String {
        path::simplify(&self.path)
    }
}

/// A complete service description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    version: String,
    resources: Vec<Resource>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: String::new(),
            resources: Vec::new(),
        }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Validate the schema and synthesize implicit responses.
    ///
    /// # Errors
    ///
    /// Returns [`RapidError::InvalidSchema`] when resource paths or route
    /// names repeat, a route lies outside its resource, a route declares
    /// conflicting success types, or a GET route has no success response.
    /// Returns [`RapidError::Pattern`] for an invalid path template.
    pub fn build(mut self) -> Result<Self> {
        let mut resource_paths = HashSet::new();
        let mut route_names = HashSet::new();

        for resource in &mut self.resources {
            if !resource_paths.insert(resource.path.clone()) {
                return Err(RapidError::InvalidSchema(format!(
                    "duplicate resource path {}",
                    resource.path
                )));
            }
            for route in &mut resource.routes {
                if !route_names.insert(route.name.clone()) {
                    return Err(RapidError::InvalidSchema(format!(
                        "duplicate route name {}",
                        route.name
                    )));
                }
                if !route.path.starts_with(&resource.path) {
                    return Err(RapidError::InvalidSchema(format!(
                        "route {} path {} is outside resource {}",
                        route.name, route.path, resource.path
                    )));
                }
                route.validate()?;
            }
        }
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version_str(&self) -> &str {
        &self.version
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Every route in declaration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.resources.iter().flat_map(|r| r.routes.iter())
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes().find(|r| r.name == name)
    }

    pub fn resource_by_path(&self, path: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.path == path)
    }

    /// Every referenced type, deduplicated, in first-use order.
    pub fn types(&self) -> Vec<TypeRef> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for route in self.routes() {
            let refs = [route.request_type, route.query_type, route.path_type]
                .into_iter()
                .chain(route.responses.iter().map(|r| r.type_ref));
            for type_ref in refs.flatten() {
                if seen.insert(type_ref) {
                    out.push(type_ref);
                }
            }
        }
        out
    }
}

fn serialize_method<S: Serializer>(method: &Option<Method>, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(method.as_ref().map_or("", Method::as_str))
}

fn serialize_status<S: Serializer>(status: &StatusCode, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

fn serialize_opt_status<S: Serializer>(
    status: &Option<StatusCode>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match status {
        Some(code) => s.serialize_u16(code.as_u16()),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct User;
    struct UserPath;
    struct Other;

    fn users(route: Route) -> Result<Schema> {
        Schema::new("Users")
            .resource(Resource::new("Users", "/users").route(route))
            .build()
    }

    #[test]
    fn test_build_synthesizes_default_response() {
        let schema = users(Route::post("CreateUser", "/users").request::<User>()).unwrap();
        let route = schema.route("CreateUser").unwrap();
        let response = route.default_response().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.type_ref().is_none());

        let schema = users(Route::delete("DeleteUser", "/users/{id}")).unwrap();
        let route = schema.route("DeleteUser").unwrap();
        assert_eq!(route.default_response().unwrap().status(), StatusCode::OK);
    }

    #[test]
    fn test_get_without_success_response_rejected() {
        let err = users(Route::get("ListUsers", "/users")).unwrap_err();
        assert!(matches!(err, RapidError::InvalidSchema(_)));
    }

    #[test]
    fn test_conflicting_success_types_rejected() {
        let route = Route::get("GetUser", "/users/{id}")
            .response(ResponseSpec::new(StatusCode::OK).body::<User>())
            .response(ResponseSpec::new(StatusCode::ACCEPTED).body::<Other>());
        assert!(users(route).is_err());

        let route = Route::get("GetUser", "/users/{id}")
            .response(ResponseSpec::new(StatusCode::OK).body::<User>())
            .response(ResponseSpec::new(StatusCode::NOT_FOUND).body::<Other>());
        assert!(users(route).is_ok());
    }

    #[test]
    fn test_duplicate_route_names_rejected() {
        let err = Schema::new("Users")
            .resource(
                Resource::new("Users", "/users")
                    .route(Route::post("Create", "/users"))
                    .route(Route::put("Create", "/users/{id}")),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate route name"));
    }

    #[test]
    fn test_duplicate_resource_paths_rejected() {
        let err = Schema::new("Users")
            .resource(Resource::new("A", "/users"))
            .resource(Resource::new("B", "/users"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate resource path"));
    }

    #[test]
    fn test_route_outside_resource_rejected() {
        let err = users(Route::post("Create", "/accounts")).unwrap_err();
        assert!(err.to_string().contains("outside resource"));
    }

    #[test]
    fn test_invalid_template_rejected_at_build() {
        let err = users(Route::post("Create", "/users/{id:[}")).unwrap_err();
        assert!(matches!(err, RapidError::Pattern(_)));
    }

    #[test]
    fn test_type_refs() {
        assert_eq!(TypeRef::of::<RawData>().kind, PayloadKind::Raw);
        assert_eq!(TypeRef::of::<FileUpload>().kind, PayloadKind::FileUpload);
        assert_eq!(TypeRef::of::<FileDownload>().kind, PayloadKind::FileDownload);
        assert_eq!(TypeRef::of::<User>().kind, PayloadKind::Structured);

        let schema = users(
            Route::get("GetUser", "/users/{username}")
                .path_params::<UserPath>()
                .response(ResponseSpec::new(StatusCode::OK).body::<User>()),
        )
        .unwrap();
        let names: Vec<_> = schema.types().iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("UserPath"));
        assert!(names[1].ends_with("User"));
    }

    #[test]
    fn test_hidden_resource() {
        let resource = Resource::new("Internal", "/internal")
            .route(Route::post("Flush", "/internal/flush").hidden());
        assert!(resource.is_hidden());

        let resource = resource.route(Route::post("Stats", "/internal/stats"));
        assert!(!resource.is_hidden());
    }

    #[test]
    fn test_wildcard_method() {
        let route = Route::any("Proxy", "/proxy");
        assert!(route.accepts(&Method::GET));
        assert!(route.accepts(&Method::PATCH));
        assert!(!Route::get("Index", "/").accepts(&Method::POST));
    }

    #[test]
    fn test_streaming_flag() {
        assert!(Route::get("Changes", "/changes").streaming().is_streaming());
        let route = Route::get("Changes", "/changes")
            .response(ResponseSpec::new(StatusCode::OK).body::<u64>().streaming());
        assert!(route.is_streaming());
        assert!(!Route::get("Index", "/").is_streaming());
    }

    #[test]
    fn test_serialize_for_exporters() {
        let schema = users(
            Route::get("GetUser", r"/users/{id:\d+}")
                .response(ResponseSpec::new(StatusCode::OK).body::<User>()),
        )
        .unwrap();
        let json = serde_json::to_value(&schema).unwrap();
        let route = &json["resources"][0]["routes"][0];
        assert_eq!(route["method"], "GET");
        assert_eq!(route["responses"][0]["status"], 200);
        assert_eq!(route["request_type"], serde_json::Value::Null);
        assert_eq!(schema.route("GetUser").unwrap().simplified_path(), "/users/{id}");
    }
}
