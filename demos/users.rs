//! Users service - a CRUD API served over HTTP and called with the client.
//!
//! This demo shows:
//! - Declaring a schema with typed path, query and body parameters
//! - Binding handlers to route names
//! - Serving the dispatcher with axum
//! - Calling it over `HttpTransport` with a bearer token hook
//!
//! ```sh
//! RUST_LOG=rapidwire=debug cargo run --example users
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use http::header::AUTHORIZATION;
use http::{Method, StatusCode};
use rapidwire::client::{BasicClient, BearerAuth, Client, ClientExt};
use rapidwire::handler::{Body, Call, HandlerRegistry, Path, Query, Reply, Validate};
use rapidwire::schema::{Resource, ResponseSpec, Route, Schema};
use rapidwire::server::{router, Dispatcher};
use rapidwire::transport::HttpTransport;
use rapidwire::Status;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    name: String,
    email: String,
}

impl Validate for User {
    fn validate(&self) -> Result<(), Status> {
        if !self.email.contains('@') {
            return Err(Status::bad_request(format!("invalid email {:?}", self.email)));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct UserPath {
    username: String,
}
impl Validate for UserPath {}

#[derive(Debug, Serialize, Deserialize)]
struct ListQuery {
    #[serde(default)]
    prefix: String,
}
impl Validate for ListQuery {}

type Store = Arc<RwLock<BTreeMap<String, User>>>;

fn schema() -> rapidwire::Result<Schema> {
    Schema::new("Users")
        .describe("A small user directory")
        .version("1.0.0")
        .resource(
            Resource::new("Users", "/users")
                .route(
                    Route::post("CreateUser", "/users")
                        .describe("Create a user")
                        .request::<User>()
                        .secured_by("bearer"),
                )
                .route(
                    Route::get("ListUsers", "/users")
                        .query::<ListQuery>()
                        .response(ResponseSpec::new(StatusCode::OK).body::<Vec<User>>()),
                )
                .route(
                    Route::get("GetUser", "/users/{username}")
                        .path_params::<UserPath>()
                        .response(ResponseSpec::new(StatusCode::OK).body::<User>())
                        .response(ResponseSpec::new(StatusCode::NOT_FOUND)),
                )
                .route(Route::delete("DeleteUser", "/users/{username}").path_params::<UserPath>()),
        )
        .build()
}

fn handlers(store: Store) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    let users = store.clone();
    registry.register("CreateUser", move |call: Call<(), (), Body<User>>| {
        let users = users.clone();
        async move {
            if call.headers().get(AUTHORIZATION).is_none() {
                return Err(Status::for_code(StatusCode::UNAUTHORIZED).into());
            }
            let (_, _, Body(user)) = call.into_parts();
            let mut users = users.write().map_err(|_| Status::internal())?;
            if users.contains_key(&user.name) {
                return Err(Status::new(StatusCode::CONFLICT, "user exists").into());
            }
            users.insert(user.name.clone(), user.clone());
            Reply::data(&user)
        }
    });

    let users = store.clone();
    registry.register("ListUsers", move |call: Call<(), Query<ListQuery>>| {
        let users = users.clone();
        async move {
            let users = users.read().map_err(|_| Status::internal())?;
            let matching: Vec<&User> = users
                .values()
                .filter(|u| u.name.starts_with(&call.query().prefix))
                .collect();
            Reply::data(&matching)
        }
    });

    let users = store.clone();
    registry.register("GetUser", move |call: Call<Path<UserPath>>| {
        let users = users.clone();
        async move {
            let users = users.read().map_err(|_| Status::internal())?;
            match users.get(&call.path().username) {
                Some(user) => Reply::data(user),
                None => Err(Status::not_found().into()),
            }
        }
    });

    registry.register("DeleteUser", move |call: Call<Path<UserPath>>| {
        let users = store.clone();
        async move {
            let mut users = users.write().map_err(|_| Status::internal())?;
            match users.remove(&call.path().username) {
                Some(_) => Ok(Reply::NoContent),
                None => Err(Status::not_found().into()),
            }
        }
    });

    registry
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = Store::default();
    let dispatcher = Arc::new(Dispatcher::new(schema()?, handlers(store))?);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "serving users");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(dispatcher)).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    let client = BasicClient::new(HttpTransport::new(format!("http://{addr}")))
        .before_request(BearerAuth::new("demo-token")?);

    for (name, email) in [("alice", "alice@example.com"), ("albert", "al@example.com"), ("bob", "bob@example.com")] {
        let request = rapidwire::request(Method::POST, "/users", &[])
            .body(&User {
                name: name.into(),
                email: email.into(),
            })
            .build()?;
        let created: User = client.call_as(&request).await?;
        println!("created {created:?}");
    }

    let request = rapidwire::request(Method::GET, "/users", &[])
        .query(&ListQuery { prefix: "al".into() })
        .build()?;
    let users: Vec<User> = client.call_as(&request).await?;
    println!("users starting with 'al': {users:?}");

    let bad = rapidwire::request(Method::POST, "/users", &[])
        .body(&User {
            name: "eve".into(),
            email: "nope".into(),
        })
        .build()?;
    if let Err(e) = client.call(&bad).await {
        println!("rejected: {e}");
    }

    let delete = rapidwire::request(Method::DELETE, "/users/{username}", &[&"bob"]).build()?;
    client.call(&delete).await?;
    let missing = rapidwire::request(Method::GET, "/users/{username}", &[&"bob"]).build()?;
    match client.call(&missing).await {
        Err(e) => println!("after delete: {e}"),
        Ok(user) => println!("unexpected: {user}"),
    }

    Ok(())
}
