//! Change feed - a streaming route consumed through a retrying client.
//!
//! This demo shows:
//! - A handler producing a stream on its own task
//! - Stopping the producer when the consumer goes away
//! - Reading the stream item by item, in-process over `LocalTransport`
//! - Retrying a flaky route with exponential backoff
//!
//! ```sh
//! RUST_LOG=rapidwire=debug cargo run --example changes
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use rapidwire::client::{
    BasicClient, Client, ClientExt, ClientStream, ClientStreamExt, ExponentialBackoff, RetryingClient,
};
use rapidwire::handler::{Call, HandlerRegistry, Query, Reply, Validate};
use rapidwire::schema::{Resource, ResponseSpec, Route, Schema};
use rapidwire::server::{Dispatcher, DispatcherConfig};
use rapidwire::transport::LocalTransport;
use rapidwire::Status;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct Change {
    seq: u64,
    key: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Since {
    #[serde(default)]
    seq: u64,
}
impl Validate for Since {}

fn schema() -> rapidwire::Result<Schema> {
    Schema::new("Changes")
        .resource(
            Resource::new("Changes", "/changes")
                .route(
                    Route::get("WatchChanges", "/changes")
                        .describe("Every change after `seq`, as it happens")
                        .query::<Since>()
                        .response(ResponseSpec::new(StatusCode::OK).body::<Change>().streaming()),
                )
                .route(
                    Route::get("Head", "/changes/head")
                        .response(ResponseSpec::new(StatusCode::OK).body::<u64>()),
                ),
        )
        .build()
}

fn handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register("WatchChanges", |call: Call<(), Query<Since>>| async move {
        let mut seq = call.query().seq;
        let (tx, reply) = call.stream::<Change>();
        tokio::spawn(async move {
            loop {
                seq += 1;
                let change = Change {
                    seq,
                    key: format!("doc-{}", seq % 3),
                };
                tokio::select! {
                    _ = tx.cancelled() => break,
                    sent = tx.send(change) => if sent.is_err() { break },
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            tracing::info!(seq, "watcher gone, producer stopped");
        });
        Ok(Reply::Stream(reply))
    });

    // Fails twice before answering, to show retries.
    let calls = Arc::new(AtomicU32::new(0));
    registry.register("Head", move |_: Call| {
        let calls = calls.clone();
        async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(Status::new(StatusCode::SERVICE_UNAVAILABLE, "warming up").into());
            }
            Reply::data(&42u64)
        }
    });
    registry
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dispatcher = Dispatcher::new(schema()?, handlers())?
        .with_config(DispatcherConfig::default().stream_channel_capacity(4));
    let transport = LocalTransport::new(Arc::new(dispatcher));
    let client = RetryingClient::new(
        BasicClient::new(transport),
        ExponentialBackoff::new(Duration::from_millis(50)).max_attempts(5),
    );

    let head: u64 = client.call_as(&rapidwire::request(Method::GET, "/changes/head", &[]).build()?).await?;
    println!("head is at {head}");

    let request = rapidwire::request(Method::GET, "/changes", &[])
        .query(&Since { seq: head })
        .build()?;
    let mut changes = client.stream(&request).await?;
    for _ in 0..5 {
        match changes.next_as::<Change>().await? {
            Some(change) => println!("change {} on {}", change.seq, change.key),
            None => break,
        }
    }
    changes.close().await?;

    // Give the producer a moment to observe the disconnect.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
