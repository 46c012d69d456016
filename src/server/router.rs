//! axum binding for the dispatcher.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::Router;
use http::StatusCode;

use super::writer::{channel_writer, DEFAULT_BODY_CHANNEL_CAPACITY};
use super::Dispatcher;
use crate::status::Status;

/// Build an axum router that sends every request through `dispatcher`.
///
/// Routing happens in the dispatcher, so the router has a single fallback
/// service and can be nested or merged like any other axum router.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new().fallback(move |request: Request| serve(dispatcher.clone(), request))
}

async fn serve(dispatcher: Arc<Dispatcher>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let (writer, rx) = channel_writer(DEFAULT_BODY_CHANNEL_CAPACITY);

    match axum::body::to_bytes(body, dispatcher.config().max_body_size).await {
        Ok(bytes) => {
            let request = http::Request::from_parts(parts, bytes);
            tokio::spawn(async move {
                if let Err(e) = dispatcher.dispatch(request, writer).await {
                    tracing::warn!(error = %e, "response not completed");
                }
            });
        }
        Err(e) => {
            tracing::debug!(error = %e, "request body rejected");
            let method = parts.method;
            tokio::spawn(async move {
                let status = Status::for_code(StatusCode::PAYLOAD_TOO_LARGE);
                if let Err(e) = dispatcher.reject(&method, status, writer).await {
                    tracing::warn!(error = %e, "response not completed");
                }
            });
        }
    }

    let Ok(head) = rx.head.await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let chunks = futures::stream::unfold(rx.body, |mut body| async move {
        body.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), body))
    });
    let mut response = Response::new(Body::from_stream(chunks));
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    response
}
