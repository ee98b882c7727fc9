//! HTTP request handlers
//!
//! Maps the talk routes onto `ServerHandle` calls and implements the
//! conditional, long-polling `GET /talks`:
//! - no or stale `If-None-Match` → 200 with every talk and a fresh `ETag`
//! - current tag, no `Prefer: wait=N` → 304
//! - current tag with a wait → parked until a change (200) or timeout (304)

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::FutureExt;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::message::{CommentInput, TalkInput};
use crate::server::ServerHandle;
use crate::talk::Talk;
use crate::types::{parse_wait, Version};
use crate::waiter::WaitOutcome;

/// Request header carrying the wait preference
const PREFER: &str = "prefer";

/// Build the axum `Router` for the talk API
pub fn router(server: ServerHandle) -> Router {
    Router::new()
        .route("/talks", get(list_talks))
        .route(
            "/talks/:title",
            get(get_talk).put(put_talk).delete(delete_talk),
        )
        .route("/talks/:title/comments", post(add_comment))
        .fallback(not_found)
        .layer(middleware::from_fn(log_request))
        .with_state(server)
}

/// Serve the talk API on `listener` until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    server: ServerHandle,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// `GET /talks/{title}`
async fn get_talk(
    State(server): State<ServerHandle>,
    Path(title): Path<String>,
) -> Result<Json<Talk>, AppError> {
    Ok(Json(server.get_talk(title).await?))
}

/// `PUT /talks/{title}`: create or replace
async fn put_talk(
    State(server): State<ServerHandle>,
    Path(title): Path<String>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let input = TalkInput::parse(&body)?;
    server
        .put_talk(title, input.presenter, input.summary)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /talks/{title}`: always 204
async fn delete_talk(
    State(server): State<ServerHandle>,
    Path(title): Path<String>,
) -> Result<StatusCode, AppError> {
    server.delete_talk(title).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /talks/{title}/comments`
async fn add_comment(
    State(server): State<ServerHandle>,
    Path(title): Path<String>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let input = CommentInput::parse(&body)?;
    server
        .add_comment(title, input.author, input.message)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /talks`: conditional and optionally long-polling
async fn list_talks(
    State(server): State<ServerHandle>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let known = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .and_then(Version::from_etag);
    let wait = headers
        .get(PREFER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_wait);

    if let (Some(version), Some(wait)) = (known, wait) {
        debug!("Long poll at version {} for up to {:?}", version, wait);
    }

    let response = match server.await_change(known, wait).await? {
        WaitOutcome::Changed(snapshot) => (
            [(header::ETAG, snapshot.version.to_etag())],
            Json(&snapshot.talks),
        )
            .into_response(),
        // Only answered when the client's tag is still current.
        WaitOutcome::NotModified => {
            let etag = known.unwrap_or_default().to_etag();
            (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response()
        }
    };
    Ok(response)
}

/// Fallback for unknown routes
async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Log every request and turn a panicking handler into a 500
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    debug!("Got {} request for {}", method, uri);

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Handler for {} {} panicked: {}", method, uri, message);
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
    };

    info!("{} {} -> {}", method, uri, response.status().as_u16());
    response
}

/// Helper: best-effort text of a panic payload
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Internal error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "Internal error");
    }
}
