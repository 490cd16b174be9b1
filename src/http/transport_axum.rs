//! axum adapter
//!
//! A single fallback handler collects the request, runs the synchronous router
//! on tokio's blocking pool and converts the result back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{DefaultBodyLimit, State},
    http::{header::CONTENT_TYPE, HeaderValue, Request, Response, StatusCode},
    routing::any,
    Router,
};

use crate::error::{Result, VaultError};
use crate::service::ListService;

use super::{handle_request, HttpRequest, HttpResponse};

/// Room for JSON framing and escaping around a maximal chunk
const BODY_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
struct AppState {
    service: Arc<ListService>,
    body_limit: usize,
}

/// Largest request body accepted for the given service
pub fn body_limit(service: &ListService) -> usize {
    service
        .config()
        .max_chunk_bytes
        .saturating_mul(2)
        .saturating_add(BODY_OVERHEAD_BYTES)
}

/// Build the application router
pub fn router(service: Arc<ListService>) -> Router {
    let body_limit = body_limit(&service);
    Router::new()
        .fallback(any(dispatch))
        .with_state(AppState {
            service,
            body_limit,
        })
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(
    service: Arc<ListService>,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("HTTP API listening on {}", addr);
    }

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(VaultError::Io)
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let method = request.method().to_string();
    let target = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let mut headers = HashMap::new();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let declared = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok());
    if let Some(size) = declared.filter(|size| *size > state.body_limit) {
        return into_axum(HttpResponse::from_error(&VaultError::PayloadTooLarge {
            size,
            limit: state.body_limit,
        }));
    }

    let body = match to_bytes(request.into_body(), state.body_limit).await {
        Ok(bytes) => bytes.to_vec(),
        Err(err) if is_length_limit(&err) => {
            tracing::debug!(error = %err, "Rejected oversized request body");
            return into_axum(HttpResponse::from_error(&VaultError::PayloadTooLarge {
                size: state.body_limit.saturating_add(1),
                limit: state.body_limit,
            }));
        }
        Err(err) => {
            tracing::debug!(error = %err, "Failed to read request body");
            return into_axum(HttpResponse::bad_request(&format!("request body error: {}", err)));
        }
    };

    let request = HttpRequest {
        method,
        target,
        headers,
        body,
    };

    let service = Arc::clone(&state.service);
    let response = match tokio::task::spawn_blocking(move || handle_request(&service, &request)).await {
        Ok(response) => response,
        Err(join_err) => {
            tracing::error!(error = %join_err, "Request handler panicked");
            HttpResponse::from_error(&VaultError::Protocol(format!(
                "request handler failed: {}",
                join_err
            )))
        }
    };

    into_axum(response)
}

/// Whether a body read failed because it outgrew the limit
fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.to_string().contains("length limit exceeded") {
            return true;
        }
        source = e.source();
    }
    false
}

fn into_axum(response: HttpResponse) -> Response<Body> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = status;
    out.headers_mut().insert(
        CONTENT_TYPE,
        response
            .content_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/json")),
    );
    out
}
