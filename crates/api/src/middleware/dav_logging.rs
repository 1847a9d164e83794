//! Deep request/response logging for DAV traffic
//!
//! Always logs method, path, status, and latency. With the debug flag set,
//! also dumps headers and both bodies at debug level (Authorization
//! redacted).

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::AppState;

pub async fn dav_logger(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let headers = req.headers().clone();

    let debug_enabled = state.config.debug;

    tracing::info!(method = %method, path = %uri, "DAV request started");

    if debug_enabled {
        log_headers(&headers, "Request");
    }

    let req = if debug_enabled {
        let (parts, body) = req.into_parts();
        let bytes = buffer_and_log_body(body, "Request Body").await;
        Request::from_parts(parts, Body::from(bytes))
    } else {
        req
    };

    let response = next.run(req).await;

    let status = response.status();
    let duration = start.elapsed();

    tracing::info!(
        method = %method,
        path = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        "DAV request completed"
    );

    if debug_enabled {
        let (parts, body) = response.into_parts();
        let bytes = buffer_and_log_body(body, "Response Body").await;
        return Response::from_parts(parts, Body::from(bytes));
    }

    response
}

async fn buffer_and_log_body(body: Body, label: &str) -> Bytes {
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            if bytes.is_empty() {
                tracing::debug!("{}: <empty>", label);
            } else if let Ok(body_str) = std::str::from_utf8(&bytes) {
                tracing::debug!("{}:\n{}", label, body_str);
            } else {
                tracing::debug!("{}: <binary data {} bytes>", label, bytes.len());
            }
            bytes
        }
        Err(e) => {
            tracing::error!("Failed to read {}: {}", label, e);
            Bytes::new()
        }
    }
}

fn log_headers(headers: &HeaderMap, label: &str) {
    tracing::debug!("{} Headers:", label);
    for (name, value) in headers {
        if name == axum::http::header::AUTHORIZATION {
            tracing::debug!("  {}: <REDACTED>", name);
        } else {
            tracing::debug!("  {}: {:?}", name, value);
        }
    }
}
