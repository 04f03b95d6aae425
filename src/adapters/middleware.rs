//! Axum middleware functions usable with the router's `middleware` option.
//!
//! Wrap them with `axum::middleware::from_fn`. They run inside the router,
//! so the [`RequestId`] extension set for the request is available.
use std::time::Instant;

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

use crate::core::router::RequestId;

/// Log each routed request with its request id, final status and latency.
///
/// Only requests that matched a route reach middleware, so misses and
/// malformed paths are not logged here.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.to_string())
        .unwrap_or_default();

    let response = next.run(req).await;

    let status = response.status();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    if status.is_server_error() {
        tracing::warn!(
            %method,
            %path,
            %request_id,
            status = status.as_u16(),
            latency_ms,
            "route failed"
        );
    } else {
        tracing::info!(
            %method,
            %path,
            %request_id,
            status = status.as_u16(),
            latency_ms,
            "route served"
        );
    }
    response
}

/// Expose the router-assigned request id as `X-Request-ID`.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req.extensions().get::<RequestId>().cloned();
    let mut response = next.run(req).await;

    if let Some(id) = request_id
        && let Ok(value) = HeaderValue::from_str(id.as_str())
    {
        response.headers_mut().insert("X-Request-ID", value);
    }
    response
}
