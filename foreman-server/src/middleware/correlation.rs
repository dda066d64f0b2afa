//! Correlation-id middleware.
//!
//! Every request gets a correlation id at the edge (reusing a well-formed
//! client-supplied `X-Correlation-ID` when present). The id is scoped as
//! ambient context for the whole handler, so logs, emitted events, and the
//! error envelope all carry it without per-call plumbing.

use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

pub async fn correlation_middleware(request: Request<Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .unwrap_or_else(Uuid::new_v4);

    let span = tracing::info_span!(
        "request",
        correlation_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = foreman_core::events::with_correlation(id, next.run(request))
        .instrument(span)
        .await;

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
