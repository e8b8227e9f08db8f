use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::http::header::DATE;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use tracing::{Instrument, info, info_span, warn};

use warden_observability::{REQUEST_ID_HEADER, TRACE_ID_HEADER, TraceContext};

use crate::context::RequestContext;

/// Adopt or mint the request/trace ids and echo them on the response.
pub async fn propagate_trace(mut req: Request, next: Next) -> Response {
    let trace = TraceContext::from_lookup(|name| req.headers().get(name).and_then(|v| v.to_str().ok()));
    req.extensions_mut().insert(RequestContext::new(trace.clone()));

    let mut res = next.run(req).await;
    for (name, value) in [(REQUEST_ID_HEADER, &trace.request_id), (TRACE_ID_HEADER, &trace.trace_id)] {
        if let Ok(value) = HeaderValue::from_str(value) {
            res.headers_mut().insert(name, value);
        }
    }
    res
}

/// RFC 7231 `Date` header.
pub async fn date_header(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    if !res.headers().contains_key(DATE) {
        let now = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&now) {
            res.headers_mut().insert(DATE, value);
        }
    }
    res
}

/// One line per request with its ids, status and latency.
pub async fn access_log(req: Request, next: Next) -> Response {
    let (request_id, trace_id) = req
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| (ctx.trace().request_id.clone(), ctx.trace().trace_id.clone()))
        .unwrap_or_default();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = info_span!(
        "http.request",
        request_id = %request_id,
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    let started = Instant::now();
    let res = next.run(req).instrument(span.clone()).await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let status = res.status().as_u16();

    span.in_scope(|| {
        if res.status().is_server_error() {
            warn!(status, latency_ms, "request failed");
        } else {
            info!(status, latency_ms, "request completed");
        }
    });
    res
}
