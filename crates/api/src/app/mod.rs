//! HTTP application wiring (Axum router + request pipeline).
//!
//! - `services.rs`: backend selection and the identity service
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: the response envelope, extractors and query DTOs
//! - `errors.rs`: error codes to HTTP statuses
//! - `cookie.rs`: token delivery by cookie

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::http::header::HeaderName;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use warden_observability::{REQUEST_ID_HEADER, TRACE_ID_HEADER};

use crate::middleware::{AuthState, SkipPaths, auth_middleware, etag, recover, trace};

pub mod cookie;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, Backend, build_services};

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderName::from_static(TRACE_ID_HEADER),
        ]);
    match allowed_origins {
        None => layer.allow_origin(Any),
        Some(origins) => layer.allow_origin(AllowOrigin::list(
            origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()),
        )),
    }
}

/// Build the full HTTP router around `services`.
pub fn build_app(services: AppServices) -> Router {
    let config = services.config.clone();
    let auth_state = AuthState {
        tokens: services.identity.tokens().clone(),
        skip: Arc::new(SkipPaths::parse(&config.auth.skip_paths)),
        cookie: config.cookie.clone(),
    };

    routes::router()
        .layer(from_fn(etag::etag))
        .layer(from_fn_with_state(auth_state, auth_middleware))
        .layer(Extension(Arc::new(services)))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(trace::propagate_trace))
                .layer(from_fn(trace::date_header))
                .layer(from_fn(trace::access_log))
                .layer(cors_layer(config.server.cors_allowed_origins.as_deref()))
                .layer(CatchPanicLayer::custom(recover::panic_handler(
                    config.server.detailed_errors,
                )))
                .layer(from_fn_with_state(config.server.request_timeout, recover::deadline)),
        )
}
