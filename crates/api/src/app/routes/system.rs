use std::sync::Arc;

use axum::extract::Extension;
use axum::response::Response;
use serde_json::json;

use warden_core::ErrorCode;

use crate::app::dto::ok;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Response {
    ok(json!({
        "status": "ok",
        "backend": services.backend,
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::new(ErrorCode::NotFound, "no such route")
}
