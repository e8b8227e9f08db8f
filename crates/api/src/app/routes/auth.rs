//! Login, logout, refresh, password change and whoami.

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::error;

use warden_core::{ErrorCode, ServiceError};
use warden_identity::{ChangePasswordRequest, LoginRequest};

use crate::app::cookie;
use crate::app::dto::{ApiJson, ok};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::context::{AuthContext, RequestContext};
use crate::middleware::extract_token;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
        .route("/change-password", post(change_password))
        .route("/me", get(me))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/identity/auth/login
///
/// A pending password change answers 403 `MUST_CHANGE_PASSWORD` whose `data`
/// still carries the login payload with a restricted token.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Response> {
    let res = services.identity.login(&ctx.metadata(), req).await?;
    let cookie_cfg = &services.config.cookie;
    let session = cookie::session_cookie(cookie_cfg, &res.token_info.token, services.config.token.timeout);

    let mut response = if res.password_change_required {
        let data = serde_json::to_value(&res).map_err(|e| ApiError::new(ErrorCode::Internal, e.to_string()))?;
        ApiError::with_data(ServiceError::from(ErrorCode::MustChangePassword), data).into_response()
    } else {
        ok(&res)
    };
    cookie::attach(cookie_cfg, &mut response, session);
    Ok(response)
}

/// POST /api/v1/identity/auth/logout
///
/// The revocation runs on its own task so a client hanging up cannot cut it short.
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    let identity = services.identity.clone();
    let md = ctx.metadata();
    let token = auth.token().to_string();
    let revocation = tokio::spawn(async move { identity.logout(&md, &token).await });

    let status = match revocation.await {
        Ok(result) => result?,
        Err(err) => {
            error!(error = %err, "logout task failed");
            return Err(ErrorCode::Internal.into());
        }
    };
    let mut response = ok(status);
    cookie::attach(
        &services.config.cookie,
        &mut response,
        cookie::expired_cookie(&services.config.cookie),
    );
    Ok(response)
}

/// POST /api/v1/identity/auth/refresh
///
/// Public route; the token is read here with the same precedence as the
/// auth filter.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    uri: Uri,
) -> ApiResult<Response> {
    let cookie_cfg = &services.config.cookie;
    let token = extract_token(&headers, &uri, cookie_cfg)
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "authentication token is required"))?;

    let res = services.identity.refresh(&ctx.metadata(), &token).await?;
    let session = cookie::session_cookie(cookie_cfg, &res.token_info.token, services.config.token.timeout);
    let mut response = ok(&res);
    cookie::attach(cookie_cfg, &mut response, session);
    Ok(response)
}

/// POST /api/v1/identity/auth/change-password
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Response> {
    let status = services
        .identity
        .change_password(&ctx.metadata(), auth.claims(), req)
        .await?;
    Ok(ok(status))
}

/// GET /api/v1/identity/auth/me
pub async fn me(Extension(auth): Extension<AuthContext>) -> Response {
    ok(auth.claims())
}
