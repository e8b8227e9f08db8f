//! Menu catalog upload and menu trees.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::Extension;
use axum::response::Response;
use axum::routing::get;

use warden_core::ErrorCode;

use crate::app::dto::ok;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::context::{AuthContext, RequestContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(latest_menu_tree).post(upload_menus))
        .route("/versions", get(list_menu_versions))
        .route("/user", get(user_menu_tree))
}

/// POST /api/v1/permission/menus
///
/// The body is the raw YAML catalog document.
pub async fn upload_menus(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> ApiResult<Response> {
    let document = String::from_utf8(body.to_vec())
        .map_err(|_| ApiError::new(ErrorCode::InvalidParams, "menu document must be UTF-8"))?;
    let version = services
        .identity
        .upload_menus(&ctx.metadata(), auth.claims(), &document)
        .await?;
    Ok(ok(version))
}

pub async fn latest_menu_tree(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    let tree = services
        .identity
        .latest_menu_tree(&ctx.metadata(), auth.claims())
        .await?;
    Ok(ok(tree))
}

pub async fn list_menu_versions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    let versions = services
        .identity
        .list_menu_versions(&ctx.metadata(), auth.claims())
        .await?;
    Ok(ok(versions))
}

/// GET /api/v1/permission/menus/user
///
/// The caller's own tree, merged across every active role they hold.
pub async fn user_menu_tree(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    let tree = services
        .identity
        .user_menu_tree(&ctx.metadata(), auth.claims())
        .await?;
    Ok(ok(tree))
}
