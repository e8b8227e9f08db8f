//! Role administration plus per-role holders and menu grants.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Extension, Path};
use axum::response::Response;
use axum::routing::get;

use warden_auth::{NewRole, RolePatch};
use warden_core::RoleId;
use warden_identity::{ConfigureRoleMenusRequest, ReplaceRoleUsersRequest};

use crate::app::dto::{ApiJson, ok, parse_id};
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::context::{AuthContext, RequestContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:role_id", get(get_role).put(update_role).delete(delete_role))
        .route("/:role_id/users", get(list_role_users).put(replace_role_users))
        .route("/:role_id/menus", get(role_menu_tree).post(configure_role_menus))
        .route("/:role_id/menu-permissions", get(role_menu_permissions))
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(req): ApiJson<NewRole>,
) -> ApiResult<Response> {
    let role = services
        .identity
        .create_role(&ctx.metadata(), auth.claims(), req)
        .await?;
    Ok(ok(role))
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    let roles = services.identity.list_roles(&ctx.metadata(), auth.claims()).await?;
    Ok(ok(roles))
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<String>,
) -> ApiResult<Response> {
    let role_id: RoleId = parse_id(&role_id)?;
    let role = services
        .identity
        .get_role(&ctx.metadata(), auth.claims(), role_id)
        .await?;
    Ok(ok(role))
}

/// System roles are rejected with `SYSTEM_ROLE_CANNOT_MODIFY`.
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<String>,
    ApiJson(patch): ApiJson<RolePatch>,
) -> ApiResult<Response> {
    let role_id: RoleId = parse_id(&role_id)?;
    let role = services
        .identity
        .update_role(&ctx.metadata(), auth.claims(), role_id, patch)
        .await?;
    Ok(ok(role))
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<String>,
) -> ApiResult<Response> {
    let role_id: RoleId = parse_id(&role_id)?;
    let status = services
        .identity
        .delete_role(&ctx.metadata(), auth.claims(), role_id)
        .await?;
    Ok(ok(status))
}

pub async fn list_role_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<String>,
) -> ApiResult<Response> {
    let role_id: RoleId = parse_id(&role_id)?;
    let assignments = services
        .identity
        .list_role_users(&ctx.metadata(), auth.claims(), role_id)
        .await?;
    Ok(ok(assignments))
}

/// Replace the full holder set of a role.
pub async fn replace_role_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<String>,
    ApiJson(req): ApiJson<ReplaceRoleUsersRequest>,
) -> ApiResult<Response> {
    let role_id: RoleId = parse_id(&role_id)?;
    let assignments = services
        .identity
        .replace_role_users(&ctx.metadata(), auth.claims(), role_id, req.user_ids)
        .await?;
    Ok(ok(assignments))
}

/// The latest catalog annotated with this role's grants.
pub async fn role_menu_tree(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<String>,
) -> ApiResult<Response> {
    let role_id: RoleId = parse_id(&role_id)?;
    let tree = services
        .identity
        .role_menu_tree(&ctx.metadata(), auth.claims(), role_id)
        .await?;
    Ok(ok(tree))
}

pub async fn configure_role_menus(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<String>,
    ApiJson(req): ApiJson<ConfigureRoleMenusRequest>,
) -> ApiResult<Response> {
    let role_id: RoleId = parse_id(&role_id)?;
    let status = services
        .identity
        .configure_role_menus(&ctx.metadata(), auth.claims(), role_id, req)
        .await?;
    Ok(ok(status))
}

pub async fn role_menu_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<String>,
) -> ApiResult<Response> {
    let role_id: RoleId = parse_id(&role_id)?;
    let grants = services
        .identity
        .role_menu_permissions(&ctx.metadata(), auth.claims(), role_id)
        .await?;
    Ok(ok(grants))
}
