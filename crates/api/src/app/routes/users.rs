//! User administration, role assignments and memberships.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Extension, Path, Query};
use axum::response::Response;
use axum::routing::{delete, get, post, put};

use warden_core::{ErrorCode, RoleId, UserId};
use warden_identity::{
    ACTION_READ, AddMembershipRequest, AssignRoleRequest, CreateUserRequest, RESOURCE_USER,
    ResetPasswordRequest, UpdateUserRequest, UpdateUserStatusRequest,
};

use crate::app::dto::{ApiJson, PageQuery, ok, parse_id};
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::context::{AuthContext, RequestContext};

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:user_id", get(get_user).put(update_user).delete(delete_user))
        .route("/:user_id/status", put(update_user_status))
        .route("/:user_id/reset-password", post(reset_password))
        .route("/:user_id/force-password-change", post(force_password_change))
        .route("/:user_id/roles", get(list_user_roles).post(assign_role))
        .route("/:user_id/roles/:role_id", delete(revoke_role))
        .route("/:user_id/memberships", get(list_memberships).post(add_membership))
        .route("/:user_id/memberships/primary", get(primary_membership))
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> ApiResult<Response> {
    let user = services
        .identity
        .create_user(&ctx.metadata(), auth.claims(), req)
        .await?;
    Ok(ok(user))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Response> {
    let users = services
        .identity
        .list_users(&ctx.metadata(), auth.claims(), query.page())
        .await?;
    Ok(ok(users))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let user = services
        .identity
        .get_user(&ctx.metadata(), auth.claims(), user_id)
        .await?;
    Ok(ok(user))
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let user = services
        .identity
        .update_user(&ctx.metadata(), auth.claims(), user_id, req)
        .await?;
    Ok(ok(user))
}

pub async fn update_user_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserStatusRequest>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let status = services
        .identity
        .update_user_status(&ctx.metadata(), auth.claims(), user_id, req.status)
        .await?;
    Ok(ok(status))
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let status = services
        .identity
        .delete_user(&ctx.metadata(), auth.claims(), user_id)
        .await?;
    Ok(ok(status))
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let status = services
        .identity
        .reset_password(&ctx.metadata(), auth.claims(), user_id, req)
        .await?;
    Ok(ok(status))
}

pub async fn force_password_change(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let status = services
        .identity
        .force_password_change(&ctx.metadata(), auth.claims(), user_id)
        .await?;
    Ok(ok(status))
}

// ─────────────────────────────────────────────────────────────────────────────
// Role assignments
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_user_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let roles = services
        .identity
        .list_user_roles(&ctx.metadata(), auth.claims(), user_id)
        .await?;
    Ok(ok(roles))
}

pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<AssignRoleRequest>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let assignment = services
        .identity
        .assign_role(&ctx.metadata(), auth.claims(), user_id, req.role_id)
        .await?;
    Ok(ok(assignment))
}

pub async fn revoke_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path((user_id, role_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let role_id: RoleId = parse_id(&role_id)?;
    let status = services
        .identity
        .revoke_role(&ctx.metadata(), auth.claims(), user_id, role_id)
        .await?;
    Ok(ok(status))
}

// ─────────────────────────────────────────────────────────────────────────────
// Memberships
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_memberships(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let memberships = services
        .identity
        .list_memberships(&ctx.metadata(), auth.claims(), user_id)
        .await?;
    Ok(ok(memberships))
}

pub async fn add_membership(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<AddMembershipRequest>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let membership = services
        .identity
        .add_membership(&ctx.metadata(), auth.claims(), user_id, req)
        .await?;
    Ok(ok(membership))
}

/// Anyone may read their own primary membership; others need `user:read`.
pub async fn primary_membership(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> ApiResult<Response> {
    let user_id: UserId = parse_id(&user_id)?;
    let md = ctx.metadata();
    let caller = auth.claims();
    if caller.user_id != user_id
        && !services
            .identity
            .authorize(&md, caller.user_id, RESOURCE_USER, ACTION_READ)
            .await?
    {
        return Err(ErrorCode::Forbidden.into());
    }
    let membership = services.identity.primary_membership(&md, user_id).await?;
    Ok(ok(membership))
}
