//! Request and response bodies of the identity service.
//!
//! These are the shapes the gateway deserializes from and serializes into the
//! response envelope, so field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_auth::{
    MenuPermissionConfig, MintedToken, PASSWORD_CHANGE_ONLY, PermissionKey, Principal, UserPatch,
    UserProfile, UserStatus,
};
use warden_core::{DepartmentId, OrganizationId, RoleId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A signed token as handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token: String,
    pub token_type: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    /// Seconds until `expires_at`.
    pub expires_in: i64,
}

impl From<MintedToken> for TokenInfo {
    fn from(minted: MintedToken) -> Self {
        Self {
            expires_in: (minted.expires_at - minted.issued_at).num_seconds(),
            token: minted.token,
            token_type: "Bearer".to_string(),
            issued_at: minted.issued_at,
            expires_at: minted.expires_at,
        }
    }
}

/// What the logged-in user may do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionInfo {
    pub role_ids: Vec<RoleId>,
    pub role_names: Vec<String>,
    pub core_permission: String,
    pub is_super_admin: bool,
    pub permissions: Vec<PermissionKey>,
}

impl PermissionInfo {
    pub fn from_principal(principal: &Principal, core_permission: &str) -> Self {
        Self {
            role_ids: principal.role_ids.clone(),
            role_names: principal.role_names.clone(),
            core_permission: core_permission.to_string(),
            is_super_admin: principal.is_super_admin,
            permissions: principal.permissions.iter().cloned().collect(),
        }
    }

    pub fn password_change_only() -> Self {
        Self {
            core_permission: PASSWORD_CHANGE_ONLY.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_profile: UserProfile,
    pub token_info: TokenInfo,
    pub permission_info: PermissionInfo,
    /// Set when the token is restricted to the change-password endpoint.
    #[serde(skip)]
    pub password_change_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token_info: TokenInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    pub success: bool,
}

impl OperationStatus {
    pub const OK: OperationStatus = OperationStatus { success: true };
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub must_change_password: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub account_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_system_user: bool,
}

/// A profile patch guarded by the version the caller last observed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(flatten)]
    pub patch: UserPatch,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserStatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserList {
    pub items: Vec<UserProfile>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMembershipRequest {
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    #[serde(default)]
    pub is_primary: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles and menus
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRoleRequest {
    pub role_id: RoleId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceRoleUsersRequest {
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRoleMenusRequest {
    pub menus: Vec<MenuPermissionConfig>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn token_info_reports_lifetime_in_seconds() {
        let now = Utc::now();
        let info = TokenInfo::from(MintedToken {
            token: "t".into(),
            issued_at: now,
            expires_at: now + Duration::seconds(3_600),
        });
        assert_eq!(info.expires_in, 3_600);
        assert_eq!(info.token_type, "Bearer");
    }

    #[test]
    fn update_request_flattens_the_patch() {
        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"email":"a@b.c","version":3}"#).unwrap();
        assert_eq!(req.version, 3);
        assert_eq!(req.patch.email.as_deref(), Some("a@b.c"));
        assert!(req.patch.username.is_none());
    }

    #[test]
    fn create_request_defaults() {
        let req: CreateUserRequest =
            serde_json::from_str(r#"{"username":"bob","password":"Secret!1"}"#).unwrap();
        assert_eq!(req.status, UserStatus::Active);
        assert!(!req.must_change_password);
        assert!(!req.is_system_user);
    }
}
