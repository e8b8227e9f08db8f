use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::{DepartmentId, OrganizationId, RoleId, UserId};

use crate::menu::PermissionLevel;
use crate::user::UserStatus;

/// `corePermission` value of a token that may only change its password.
pub const PASSWORD_CHANGE_ONLY: &str = "password_change_only";

/// Identity facts carried by a token and loaded into the request context.
///
/// Field names on the wire are part of the token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(rename = "userProfileID")]
    pub user_id: UserId,

    pub username: String,

    pub status: UserStatus,

    /// Primary role: the first of the user's active roles.
    #[serde(rename = "roleID", default)]
    pub role_id: Option<RoleId>,

    #[serde(rename = "organizationID", default)]
    pub organization_id: Option<OrganizationId>,

    #[serde(rename = "departmentID", default)]
    pub department_id: Option<DepartmentId>,

    /// Permission summary: the highest menu level across active roles, or
    /// [`PASSWORD_CHANGE_ONLY`] for restricted tokens. Empty when nothing is granted.
    #[serde(rename = "corePermission", default)]
    pub core_permission: String,
}

impl IdentityClaims {
    /// Claims good only for the change-password endpoint.
    pub fn password_change_only(user_id: UserId, username: impl Into<String>, status: UserStatus) -> Self {
        Self {
            user_id,
            username: username.into(),
            status,
            role_id: None,
            organization_id: None,
            department_id: None,
            core_permission: PASSWORD_CHANGE_ONLY.to_string(),
        }
    }

    pub fn is_password_change_only(&self) -> bool {
        self.core_permission == PASSWORD_CHANGE_ONLY
    }

    /// Menu level encoded in `corePermission`, if it is one.
    pub fn core_level(&self) -> PermissionLevel {
        PermissionLevel::parse_grant(&self.core_permission).unwrap_or_default()
    }
}

/// The full signed payload: identity plus the standard time claims (seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub identity: IdentityClaims,
    /// Unique per mint, so two tokens never share a session key.
    #[serde(default)]
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.iat, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Whole seconds left before `exp`, zero once expired.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from(self.exp - now.timestamp()).unwrap_or(0)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time claims against `now`.
///
/// Signature verification happens in the token service before this is called.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
