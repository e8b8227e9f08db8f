//! User profiles and organization memberships.
//!
//! This module holds the persistent identity model the credential store owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{DepartmentId, MembershipId, OrganizationId, UserId};

use crate::error::AuthError;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    /// User is active and can authenticate.
    #[default]
    Active,
    /// Account disabled by an administrator.
    Inactive,
    /// Account temporarily suspended.
    Suspended,
    /// Too many failed login attempts.
    Locked,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Inactive => "INACTIVE",
            UserStatus::Suspended => "SUSPENDED",
            UserStatus::Locked => "LOCKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(UserStatus::Active),
            "INACTIVE" => Some(UserStatus::Inactive),
            "SUSPENDED" => Some(UserStatus::Suspended),
            "LOCKED" => Some(UserStatus::Locked),
            _ => None,
        }
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User Profile
// ─────────────────────────────────────────────────────────────────────────────

/// Persistent user profile.
///
/// # Invariants
/// - `username` is unique and 3–20 characters.
/// - A system user cannot be deleted, renamed, or have `is_system_user` cleared.
/// - `version` increases by one on every successful update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: UserStatus,
    pub login_attempts: u32,
    pub must_change_password: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub account_expires_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_system_user: bool,
    pub version: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.account_expires_at.is_some_and(|at| at <= now)
    }
}

/// Input for creating a user profile. The password is already hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: UserStatus,
    pub must_change_password: bool,
    pub account_expires_at: Option<DateTime<Utc>>,
    pub is_system_user: bool,
}

impl NewUser {
    pub fn into_profile(self, id: UserId, now: DateTime<Utc>) -> UserProfile {
        UserProfile {
            id,
            username: self.username,
            password_hash: self.password_hash,
            email: self.email,
            phone: self.phone,
            status: self.status,
            login_attempts: 0,
            must_change_password: self.must_change_password,
            account_expires_at: self.account_expires_at,
            last_login_at: None,
            is_system_user: self.is_system_user,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Mutable profile fields for an administrative or self-service update.
///
/// `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_system_user: Option<bool>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub account_expires_at: Option<DateTime<Utc>>,
}

impl UserPatch {
    /// Check the system-user invariants against the current profile.
    pub fn ensure_allowed_for(&self, current: &UserProfile) -> Result<(), AuthError> {
        if !current.is_system_user {
            return Ok(());
        }
        if let Some(name) = &self.username {
            if name != &current.username {
                return Err(AuthError::SystemUserCannotModify(
                    "username of a system user cannot change".into(),
                ));
            }
        }
        if self.is_system_user == Some(false) {
            return Err(AuthError::SystemUserCannotModify(
                "system flag cannot be cleared".into(),
            ));
        }
        Ok(())
    }

    pub fn apply(&self, profile: &mut UserProfile) {
        if let Some(username) = &self.username {
            profile.username = username.clone();
        }
        if let Some(email) = &self.email {
            profile.email = Some(email.clone());
        }
        if let Some(phone) = &self.phone {
            profile.phone = Some(phone.clone());
        }
        if let Some(flag) = self.is_system_user {
            profile.is_system_user = flag;
        }
        if self.account_expires_at.is_some() {
            profile.account_expires_at = self.account_expires_at;
        }
    }
}

/// Validate a username: 3–20 characters of `[A-Za-z0-9_.-]`.
pub fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AuthError::InvalidInput(format!(
            "username must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(AuthError::InvalidInput(
            "username may only contain letters, digits, '_', '.' and '-'".into(),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Memberships
// ─────────────────────────────────────────────────────────────────────────────

/// Links a user to one (organization, optional department) pair.
///
/// At most one non-deleted membership per user has `is_primary = true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMembership {
    pub id: MembershipId,
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub department_id: Option<DepartmentId>,
    pub is_primary: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UserMembership {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(system: bool) -> UserProfile {
        NewUser {
            username: "root".into(),
            password_hash: "x".into(),
            email: None,
            phone: None,
            status: UserStatus::Active,
            must_change_password: false,
            account_expires_at: None,
            is_system_user: system,
        }
        .into_profile(UserId::new(), Utc::now())
    }

    #[test]
    fn username_length_bounds() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username(&"a".repeat(20)).is_ok());
        assert!(validate_username(&"a".repeat(21)).is_err());
        assert!(validate_username("bad name").is_err());
    }

    #[test]
    fn system_user_cannot_be_renamed_or_unflagged() {
        let current = profile(true);

        let rename = UserPatch {
            username: Some("other".into()),
            ..Default::default()
        };
        assert!(matches!(
            rename.ensure_allowed_for(&current),
            Err(AuthError::SystemUserCannotModify(_))
        ));

        let unflag = UserPatch {
            is_system_user: Some(false),
            ..Default::default()
        };
        assert!(unflag.ensure_allowed_for(&current).is_err());

        let email = UserPatch {
            email: Some("root@example.com".into()),
            ..Default::default()
        };
        assert!(email.ensure_allowed_for(&current).is_ok());
    }

    #[test]
    fn regular_user_may_change_username() {
        let current = profile(false);
        let patch = UserPatch {
            username: Some("renamed".into()),
            ..Default::default()
        };
        assert!(patch.ensure_allowed_for(&current).is_ok());

        let mut updated = current.clone();
        patch.apply(&mut updated);
        assert_eq!(updated.username, "renamed");
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(UserStatus::parse("locked"), Some(UserStatus::Locked));
        assert_eq!(UserStatus::parse("nope"), None);
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(profile(false)).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["status"], "ACTIVE");
    }
}
