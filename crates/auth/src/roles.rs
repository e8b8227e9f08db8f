use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{AssignmentId, RoleId, UserId};

use crate::error::AuthError;
use crate::permissions::Permission;

pub const ROLE_NAME_MIN_LEN: usize = 2;
pub const ROLE_NAME_MAX_LEN: usize = 50;

/// Lifecycle state of a role definition.
///
/// Only `Active` roles contribute to a user's effective roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleStatus {
    #[default]
    Active,
    Inactive,
    Deprecated,
}

impl RoleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleStatus::Active => "ACTIVE",
            RoleStatus::Inactive => "INACTIVE",
            RoleStatus::Deprecated => "DEPRECATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(RoleStatus::Active),
            "INACTIVE" => Some(RoleStatus::Inactive),
            "DEPRECATED" => Some(RoleStatus::Deprecated),
            _ => None,
        }
    }
}

impl core::fmt::Display for RoleStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named role with an embedded permission list.
///
/// # Invariants
/// - `name` is globally unique, 2–50 characters.
/// - System roles are immutable and cannot be deleted.
/// - A role referenced by any live assignment cannot be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    pub status: RoleStatus,
    pub permissions: Vec<Permission>,
    pub is_system_role: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RoleDefinition {
    pub fn is_active(&self) -> bool {
        self.status == RoleStatus::Active && self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: RoleStatus,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub is_system_role: bool,
}

impl NewRole {
    pub fn into_definition(self, id: RoleId, now: DateTime<Utc>) -> RoleDefinition {
        RoleDefinition {
            id,
            name: self.name,
            description: self.description,
            status: self.status,
            permissions: self.permissions,
            is_system_role: self.is_system_role,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<RoleStatus>,
    pub permissions: Option<Vec<Permission>>,
}

impl RolePatch {
    pub fn apply(&self, role: &mut RoleDefinition) {
        if let Some(name) = &self.name {
            role.name = name.clone();
        }
        if let Some(description) = &self.description {
            role.description = description.clone();
        }
        if let Some(status) = self.status {
            role.status = status;
        }
        if let Some(permissions) = &self.permissions {
            role.permissions = permissions.clone();
        }
    }
}

pub fn validate_role_name(name: &str) -> Result<(), AuthError> {
    let len = name.trim().chars().count();
    if !(ROLE_NAME_MIN_LEN..=ROLE_NAME_MAX_LEN).contains(&len) {
        return Err(AuthError::InvalidInput(format!(
            "role name must be {ROLE_NAME_MIN_LEN}-{ROLE_NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

/// Link between a user and a role.
///
/// `(user_id, role_id)` is unique among non-deleted assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleAssignment {
    pub id: AssignmentId,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UserRoleAssignment {
    pub fn new(user_id: UserId, role_id: RoleId, operator: Option<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            id: AssignmentId::new(),
            user_id,
            role_id,
            created_by: operator,
            updated_by: operator,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_name_bounds() {
        assert!(validate_role_name("a").is_err());
        assert!(validate_role_name("ab").is_ok());
        assert!(validate_role_name(&"r".repeat(50)).is_ok());
        assert!(validate_role_name(&"r".repeat(51)).is_err());
    }

    #[test]
    fn only_active_undeleted_roles_are_active() {
        let mut role = NewRole {
            name: "nurse".into(),
            description: String::new(),
            status: RoleStatus::Active,
            permissions: vec![],
            is_system_role: false,
        }
        .into_definition(RoleId::new(), Utc::now());
        assert!(role.is_active());

        role.status = RoleStatus::Deprecated;
        assert!(!role.is_active());

        role.status = RoleStatus::Active;
        role.deleted_at = Some(Utc::now());
        assert!(!role.is_active());
    }
}
