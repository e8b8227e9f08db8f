use serde::Serialize;

use warden_core::{RoleId, UserId};

use crate::menu::PermissionLevel;
use crate::permissions::PermissionSet;

/// A fully resolved principal for authorization decisions.
///
/// Built by the policy evaluator from the user's ACTIVE roles; holds no
/// storage handles so checks against it are pure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: UserId,
    pub role_ids: Vec<RoleId>,
    pub role_names: Vec<String>,
    pub permissions: PermissionSet,
    /// Holds a role named in the configured super-admin set.
    pub is_super_admin: bool,
    /// Highest menu level across the roles.
    pub core_level: PermissionLevel,
}

impl Principal {
    /// The primary role is the first active role.
    pub fn primary_role(&self) -> Option<RoleId> {
        self.role_ids.first().copied()
    }

    pub fn has_roles(&self) -> bool {
        !self.role_ids.is_empty()
    }
}
