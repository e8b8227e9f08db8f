use serde::{Deserialize, Serialize};

/// Data scope a role grants on a menu.
///
/// Ordering is the merge order: `ViewAllOrganizations > ViewOwnOrganization > None`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    #[default]
    None,
    ViewOwnOrganization,
    ViewAllOrganizations,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::ViewOwnOrganization => "view_own_organization",
            PermissionLevel::ViewAllOrganizations => "view_all_organizations",
        }
    }

    /// Parse a grantable level. `none` is not a grant and is rejected.
    pub fn parse_grant(s: &str) -> Option<Self> {
        match s {
            "view_own_organization" => Some(PermissionLevel::ViewOwnOrganization),
            "view_all_organizations" => Some(PermissionLevel::ViewAllOrganizations),
            _ => None,
        }
    }

    pub fn is_granted(&self) -> bool {
        *self != PermissionLevel::None
    }
}

impl core::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Highest level among `levels`; `None` when empty.
pub fn merge_permission_levels(levels: impl IntoIterator<Item = PermissionLevel>) -> PermissionLevel {
    levels.into_iter().max().unwrap_or_default()
}
