//! Policy rule table: six string columns `(ptype, v0..v5)`.
//!
//! Three families share the table:
//! - `p`  permission rule `(role_id, resource, action)`
//! - `p2` menu-permission rule `(role_id, semantic_menu_id, level)`
//! - `g`  grouping rule `(subject, role_id)`

use serde::{Deserialize, Serialize};

use warden_core::RoleId;

use crate::menu::PermissionLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyType {
    #[serde(rename = "p")]
    Permission,
    #[serde(rename = "p2")]
    MenuPermission,
    #[serde(rename = "g")]
    Grouping,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Permission => "p",
            PolicyType::MenuPermission => "p2",
            PolicyType::Grouping => "g",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "p" => Some(PolicyType::Permission),
            "p2" => Some(PolicyType::MenuPermission),
            "g" => Some(PolicyType::Grouping),
            _ => None,
        }
    }
}

/// One row of the rule table. Unused trailing columns are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyRule {
    pub ptype: String,
    pub v0: String,
    pub v1: String,
    pub v2: String,
    #[serde(default)]
    pub v3: String,
    #[serde(default)]
    pub v4: String,
    #[serde(default)]
    pub v5: String,
}

impl PolicyRule {
    fn with(ptype: PolicyType, values: &[&str]) -> Self {
        let col = |i: usize| values.get(i).map(|s| s.to_string()).unwrap_or_default();
        Self {
            ptype: ptype.as_str().to_string(),
            v0: col(0),
            v1: col(1),
            v2: col(2),
            v3: col(3),
            v4: col(4),
            v5: col(5),
        }
    }

    /// Build a rule from a raw row; extra trailing empty columns are accepted.
    pub fn from_columns(columns: &[&str]) -> Option<Self> {
        let (ptype, rest) = columns.split_first()?;
        let ptype = PolicyType::parse(ptype)?;
        let mut values: Vec<&str> = rest.to_vec();
        while values.last().is_some_and(|v| v.is_empty()) {
            values.pop();
        }
        if values.len() > 6 {
            return None;
        }
        Some(Self::with(ptype, &values))
    }

    pub fn permission(role_id: RoleId, resource: &str, action: &str) -> Self {
        Self::with(PolicyType::Permission, &[&role_id.to_string(), resource, action])
    }

    pub fn menu_permission(role_id: RoleId, menu_id: &str, level: PermissionLevel) -> Self {
        Self::with(
            PolicyType::MenuPermission,
            &[&role_id.to_string(), menu_id, level.as_str()],
        )
    }

    pub fn grouping(subject: &str, role_id: RoleId) -> Self {
        Self::with(PolicyType::Grouping, &[subject, &role_id.to_string()])
    }

    pub fn policy_type(&self) -> Option<PolicyType> {
        PolicyType::parse(&self.ptype)
    }

    pub fn is(&self, ptype: PolicyType) -> bool {
        self.ptype == ptype.as_str()
    }

    /// `(menu_id, level)` of a `p2` rule. Unknown level strings yield `None`.
    pub fn as_menu_permission(&self) -> Option<(&str, PermissionLevel)> {
        if !self.is(PolicyType::MenuPermission) {
            return None;
        }
        PermissionLevel::parse_grant(&self.v2).map(|level| (self.v1.as_str(), level))
    }
}

/// One entry of a `ConfigureRoleMenus` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuPermissionConfig {
    pub menu_id: String,
    pub permission: String,
}

/// A validated `p2` grant ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuGrant {
    pub menu_id: String,
    pub level: PermissionLevel,
}

/// Validate a configuration batch.
///
/// Entries with an empty menu id are skipped; any invalid permission string
/// rejects the whole batch. Returns the offending string on failure.
pub fn validate_menu_configs(configs: &[MenuPermissionConfig]) -> Result<Vec<MenuGrant>, String> {
    let mut grants: Vec<MenuGrant> = Vec::with_capacity(configs.len());
    for cfg in configs {
        let menu_id = cfg.menu_id.trim();
        let level = PermissionLevel::parse_grant(cfg.permission.trim())
            .ok_or_else(|| cfg.permission.clone())?;
        if menu_id.is_empty() {
            continue;
        }
        // Set semantics: the last entry for a menu wins.
        grants.retain(|g| g.menu_id != menu_id);
        grants.push(MenuGrant {
            menu_id: menu_id.to_string(),
            level,
        });
    }
    Ok(grants)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(menu: &str, perm: &str) -> MenuPermissionConfig {
        MenuPermissionConfig {
            menu_id: menu.into(),
            permission: perm.into(),
        }
    }

    #[test]
    fn rule_columns_follow_layout() {
        let role = RoleId::new();
        let rule = PolicyRule::menu_permission(role, "dashboard", PermissionLevel::ViewAllOrganizations);
        assert_eq!(rule.ptype, "p2");
        assert_eq!(rule.v0, role.to_string());
        assert_eq!(rule.v1, "dashboard");
        assert_eq!(rule.v2, "view_all_organizations");
        assert!(rule.v3.is_empty() && rule.v4.is_empty() && rule.v5.is_empty());
        assert_eq!(
            rule.as_menu_permission(),
            Some(("dashboard", PermissionLevel::ViewAllOrganizations))
        );
    }

    #[test]
    fn loader_accepts_trailing_empty_columns() {
        let rule = PolicyRule::from_columns(&["p", "r1", "user", "read", "", "", "", "", ""]).unwrap();
        assert_eq!(rule.v2, "read");
        assert!(PolicyRule::from_columns(&["x", "r1"]).is_none());
        assert!(PolicyRule::from_columns(&[]).is_none());
    }

    #[test]
    fn invalid_permission_rejects_whole_batch() {
        let err = validate_menu_configs(&[cfg("a", "view_own_organization"), cfg("b", "root")]);
        assert_eq!(err, Err("root".to_string()));
    }

    #[test]
    fn empty_menu_ids_are_skipped_and_duplicates_collapse() {
        let grants = validate_menu_configs(&[
            cfg("", "view_own_organization"),
            cfg("a", "view_own_organization"),
            cfg("a", "view_all_organizations"),
        ])
        .unwrap();
        assert_eq!(
            grants,
            vec![MenuGrant {
                menu_id: "a".into(),
                level: PermissionLevel::ViewAllOrganizations
            }]
        );
    }
}
