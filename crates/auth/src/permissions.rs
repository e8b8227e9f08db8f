use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Wildcard accepted in either half of a permission.
pub const WILDCARD: &str = "*";

/// A `(resource, action)` grant embedded in a role definition.
///
/// A special wildcard `"*"` in the resource or action position can be used by
/// policy layers to indicate "any" without enumerating domain permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub description: String,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(&self.resource, &self.action)
    }

    pub fn is_wildcard(&self) -> bool {
        self.resource == WILDCARD && self.action == WILDCARD
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// The identity of a permission without its description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey {
    pub resource: String,
    pub action: String,
}

impl PermissionKey {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    fn covers(&self, resource: &str, action: &str) -> bool {
        (self.resource == WILDCARD || self.resource == resource)
            && (self.action == WILDCARD || self.action == action)
    }
}

impl core::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// Union of the permission lists of a set of roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<PermissionKey>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PermissionKey) -> bool {
        self.0.insert(key)
    }

    pub fn extend<'a>(&mut self, permissions: impl IntoIterator<Item = &'a Permission>) {
        self.0.extend(permissions.into_iter().map(Permission::key));
    }

    /// Whether `(resource, action)` is granted, honoring wildcards.
    pub fn allows(&self, resource: &str, action: &str) -> bool {
        self.0.iter().any(|k| k.covers(resource, action))
    }

    pub fn contains(&self, key: &PermissionKey) -> bool {
        self.0.contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionKey> {
        self.0.iter()
    }
}

impl FromIterator<PermissionKey> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = PermissionKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let set: PermissionSet = [PermissionKey::new("user", "read")].into_iter().collect();
        assert!(set.allows("user", "read"));
        assert!(!set.allows("user", "write"));
        assert!(!set.allows("role", "read"));
    }

    #[test]
    fn wildcard_action_covers_every_action_on_resource() {
        let set: PermissionSet = [PermissionKey::new("menu", "*")].into_iter().collect();
        assert!(set.allows("menu", "read"));
        assert!(set.allows("menu", "write"));
        assert!(!set.allows("user", "read"));
    }

    #[test]
    fn full_wildcard_covers_everything() {
        let p = Permission::new("*", "*");
        assert!(p.is_wildcard());
        let mut set = PermissionSet::new();
        set.extend([&p]);
        assert!(set.allows("anything", "at-all"));
    }

    #[test]
    fn description_does_not_affect_identity() {
        let a = Permission::new("user", "read").with_description("list users");
        let b = Permission::new("user", "read");
        assert_eq!(a.key(), b.key());
    }
}
