//! Menu catalog rows and tree assembly.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::MenuRowId;

use super::level::PermissionLevel;

/// One stored catalog row. Rows of a version form a tree via `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuNode {
    pub row_id: MenuRowId,
    /// Semantic id, stable across catalog versions.
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub path: String,
    pub icon: Option<String>,
    pub component: Option<String>,
    pub sort: i32,
    pub version: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Summary of one uploaded catalog version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuVersion {
    pub version: String,
    pub node_count: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Per-node permission tag used by annotated trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuAnnotation {
    pub has_permission: bool,
    pub permission_level: PermissionLevel,
}

impl MenuAnnotation {
    fn from_level(level: Option<PermissionLevel>) -> Self {
        let level = level.unwrap_or_default();
        Self {
            has_permission: level.is_granted(),
            permission_level: level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuTreeNode {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub sort: i32,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<MenuAnnotation>,
    pub children: Vec<MenuTreeNode>,
}

impl MenuTreeNode {
    fn leaf(node: &MenuNode) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            path: node.path.clone(),
            icon: node.icon.clone(),
            component: node.component.clone(),
            sort: node.sort,
            annotation: None,
            children: Vec::new(),
        }
    }

    /// Depth-first iterator over semantic ids, self first.
    pub fn ids(&self) -> Vec<&str> {
        let mut out = vec![self.id.as_str()];
        for child in &self.children {
            out.extend(child.ids());
        }
        out
    }

    pub fn find(&self, id: &str) -> Option<&MenuTreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

/// Build the forest of a version from its flat rows.
///
/// Nodes whose parent is absent from the set become roots. Siblings are ordered
/// by `(sort, id)`. Rows caught in a parent cycle are unreachable and dropped.
pub fn build_tree(nodes: &[MenuNode]) -> Vec<MenuTreeNode> {
    let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut children: HashMap<&str, Vec<&MenuNode>> = HashMap::new();
    let mut roots: Vec<&MenuNode> = Vec::new();

    for node in nodes {
        match node.parent_id.as_deref() {
            Some(parent) if known.contains(parent) && parent != node.id => {
                children.entry(parent).or_default().push(node);
            }
            _ => roots.push(node),
        }
    }

    sort_siblings(&mut roots);
    for list in children.values_mut() {
        sort_siblings(list);
    }

    let mut visited = HashSet::new();
    roots
        .into_iter()
        .filter_map(|root| assemble(root, &children, &mut visited))
        .collect()
}

fn sort_siblings(list: &mut [&MenuNode]) {
    list.sort_by(|a, b| a.sort.cmp(&b.sort).then_with(|| a.id.cmp(&b.id)));
}

fn assemble<'a>(
    node: &'a MenuNode,
    children: &HashMap<&'a str, Vec<&'a MenuNode>>,
    visited: &mut HashSet<&'a str>,
) -> Option<MenuTreeNode> {
    if !visited.insert(node.id.as_str()) {
        return None;
    }
    let mut out = MenuTreeNode::leaf(node);
    if let Some(kids) = children.get(node.id.as_str()) {
        out.children = kids
            .iter()
            .filter_map(|child| assemble(child, children, visited))
            .collect();
    }
    Some(out)
}

/// Keep only nodes the permission map grants, plus the ancestors needed to reach them.
///
/// Kept nodes are annotated with their own granted level (`none` for
/// ancestors that are only kept structurally). Map entries that match no node
/// are ignored.
pub fn filter_authorized(
    tree: &[MenuTreeNode],
    permissions: &HashMap<String, PermissionLevel>,
) -> Vec<MenuTreeNode> {
    tree.iter()
        .filter_map(|node| filter_node(node, permissions))
        .collect()
}

fn filter_node(
    node: &MenuTreeNode,
    permissions: &HashMap<String, PermissionLevel>,
) -> Option<MenuTreeNode> {
    let kept_children = filter_authorized(&node.children, permissions);
    let own = permissions.get(&node.id).copied();

    if own.is_some() || !kept_children.is_empty() {
        Some(MenuTreeNode {
            annotation: Some(MenuAnnotation::from_level(own)),
            children: kept_children,
            ..node.clone()
        })
    } else {
        None
    }
}

/// Tag every node of the full tree with the level found in `permissions`.
pub fn annotate(
    tree: &[MenuTreeNode],
    permissions: &HashMap<String, PermissionLevel>,
) -> Vec<MenuTreeNode> {
    tree.iter()
        .map(|node| MenuTreeNode {
            annotation: Some(MenuAnnotation::from_level(permissions.get(&node.id).copied())),
            children: annotate(&node.children, permissions),
            ..node.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    pub(crate) fn row(id: &str, parent: Option<&str>, sort: i32) -> MenuNode {
        MenuNode {
            row_id: MenuRowId::new(),
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            name: id.to_uppercase(),
            path: format!("/{id}"),
            icon: None,
            component: None,
            sort,
            version: "v1".into(),
            created_at: Utc::now(),
        }
    }

    fn catalog() -> Vec<MenuTreeNode> {
        build_tree(&[
            row("settings", None, 2),
            row("dashboard", None, 1),
            row("patients", Some("dashboard"), 1),
            row("wards", Some("dashboard"), 0),
            row("audit", Some("settings"), 0),
        ])
    }

    #[test]
    fn builds_sorted_forest() {
        let tree = catalog();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].id, "dashboard");
        assert_eq!(tree[0].children[0].id, "wards");
        assert_eq!(tree[0].children[1].id, "patients");
        assert_eq!(tree[1].children[0].id, "audit");
    }

    #[test]
    fn parent_cycles_do_not_hang() {
        let tree = build_tree(&[row("a", Some("b"), 0), row("b", Some("a"), 0), row("c", None, 0)]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, "c");
    }

    #[test]
    fn unpermitted_parent_with_permitted_descendant_is_retained() {
        let perms = HashMap::from([("patients".to_string(), PermissionLevel::ViewOwnOrganization)]);
        let filtered = filter_authorized(&catalog(), &perms);

        assert_eq!(filtered.len(), 1);
        let dashboard = &filtered[0];
        assert_eq!(dashboard.id, "dashboard");
        assert_eq!(dashboard.annotation.unwrap().permission_level, PermissionLevel::None);
        assert_eq!(dashboard.children.len(), 1);
        assert_eq!(
            dashboard.children[0].annotation.unwrap().permission_level,
            PermissionLevel::ViewOwnOrganization
        );
    }

    #[test]
    fn unpermitted_subtree_is_dropped() {
        let perms = HashMap::from([("audit".to_string(), PermissionLevel::ViewAllOrganizations)]);
        let filtered = filter_authorized(&catalog(), &perms);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "settings");
    }

    #[test]
    fn orphan_permissions_are_ignored() {
        let perms = HashMap::from([("ghost".to_string(), PermissionLevel::ViewAllOrganizations)]);
        assert!(filter_authorized(&catalog(), &perms).is_empty());
    }

    #[test]
    fn annotate_keeps_every_node() {
        let perms = HashMap::from([("wards".to_string(), PermissionLevel::ViewOwnOrganization)]);
        let annotated = annotate(&catalog(), &perms);
        let all: Vec<_> = annotated.iter().flat_map(|n| n.ids()).collect();
        assert_eq!(all.len(), 5);

        let wards = annotated[0].find("wards").unwrap().annotation.unwrap();
        assert!(wards.has_permission);
        let audit = annotated[1].find("audit").unwrap().annotation.unwrap();
        assert!(!audit.has_permission);
        assert_eq!(audit.permission_level, PermissionLevel::None);
    }

    proptest! {
        // Every kept node is either granted or has a kept descendant.
        #[test]
        fn filtered_nodes_are_justified(mask in prop::collection::vec(any::<bool>(), 5)) {
            let ids = ["dashboard", "patients", "wards", "settings", "audit"];
            let perms: HashMap<String, PermissionLevel> = ids
                .iter()
                .zip(mask.iter())
                .filter(|(_, granted)| **granted)
                .map(|(id, _)| (id.to_string(), PermissionLevel::ViewOwnOrganization))
                .collect();

            fn check(node: &MenuTreeNode, perms: &HashMap<String, PermissionLevel>) -> bool {
                (perms.contains_key(&node.id) || !node.children.is_empty())
                    && node.children.iter().all(|c| check(c, perms))
            }

            let filtered = filter_authorized(&catalog(), &perms);
            for node in &filtered {
                prop_assert!(check(node, &perms));
            }
            for id in perms.keys() {
                prop_assert!(filtered.iter().any(|n| n.find(id).is_some()));
            }
        }
    }
}
