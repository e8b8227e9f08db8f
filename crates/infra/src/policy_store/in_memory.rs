use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_auth::{
    MenuGrant, MenuNode, MenuVersion, PolicyRule, PolicyStore, PolicyType, RoleDefinition, RoleStatus,
    StoreError, StoreResult, UserRoleAssignment,
};
use warden_core::{RoleId, UserId};

#[derive(Debug, Default)]
struct State {
    roles: HashMap<RoleId, RoleDefinition>,
    /// Insertion order is creation order.
    assignments: Vec<UserRoleAssignment>,
    menus: Vec<MenuNode>,
    versions: Vec<MenuVersion>,
    rules: BTreeSet<PolicyRule>,
}

impl State {
    fn live_role(&self, role_id: RoleId) -> StoreResult<&RoleDefinition> {
        self.roles
            .get(&role_id)
            .filter(|r| r.deleted_at.is_none())
            .ok_or(StoreError::RoleNotFound)
    }

    fn name_taken(&self, name: &str, except: Option<RoleId>) -> bool {
        self.roles
            .values()
            .any(|r| r.deleted_at.is_none() && r.name == name && Some(r.id) != except)
    }

    fn mirror_permissions(&mut self, role: &RoleDefinition) {
        let subject = role.id.to_string();
        self.rules
            .retain(|r| !(r.is(PolicyType::Permission) && r.v0 == subject));
        for p in &role.permissions {
            self.rules
                .insert(PolicyRule::permission(role.id, &p.resource, &p.action));
        }
    }

    fn purge_role_rules(&mut self, role_id: RoleId) {
        let subject = role_id.to_string();
        self.rules.retain(|r| {
            let owned = (r.is(PolicyType::Permission) || r.is(PolicyType::MenuPermission)) && r.v0 == subject;
            let grouped = r.is(PolicyType::Grouping) && r.v1 == subject;
            !(owned || grouped)
        });
    }

    fn live_assignment_mut(&mut self, user_id: UserId, role_id: RoleId) -> Option<&mut UserRoleAssignment> {
        self.assignments
            .iter_mut()
            .find(|a| a.is_active() && a.user_id == user_id && a.role_id == role_id)
    }

    fn revoke(&mut self, user_id: UserId, role_id: RoleId, operator: Option<UserId>, now: DateTime<Utc>) -> bool {
        let Some(assignment) = self.live_assignment_mut(user_id, role_id) else {
            return false;
        };
        assignment.deleted_at = Some(now);
        assignment.updated_at = now;
        assignment.updated_by = operator;
        self.rules
            .remove(&PolicyRule::grouping(&user_id.to_string(), role_id));
        true
    }

    fn assign(&mut self, assignment: UserRoleAssignment) {
        self.rules
            .insert(PolicyRule::grouping(&assignment.user_id.to_string(), assignment.role_id));
        self.assignments.push(assignment);
    }
}

/// In-memory policy store.
///
/// Intended for tests/dev. One write lock guards roles, assignments, menus
/// and the rule table so mirrored rule writes are atomic with their rows.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    state: RwLock<State>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> StoreResult<T>) -> StoreResult<T> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        f(&state)
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        f(&mut state)
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn create_role(&self, role: RoleDefinition) -> StoreResult<RoleDefinition> {
        self.write(|s| {
            if s.name_taken(&role.name, None) || s.roles.contains_key(&role.id) {
                return Err(StoreError::AlreadyExists(format!("role '{}'", role.name)));
            }
            s.mirror_permissions(&role);
            s.roles.insert(role.id, role.clone());
            Ok(role)
        })
    }

    async fn get_role(&self, role_id: RoleId) -> StoreResult<Option<RoleDefinition>> {
        self.read(|s| Ok(s.live_role(role_id).ok().cloned()))
    }

    async fn get_role_by_name(&self, name: &str) -> StoreResult<Option<RoleDefinition>> {
        self.read(|s| {
            Ok(s.roles
                .values()
                .find(|r| r.deleted_at.is_none() && r.name == name)
                .cloned())
        })
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleDefinition>> {
        self.read(|s| {
            let mut roles: Vec<RoleDefinition> = s
                .roles
                .values()
                .filter(|r| r.deleted_at.is_none())
                .cloned()
                .collect();
            roles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
            Ok(roles)
        })
    }

    async fn update_role(&self, role: &RoleDefinition) -> StoreResult<RoleDefinition> {
        self.write(|s| {
            s.live_role(role.id)?;
            if s.name_taken(&role.name, Some(role.id)) {
                return Err(StoreError::AlreadyExists(format!("role '{}'", role.name)));
            }
            s.mirror_permissions(role);
            s.roles.insert(role.id, role.clone());
            Ok(role.clone())
        })
    }

    async fn delete_role(&self, role_id: RoleId, now: DateTime<Utc>) -> StoreResult<()> {
        self.write(|s| {
            s.live_role(role_id)?;
            let in_use = s
                .assignments
                .iter()
                .filter(|a| a.is_active() && a.role_id == role_id)
                .count();
            if in_use > 0 {
                return Err(StoreError::RoleInUse(in_use));
            }
            if let Some(role) = s.roles.get_mut(&role_id) {
                role.deleted_at = Some(now);
                role.updated_at = now;
            }
            s.purge_role_rules(role_id);
            Ok(())
        })
    }

    async fn assign_role(&self, assignment: UserRoleAssignment) -> StoreResult<UserRoleAssignment> {
        self.write(|s| {
            s.live_role(assignment.role_id)?;
            if s.live_assignment_mut(assignment.user_id, assignment.role_id).is_some() {
                return Err(StoreError::AssignmentExists);
            }
            s.assign(assignment.clone());
            Ok(assignment)
        })
    }

    async fn revoke_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        operator: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.write(|s| {
            if s.revoke(user_id, role_id, operator, now) {
                Ok(())
            } else {
                Err(StoreError::NotFound("role assignment".to_string()))
            }
        })
    }

    async fn list_user_assignments(&self, user_id: UserId) -> StoreResult<Vec<UserRoleAssignment>> {
        self.read(|s| {
            Ok(s.assignments
                .iter()
                .filter(|a| a.is_active() && a.user_id == user_id)
                .cloned()
                .collect())
        })
    }

    async fn list_role_assignments(&self, role_id: RoleId) -> StoreResult<Vec<UserRoleAssignment>> {
        self.read(|s| {
            Ok(s.assignments
                .iter()
                .filter(|a| a.is_active() && a.role_id == role_id)
                .cloned()
                .collect())
        })
    }

    async fn list_active_role_ids_with_status(
        &self,
        user_id: UserId,
        status: RoleStatus,
    ) -> StoreResult<Vec<RoleId>> {
        self.read(|s| {
            Ok(s.assignments
                .iter()
                .filter(|a| a.is_active() && a.user_id == user_id)
                .filter(|a| s.live_role(a.role_id).is_ok_and(|r| r.status == status))
                .map(|a| a.role_id)
                .collect())
        })
    }

    async fn replace_role_users(
        &self,
        role_id: RoleId,
        user_ids: &[UserId],
        operator: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<UserRoleAssignment>> {
        self.write(|s| {
            s.live_role(role_id)?;
            let wanted: HashSet<UserId> = user_ids.iter().copied().collect();

            let current: Vec<UserId> = s
                .assignments
                .iter()
                .filter(|a| a.is_active() && a.role_id == role_id)
                .map(|a| a.user_id)
                .collect();
            for user_id in current.iter().filter(|u| !wanted.contains(u)) {
                s.revoke(*user_id, role_id, operator, now);
            }

            let mut added = HashSet::new();
            for user_id in user_ids {
                if current.contains(user_id) || !added.insert(*user_id) {
                    continue;
                }
                s.assign(UserRoleAssignment::new(*user_id, role_id, operator, now));
            }

            Ok(s.assignments
                .iter()
                .filter(|a| a.is_active() && a.role_id == role_id)
                .cloned()
                .collect())
        })
    }

    async fn configure_role_menus(&self, role_id: RoleId, grants: &[MenuGrant]) -> StoreResult<()> {
        self.write(|s| {
            s.live_role(role_id)?;
            let subject = role_id.to_string();
            s.rules
                .retain(|r| !(r.is(PolicyType::MenuPermission) && r.v0 == subject));
            for grant in grants {
                s.rules
                    .insert(PolicyRule::menu_permission(role_id, &grant.menu_id, grant.level));
            }
            Ok(())
        })
    }

    async fn menu_grants_for_role(&self, role_id: RoleId) -> StoreResult<Vec<MenuGrant>> {
        self.read(|s| {
            let subject = role_id.to_string();
            Ok(s.rules
                .iter()
                .filter(|r| r.v0 == subject)
                .filter_map(PolicyRule::as_menu_permission)
                .map(|(menu_id, level)| MenuGrant {
                    menu_id: menu_id.to_string(),
                    level,
                })
                .collect())
        })
    }

    async fn insert_menu_version(&self, version: &str, nodes: Vec<MenuNode>) -> StoreResult<MenuVersion> {
        self.write(|s| {
            if s.versions.iter().any(|v| v.version == version) {
                return Err(StoreError::AlreadyExists(format!("menu version '{version}'")));
            }
            let summary = MenuVersion {
                version: version.to_string(),
                node_count: nodes.len(),
                created_at: nodes.first().map(|n| n.created_at).unwrap_or_else(Utc::now),
            };
            s.menus.extend(nodes.into_iter().map(|mut n| {
                n.version = version.to_string();
                n
            }));
            s.versions.push(summary.clone());
            Ok(summary)
        })
    }

    async fn latest_menu_version(&self) -> StoreResult<Option<MenuVersion>> {
        self.read(|s| {
            Ok(s.versions
                .iter()
                .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.version.cmp(&b.version)))
                .cloned())
        })
    }

    async fn list_menus(&self, version: &str) -> StoreResult<Vec<MenuNode>> {
        self.read(|s| {
            let mut rows: Vec<MenuNode> = s.menus.iter().filter(|n| n.version == version).cloned().collect();
            rows.sort_by(|a, b| {
                a.parent_id
                    .cmp(&b.parent_id)
                    .then(a.sort.cmp(&b.sort))
                    .then(a.id.cmp(&b.id))
            });
            Ok(rows)
        })
    }

    async fn list_menu_versions(&self) -> StoreResult<Vec<MenuVersion>> {
        self.read(|s| {
            let mut versions = s.versions.clone();
            versions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.version.cmp(&a.version)));
            Ok(versions)
        })
    }

    async fn list_rules(&self, ptype: PolicyType) -> StoreResult<Vec<PolicyRule>> {
        self.read(|s| Ok(s.rules.iter().filter(|r| r.is(ptype)).cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use warden_auth::{NewRole, Permission, PermissionLevel};

    use super::*;

    fn role(name: &str, permissions: Vec<Permission>) -> RoleDefinition {
        NewRole {
            name: name.to_string(),
            description: String::new(),
            status: RoleStatus::Active,
            permissions,
            is_system_role: false,
        }
        .into_definition(RoleId::new(), Utc::now())
    }

    fn grant(menu: &str, level: PermissionLevel) -> MenuGrant {
        MenuGrant {
            menu_id: menu.to_string(),
            level,
        }
    }

    #[tokio::test]
    async fn role_writes_mirror_permission_rules() {
        let store = InMemoryPolicyStore::new();
        let mut nurse = store
            .create_role(role("nurse", vec![Permission::new("user", "read")]))
            .await
            .unwrap();
        assert_eq!(
            store.list_rules(PolicyType::Permission).await.unwrap(),
            vec![PolicyRule::permission(nurse.id, "user", "read")]
        );

        nurse.permissions = vec![Permission::new("menu", "read"), Permission::new("role", "read")];
        store.update_role(&nurse).await.unwrap();
        let rules = store.list_rules(PolicyType::Permission).await.unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.v1 != "user"));
    }

    #[tokio::test]
    async fn role_names_are_unique_among_live_roles() {
        let store = InMemoryPolicyStore::new();
        store.create_role(role("nurse", vec![])).await.unwrap();
        let err = store.create_role(role("nurse", vec![])).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn assigned_role_cannot_be_deleted() {
        let store = InMemoryPolicyStore::new();
        let nurse = store.create_role(role("nurse", vec![])).await.unwrap();
        let user = UserId::new();
        store
            .assign_role(UserRoleAssignment::new(user, nurse.id, None, Utc::now()))
            .await
            .unwrap();

        let err = store.delete_role(nurse.id, Utc::now()).await.unwrap_err();
        assert_eq!(err, StoreError::RoleInUse(1));

        store.revoke_role(user, nurse.id, None, Utc::now()).await.unwrap();
        store.delete_role(nurse.id, Utc::now()).await.unwrap();
        assert!(store.get_role(nurse.id).await.unwrap().is_none());
        assert!(store.list_rules(PolicyType::Grouping).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_assignment_is_rejected_and_revoke_of_missing_fails() {
        let store = InMemoryPolicyStore::new();
        let nurse = store.create_role(role("nurse", vec![])).await.unwrap();
        let user = UserId::new();
        store
            .assign_role(UserRoleAssignment::new(user, nurse.id, None, Utc::now()))
            .await
            .unwrap();
        let err = store
            .assign_role(UserRoleAssignment::new(user, nurse.id, None, Utc::now()))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::AssignmentExists);

        let err = store
            .revoke_role(UserId::new(), nurse.id, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn effective_roles_follow_role_status() {
        let store = InMemoryPolicyStore::new();
        let active = store.create_role(role("active", vec![])).await.unwrap();
        let mut retired = store.create_role(role("retired", vec![])).await.unwrap();
        let user = UserId::new();
        for id in [active.id, retired.id] {
            store
                .assign_role(UserRoleAssignment::new(user, id, None, Utc::now()))
                .await
                .unwrap();
        }
        retired.status = RoleStatus::Deprecated;
        store.update_role(&retired).await.unwrap();

        let ids = store
            .list_active_role_ids_with_status(user, RoleStatus::Active)
            .await
            .unwrap();
        assert_eq!(ids, vec![active.id]);
    }

    #[tokio::test]
    async fn replace_role_users_keeps_survivors_and_swaps_the_rest() {
        let store = InMemoryPolicyStore::new();
        let nurse = store.create_role(role("nurse", vec![])).await.unwrap();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        store.replace_role_users(nurse.id, &[a, b], None, Utc::now()).await.unwrap();
        let kept = store.list_role_assignments(nurse.id).await.unwrap();
        let a_assignment = kept.iter().find(|x| x.user_id == a).unwrap().id;

        let after = store
            .replace_role_users(nurse.id, &[a, c, c], None, Utc::now())
            .await
            .unwrap();
        let users: HashSet<UserId> = after.iter().map(|x| x.user_id).collect();
        assert_eq!(users, HashSet::from([a, c]));
        assert_eq!(after.iter().find(|x| x.user_id == a).unwrap().id, a_assignment);
        assert_eq!(store.list_rules(PolicyType::Grouping).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn configure_role_menus_replaces_previous_grants() {
        let store = InMemoryPolicyStore::new();
        let nurse = store.create_role(role("nurse", vec![])).await.unwrap();
        store
            .configure_role_menus(
                nurse.id,
                &[
                    grant("dashboard", PermissionLevel::ViewOwnOrganization),
                    grant("reports", PermissionLevel::ViewAllOrganizations),
                ],
            )
            .await
            .unwrap();
        store
            .configure_role_menus(nurse.id, &[grant("dashboard", PermissionLevel::ViewAllOrganizations)])
            .await
            .unwrap();
        assert_eq!(
            store.menu_grants_for_role(nurse.id).await.unwrap(),
            vec![grant("dashboard", PermissionLevel::ViewAllOrganizations)]
        );

        store.configure_role_menus(nurse.id, &[]).await.unwrap();
        assert!(store.menu_grants_for_role(nurse.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn configuring_menus_of_unknown_role_fails() {
        let store = InMemoryPolicyStore::new();
        let err = store.configure_role_menus(RoleId::new(), &[]).await.unwrap_err();
        assert_eq!(err, StoreError::RoleNotFound);
    }

    #[tokio::test]
    async fn no_catalog_means_menu_version_not_found() {
        let store = InMemoryPolicyStore::new();
        assert!(store.latest_menu_version().await.unwrap().is_none());
        assert_eq!(
            store.latest_menu_nodes().await.unwrap_err(),
            StoreError::MenuVersionNotFound
        );
    }
}
