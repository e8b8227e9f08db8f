//! Policy evaluation: effective roles, permission sets and menu trees.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, instrument};

use warden_core::{RoleId, UserId};

use crate::authorize::authorize;
use crate::error::AuthError;
use crate::menu::{
    MenuTreeNode, PermissionLevel, annotate, build_tree, filter_authorized, merge_permission_levels,
};
use crate::permissions::PermissionSet;
use crate::principal::Principal;
use crate::roles::RoleStatus;
use crate::store::{PolicyStore, StoreError};

/// Answers role, permission and menu questions for a user.
///
/// Holds only a store handle and the immutable super-admin name set; cheap to clone.
#[derive(Clone)]
pub struct PolicyEvaluator {
    store: Arc<dyn PolicyStore>,
    super_admin_roles: Arc<HashSet<String>>,
}

impl core::fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PolicyEvaluator")
            .field("super_admin_roles", &self.super_admin_roles)
            .finish_non_exhaustive()
    }
}

impl PolicyEvaluator {
    pub fn new<I, S>(store: Arc<dyn PolicyStore>, super_admin_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            super_admin_roles: Arc::new(super_admin_roles.into_iter().map(Into::into).collect()),
        }
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    pub fn is_super_admin_role(&self, name: &str) -> bool {
        self.super_admin_roles.contains(name)
    }

    /// Role ids of the user's live assignments to ACTIVE roles.
    pub async fn effective_role_ids(&self, user_id: UserId) -> Result<Vec<RoleId>, AuthError> {
        Ok(self
            .store
            .list_active_role_ids_with_status(user_id, RoleStatus::Active)
            .await?)
    }

    /// Resolve everything needed for authorization decisions.
    #[instrument(skip(self), err)]
    pub async fn principal(&self, user_id: UserId) -> Result<Principal, AuthError> {
        let role_ids = self.effective_role_ids(user_id).await?;
        self.principal_for_roles(user_id, role_ids).await
    }

    pub async fn principal_for_roles(
        &self,
        user_id: UserId,
        role_ids: Vec<RoleId>,
    ) -> Result<Principal, AuthError> {
        let roles = self.store.get_roles(&role_ids).await?;

        let mut permissions = PermissionSet::new();
        let mut role_names = Vec::with_capacity(roles.len());
        let mut is_super_admin = false;
        for role in &roles {
            permissions.extend(&role.permissions);
            is_super_admin |= self.is_super_admin_role(&role.name);
            role_names.push(role.name.clone());
        }

        let core_level = if is_super_admin {
            PermissionLevel::ViewAllOrganizations
        } else {
            merge_permission_levels(self.menu_permission_map(&role_ids).await?.into_values())
        };

        Ok(Principal {
            user_id,
            role_ids,
            role_names,
            permissions,
            is_super_admin,
            core_level,
        })
    }

    /// Union of the embedded permission lists of the user's ACTIVE roles.
    pub async fn effective_permission_set(&self, user_id: UserId) -> Result<PermissionSet, AuthError> {
        Ok(self.principal(user_id).await?.permissions)
    }

    pub async fn has_permission(
        &self,
        user_id: UserId,
        resource: &str,
        action: &str,
    ) -> Result<bool, AuthError> {
        let principal = self.principal(user_id).await?;
        Ok(authorize(&principal, resource, action).is_ok())
    }

    /// The level a single role declares for a menu, `None` when it declares none.
    pub async fn menu_permission_level(
        &self,
        role_id: RoleId,
        menu_id: &str,
    ) -> Result<PermissionLevel, AuthError> {
        let grants = self.store.menu_grants_for_role(role_id).await?;
        Ok(merge_permission_levels(
            grants.into_iter().filter(|g| g.menu_id == menu_id).map(|g| g.level),
        ))
    }

    /// Semantic menu id → highest level granted by any of `role_ids`.
    pub async fn menu_permission_map(
        &self,
        role_ids: &[RoleId],
    ) -> Result<HashMap<String, PermissionLevel>, AuthError> {
        let mut map: HashMap<String, PermissionLevel> = HashMap::new();
        for role_id in role_ids {
            for grant in self.store.menu_grants_for_role(*role_id).await? {
                let slot = map.entry(grant.menu_id).or_default();
                *slot = (*slot).max(grant.level);
            }
        }
        Ok(map)
    }

    /// The full tree of the newest catalog version.
    pub async fn latest_menu_tree(&self) -> Result<Vec<MenuTreeNode>, AuthError> {
        let nodes = self.store.latest_menu_nodes().await?;
        Ok(build_tree(&nodes))
    }

    /// The menu tree visible to a user.
    ///
    /// Super-admins get the full latest tree unannotated; everyone else gets the
    /// latest tree filtered by their merged `p2` grants. No roles or no catalog
    /// yields an empty tree.
    #[instrument(skip(self), err)]
    pub async fn build_user_menu_tree(&self, user_id: UserId) -> Result<Vec<MenuTreeNode>, AuthError> {
        let role_ids = self.effective_role_ids(user_id).await?;
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let tree = match self.latest_menu_tree().await {
            Ok(tree) => tree,
            Err(AuthError::Store(StoreError::MenuVersionNotFound)) => {
                debug!("no menu catalog uploaded yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let roles = self.store.get_roles(&role_ids).await?;
        if roles.iter().any(|r| self.is_super_admin_role(&r.name)) {
            return Ok(tree);
        }

        let permissions = self.menu_permission_map(&role_ids).await?;
        Ok(filter_authorized(&tree, &permissions))
    }

    /// The full latest tree with every node tagged for one role.
    pub async fn build_role_menu_tree_annotated(
        &self,
        role_id: RoleId,
    ) -> Result<Vec<MenuTreeNode>, AuthError> {
        self.store
            .get_role(role_id)
            .await?
            .ok_or(AuthError::RoleNotFound)?;
        let tree = self.latest_menu_tree().await?;
        let permissions = self.menu_permission_map(&[role_id]).await?;
        Ok(annotate(&tree, &permissions))
    }
}
