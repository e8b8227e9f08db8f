//! Role administration and user-role assignments.

use std::collections::HashSet;

use tracing::info;

use warden_auth::{
    AuthError, IdentityClaims, NewRole, RoleDefinition, RolePatch, UserRoleAssignment,
    roles::validate_role_name,
};
use warden_core::{RoleId, ServiceResult, UserId, time::now_millis};
use warden_observability::RpcMetadata;

use crate::access::{ACTION_READ, ACTION_WRITE, RESOURCE_ROLE};
use crate::model::OperationStatus;
use crate::service::{IdentityService, traced};

impl IdentityService {
    pub async fn create_role(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        mut req: NewRole,
    ) -> ServiceResult<RoleDefinition> {
        traced(md, "create_role", async {
            self.require(operator, RESOURCE_ROLE, ACTION_WRITE).await?;
            req.name = req.name.trim().to_string();
            validate_role_name(&req.name)?;
            let role = self
                .policies
                .create_role(req.into_definition(RoleId::new(), now_millis()))
                .await?;
            info!(role_id = %role.id, name = %role.name, "role created");
            Ok(role)
        })
        .await
    }

    pub async fn get_role(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        role_id: RoleId,
    ) -> ServiceResult<RoleDefinition> {
        traced(md, "get_role", async {
            self.require(operator, RESOURCE_ROLE, ACTION_READ).await?;
            self.load_role(role_id).await
        })
        .await
    }

    pub async fn list_roles(&self, md: &RpcMetadata, operator: &IdentityClaims) -> ServiceResult<Vec<RoleDefinition>> {
        traced(md, "list_roles", async {
            self.require(operator, RESOURCE_ROLE, ACTION_READ).await?;
            Ok(self.policies.list_roles().await?)
        })
        .await
    }

    pub async fn update_role(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        role_id: RoleId,
        mut patch: RolePatch,
    ) -> ServiceResult<RoleDefinition> {
        traced(md, "update_role", async {
            self.require(operator, RESOURCE_ROLE, ACTION_WRITE).await?;
            let mut role = self.load_role(role_id).await?;
            if role.is_system_role {
                return Err(AuthError::SystemRoleCannotModify.into());
            }
            if let Some(name) = patch.name.as_mut() {
                *name = name.trim().to_string();
                validate_role_name(name)?;
            }
            patch.apply(&mut role);
            role.updated_at = now_millis();
            Ok(self.policies.update_role(&role).await?)
        })
        .await
    }

    pub async fn delete_role(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        role_id: RoleId,
    ) -> ServiceResult<OperationStatus> {
        traced(md, "delete_role", async {
            self.require(operator, RESOURCE_ROLE, ACTION_WRITE).await?;
            let role = self.load_role(role_id).await?;
            if role.is_system_role {
                return Err(AuthError::SystemRoleCannotDelete.into());
            }
            self.policies.delete_role(role_id, now_millis()).await?;
            info!(role_id = %role_id, name = %role.name, "role deleted");
            Ok(OperationStatus::OK)
        })
        .await
    }

    // Assignments

    pub async fn assign_role(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
        role_id: RoleId,
    ) -> ServiceResult<UserRoleAssignment> {
        traced(md, "assign_role", async {
            self.require(operator, RESOURCE_ROLE, ACTION_WRITE).await?;
            self.load_user(user_id).await?;
            self.load_role(role_id).await?;
            let assignment = UserRoleAssignment::new(user_id, role_id, Some(operator.user_id), now_millis());
            Ok(self.policies.assign_role(assignment).await?)
        })
        .await
    }

    /// Remove a role from a user. A system role never leaves a system user.
    pub async fn revoke_role(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
        role_id: RoleId,
    ) -> ServiceResult<OperationStatus> {
        traced(md, "revoke_role", async {
            self.require(operator, RESOURCE_ROLE, ACTION_WRITE).await?;
            let user = self.load_user(user_id).await?;
            let role = self.load_role(role_id).await?;
            if user.is_system_user && role.is_system_role {
                return Err(AuthError::SystemRoleCannotRevoke.into());
            }
            self.policies
                .revoke_role(user_id, role_id, Some(operator.user_id), now_millis())
                .await?;
            Ok(OperationStatus::OK)
        })
        .await
    }

    /// Every live role assigned to the user, whatever its status.
    pub async fn list_user_roles(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
    ) -> ServiceResult<Vec<RoleDefinition>> {
        traced(md, "list_user_roles", async {
            self.require(operator, RESOURCE_ROLE, ACTION_READ).await?;
            self.load_user(user_id).await?;
            let role_ids: Vec<RoleId> = self
                .policies
                .list_user_assignments(user_id)
                .await?
                .into_iter()
                .map(|a| a.role_id)
                .collect();
            Ok(self.policies.get_roles(&role_ids).await?)
        })
        .await
    }

    pub async fn list_role_users(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        role_id: RoleId,
    ) -> ServiceResult<Vec<UserRoleAssignment>> {
        traced(md, "list_role_users", async {
            self.require(operator, RESOURCE_ROLE, ACTION_READ).await?;
            self.load_role(role_id).await?;
            Ok(self.policies.list_role_assignments(role_id).await?)
        })
        .await
    }

    /// Make `user_ids` the exact set of holders of the role.
    ///
    /// For a system role every currently assigned system user must stay.
    pub async fn replace_role_users(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        role_id: RoleId,
        user_ids: Vec<UserId>,
    ) -> ServiceResult<Vec<UserRoleAssignment>> {
        traced(md, "replace_role_users", async {
            self.require(operator, RESOURCE_ROLE, ACTION_WRITE).await?;
            let role = self.load_role(role_id).await?;
            for user_id in &user_ids {
                self.load_user(*user_id).await?;
            }

            if role.is_system_role {
                let keep: HashSet<UserId> = user_ids.iter().copied().collect();
                for assignment in self.policies.list_role_assignments(role_id).await? {
                    if keep.contains(&assignment.user_id) {
                        continue;
                    }
                    let holder = self.credentials.get_by_id(assignment.user_id).await?;
                    if holder.is_some_and(|u| u.is_system_user) {
                        return Err(AuthError::SystemRoleCannotRevoke.into());
                    }
                }
            }

            let assignments = self
                .policies
                .replace_role_users(role_id, &user_ids, Some(operator.user_id), now_millis())
                .await?;
            info!(role_id = %role_id, holders = assignments.len(), "role users replaced");
            Ok(assignments)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use warden_auth::{Permission, RoleStatus};
    use warden_core::ErrorCode;

    use super::*;
    use crate::test_support::{Fixture, SUPER_ADMIN};

    fn new_role(name: &str) -> NewRole {
        NewRole {
            name: name.into(),
            description: String::new(),
            status: RoleStatus::Active,
            permissions: vec![Permission::new("user", "read")],
            is_system_role: false,
        }
    }

    #[tokio::test]
    async fn role_lifecycle() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();

        let role = fx.service.create_role(&md, &fx.admin, new_role(" auditor ")).await.unwrap();
        assert_eq!(role.name, "auditor");
        let err = fx.service.create_role(&md, &fx.admin, new_role("auditor")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
        let err = fx.service.create_role(&md, &fx.admin, new_role("a")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);

        let updated = fx
            .service
            .update_role(
                &md,
                &fx.admin,
                role.id,
                RolePatch {
                    status: Some(RoleStatus::Inactive),
                    ..RolePatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, RoleStatus::Inactive);

        fx.service.delete_role(&md, &fx.admin, role.id).await.unwrap();
        let err = fx.service.get_role(&md, &fx.admin, role.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RoleNotFound);
    }

    #[tokio::test]
    async fn system_role_is_immutable() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let roles = fx.service.list_roles(&md, &fx.admin).await.unwrap();
        let system = roles.iter().find(|r| r.name == SUPER_ADMIN).unwrap();

        let err = fx
            .service
            .update_role(&md, &fx.admin, system.id, RolePatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemRoleCannotModify);
        let err = fx.service.delete_role(&md, &fx.admin, system.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemRoleCannotDelete);
        let err = fx
            .service
            .revoke_role(&md, &fx.admin, fx.admin.user_id, system.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemRoleCannotRevoke);
        let err = fx
            .service
            .replace_role_users(&md, &fx.admin, system.id, vec![])
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemRoleCannotRevoke);
    }

    #[tokio::test]
    async fn assigned_role_cannot_be_deleted() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let (user_id, role_id) = fx.user_with_role_ids("nurse", vec![]).await;

        let err = fx.service.delete_role(&md, &fx.admin, role_id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RoleInUse);

        fx.service.revoke_role(&md, &fx.admin, user_id, role_id).await.unwrap();
        fx.service.delete_role(&md, &fx.admin, role_id).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_assignment_is_rejected() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let (user_id, role_id) = fx.user_with_role_ids("nurse", vec![]).await;

        let err = fx.service.assign_role(&md, &fx.admin, user_id, role_id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RoleAssignmentAlreadyExists);

        let roles = fx.service.list_user_roles(&md, &fx.admin, user_id).await.unwrap();
        assert_eq!(roles.iter().map(|r| r.id).collect::<Vec<_>>(), vec![role_id]);
    }

    #[tokio::test]
    async fn replace_role_users_sets_exact_holders() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let (alice, role_id) = fx.user_with_role_ids("alice", vec![]).await;
        let bob = fx.plain_user("bob").await;
        let carol = fx.plain_user("carol").await;

        fx.service
            .replace_role_users(&md, &fx.admin, role_id, vec![bob, carol, bob])
            .await
            .unwrap();

        let mut holders: Vec<UserId> = fx
            .service
            .list_role_users(&md, &fx.admin, role_id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.user_id)
            .collect();
        holders.sort();
        let mut expected = vec![bob, carol];
        expected.sort();
        assert_eq!(holders, expected);
        assert!(!holders.contains(&alice));
    }

    #[tokio::test]
    async fn role_admin_requires_role_permissions() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let reader = fx.user_with_role("reader", vec![Permission::new("role", "read")]).await;

        fx.service.list_roles(&md, &reader).await.unwrap();
        let err = fx.service.create_role(&md, &reader, new_role("x-role")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }
}
