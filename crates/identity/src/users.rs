//! User administration and memberships.

use tracing::{info, warn};

use warden_auth::{
    AuthError, IdentityClaims, NewUser, Page, UserMembership, UserProfile, UserStatus,
    user::validate_username,
};
use warden_core::{MembershipId, ServiceResult, UserId, time::now_millis};
use warden_observability::RpcMetadata;

use crate::access::{ACTION_READ, ACTION_WRITE, RESOURCE_USER};
use crate::model::{AddMembershipRequest, CreateUserRequest, OperationStatus, UpdateUserRequest, UserList};
use crate::service::{IdentityService, traced};

impl IdentityService {
    pub async fn create_user(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        req: CreateUserRequest,
    ) -> ServiceResult<UserProfile> {
        traced(md, "create_user", async {
            self.require(operator, RESOURCE_USER, ACTION_WRITE).await?;
            let username = req.username.trim().to_string();
            validate_username(&username)?;
            self.authenticator.password_policy().validate(&req.password)?;

            let hash = self.authenticator.hasher().hash(&req.password).await?;
            let profile = NewUser {
                username,
                password_hash: hash,
                email: req.email,
                phone: req.phone,
                status: req.status,
                must_change_password: req.must_change_password,
                account_expires_at: req.account_expires_at,
                is_system_user: req.is_system_user,
            }
            .into_profile(UserId::new(), now_millis());
            let created = self.credentials.create_user(profile).await?;
            info!(user_id = %created.id, operator = %operator.user_id, "user created");
            Ok(created)
        })
        .await
    }

    pub async fn get_user(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
    ) -> ServiceResult<UserProfile> {
        traced(md, "get_user", async {
            self.require(operator, RESOURCE_USER, ACTION_READ).await?;
            self.load_user(user_id).await
        })
        .await
    }

    pub async fn list_users(&self, md: &RpcMetadata, operator: &IdentityClaims, page: Page) -> ServiceResult<UserList> {
        traced(md, "list_users", async {
            self.require(operator, RESOURCE_USER, ACTION_READ).await?;
            let (items, total) = self.credentials.list_users(page).await?;
            Ok(UserList {
                items,
                total,
                offset: page.offset,
                limit: page.limit,
            })
        })
        .await
    }

    /// Apply a profile patch if `req.version` is still current.
    pub async fn update_user(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
        req: UpdateUserRequest,
    ) -> ServiceResult<UserProfile> {
        traced(md, "update_user", async {
            self.require(operator, RESOURCE_USER, ACTION_WRITE).await?;
            let mut profile = self.load_user(user_id).await?;
            let mut patch = req.patch;
            if let Some(name) = patch.username.as_mut() {
                *name = name.trim().to_string();
                validate_username(name)?;
            }
            patch.ensure_allowed_for(&profile)?;
            patch.apply(&mut profile);
            profile.updated_at = now_millis();
            Ok(self.credentials.update_user(&profile, req.version).await?)
        })
        .await
    }

    /// Change the account status.
    ///
    /// Re-activation clears the failed-attempt counter; any other status
    /// revokes every open session of the user.
    pub async fn update_user_status(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
        status: UserStatus,
    ) -> ServiceResult<OperationStatus> {
        traced(md, "update_user_status", async {
            self.require(operator, RESOURCE_USER, ACTION_WRITE).await?;
            let profile = self.load_user(user_id).await?;
            if profile.is_system_user && status != UserStatus::Active {
                return Err(AuthError::SystemUserCannotModify("system user must stay active".into()).into());
            }
            if status == UserStatus::Active {
                self.credentials.reset_login_attempts(user_id, None).await?;
            }
            self.credentials.set_status(user_id, status).await?;
            if status != UserStatus::Active {
                self.revoke_sessions(user_id).await;
            }
            info!(user_id = %user_id, status = %status, "user status changed");
            Ok(OperationStatus::OK)
        })
        .await
    }

    /// Soft-delete a user and revoke their sessions.
    pub async fn delete_user(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
    ) -> ServiceResult<OperationStatus> {
        traced(md, "delete_user", async {
            self.require(operator, RESOURCE_USER, ACTION_WRITE).await?;
            let profile = self.load_user(user_id).await?;
            if profile.is_system_user {
                return Err(AuthError::SystemUserCannotDelete.into());
            }
            self.credentials.soft_delete_user(user_id, now_millis()).await?;
            self.revoke_sessions(user_id).await;
            info!(user_id = %user_id, operator = %operator.user_id, "user deleted");
            Ok(OperationStatus::OK)
        })
        .await
    }

    // Memberships

    /// Add a membership; a new primary demotes the previous one.
    pub async fn add_membership(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
        req: AddMembershipRequest,
    ) -> ServiceResult<UserMembership> {
        traced(md, "add_membership", async {
            self.require(operator, RESOURCE_USER, ACTION_WRITE).await?;
            self.load_user(user_id).await?;
            let membership = UserMembership {
                id: MembershipId::new(),
                user_id,
                organization_id: req.organization_id,
                department_id: req.department_id,
                is_primary: req.is_primary,
                created_at: now_millis(),
                deleted_at: None,
            };
            Ok(self.credentials.add_membership(membership).await?)
        })
        .await
    }

    pub async fn list_memberships(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
    ) -> ServiceResult<Vec<UserMembership>> {
        traced(md, "list_memberships", async {
            self.require(operator, RESOURCE_USER, ACTION_READ).await?;
            self.load_user(user_id).await?;
            Ok(self.credentials.list_memberships(user_id).await?)
        })
        .await
    }

    pub async fn primary_membership(&self, md: &RpcMetadata, user_id: UserId) -> ServiceResult<Option<UserMembership>> {
        traced(md, "primary_membership", async {
            Ok(self.credentials.primary_membership(user_id).await?)
        })
        .await
    }

    /// Bulk revocation is best-effort: the state change already committed.
    async fn revoke_sessions(&self, user_id: UserId) {
        match self.tokens.cache().revoke_all_for_user(user_id).await {
            Ok(count) => info!(user_id = %user_id, count, "sessions revoked"),
            Err(err) => warn!(user_id = %user_id, error = %err, "session revocation failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use warden_auth::{CredentialStore as _, TokenCache as _, UserPatch};
    use warden_core::{ErrorCode, OrganizationId};

    use super::*;
    use crate::test_support::{Fixture, PASSWORD};

    fn create(username: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.into(),
            password: PASSWORD.into(),
            email: None,
            phone: None,
            status: UserStatus::Active,
            must_change_password: false,
            account_expires_at: None,
            is_system_user: false,
        }
    }

    #[tokio::test]
    async fn create_validates_and_rejects_duplicates() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();

        let bob = fx.service.create_user(&md, &fx.admin, create("bob")).await.unwrap();
        assert_eq!(bob.version, 1);

        let err = fx.service.create_user(&md, &fx.admin, create("bob")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);

        let err = fx.service.create_user(&md, &fx.admin, create("x")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);

        let mut weak = create("carol");
        weak.password = "short".into();
        let err = fx.service.create_user(&md, &fx.admin, weak).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::WeakPassword);
    }

    #[tokio::test]
    async fn update_is_guarded_by_version() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let bob = fx.service.create_user(&md, &fx.admin, create("bob")).await.unwrap();

        let patch = UserPatch {
            email: Some("bob@example.com".into()),
            ..UserPatch::default()
        };
        let updated = fx
            .service
            .update_user(
                &md,
                &fx.admin,
                bob.id,
                UpdateUserRequest {
                    patch: patch.clone(),
                    version: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.email.as_deref(), Some("bob@example.com"));

        let err = fx
            .service
            .update_user(&md, &fx.admin, bob.id, UpdateUserRequest { patch, version: 1 })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::VersionConflict);
    }

    #[tokio::test]
    async fn system_user_is_protected() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let admin_id = fx.admin.user_id;

        let rename = UpdateUserRequest {
            patch: UserPatch {
                username: Some("root".into()),
                ..UserPatch::default()
            },
            version: 1,
        };
        let err = fx.service.update_user(&md, &fx.admin, admin_id, rename).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemUserCannotModify);

        let err = fx.service.delete_user(&md, &fx.admin, admin_id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemUserCannotDelete);

        let err = fx
            .service
            .update_user_status(&md, &fx.admin, admin_id, UserStatus::Suspended)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemUserCannotModify);
    }

    #[tokio::test]
    async fn unlocking_resets_attempts() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let bob = fx.service.create_user(&md, &fx.admin, create("bob")).await.unwrap();
        fx.credentials.increment_login_attempts(bob.id).await.unwrap();
        fx.credentials.set_status(bob.id, UserStatus::Locked).await.unwrap();

        fx.service
            .update_user_status(&md, &fx.admin, bob.id, UserStatus::Active)
            .await
            .unwrap();
        let bob = fx.service.get_user(&md, &fx.admin, bob.id).await.unwrap();
        assert_eq!(bob.status, UserStatus::Active);
        assert_eq!(bob.login_attempts, 0);
    }

    #[tokio::test]
    async fn delete_revokes_every_session() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let bob = fx.user_with_role("bob", vec![]).await;
        let now = Utc::now();
        let t1 = fx.service.tokens().mint(bob.clone(), now).await.unwrap();
        let t2 = fx.service.tokens().mint(bob.clone(), now).await.unwrap();

        fx.service.delete_user(&md, &fx.admin, bob.user_id).await.unwrap();

        assert!(fx.cache.is_revoked(&t1.token).await.unwrap());
        assert!(fx.cache.is_revoked(&t2.token).await.unwrap());
        let err = fx.service.get_user(&md, &fx.admin, bob.user_id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UserNotFound);
    }

    #[tokio::test]
    async fn at_most_one_primary_membership() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let bob = fx.service.create_user(&md, &fx.admin, create("bob")).await.unwrap();

        let first = OrganizationId::new();
        let second = OrganizationId::new();
        for org in [first, second] {
            fx.service
                .add_membership(
                    &md,
                    &fx.admin,
                    bob.id,
                    AddMembershipRequest {
                        organization_id: org,
                        department_id: None,
                        is_primary: true,
                    },
                )
                .await
                .unwrap();
        }

        let memberships = fx.service.list_memberships(&md, &fx.admin, bob.id).await.unwrap();
        assert_eq!(memberships.len(), 2);
        assert_eq!(memberships.iter().filter(|m| m.is_primary).count(), 1);
        let primary = fx.service.primary_membership(&md, bob.id).await.unwrap().unwrap();
        assert_eq!(primary.organization_id, second);
    }
}
