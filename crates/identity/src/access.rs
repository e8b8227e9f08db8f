//! Endpoint authorization.
//!
//! Administrative calls check `(resource, action)` against the operator's
//! embedded role permissions. Super-admins pass unconditionally.

use warden_auth::{IdentityClaims, authorize};
use warden_core::{ServiceError, ServiceResult, UserId};
use warden_observability::RpcMetadata;

use crate::service::{IdentityService, traced};

pub const RESOURCE_USER: &str = "user";
pub const RESOURCE_ROLE: &str = "role";
pub const RESOURCE_MENU: &str = "menu";

pub const ACTION_READ: &str = "read";
pub const ACTION_WRITE: &str = "write";

impl IdentityService {
    /// `HasPermission(user, resource, action)`.
    pub async fn authorize(
        &self,
        md: &RpcMetadata,
        user_id: UserId,
        resource: &str,
        action: &str,
    ) -> ServiceResult<bool> {
        traced(md, "authorize", async {
            Ok(self
                .authenticator
                .evaluator()
                .has_permission(user_id, resource, action)
                .await?)
        })
        .await
    }

    /// Fail with `FORBIDDEN` unless the operator holds `(resource, action)`.
    pub(crate) async fn require(
        &self,
        operator: &IdentityClaims,
        resource: &str,
        action: &str,
    ) -> ServiceResult<()> {
        if operator.is_password_change_only() {
            return Err(ServiceError::forbidden("token is restricted to changing the password"));
        }
        let principal = self.authenticator.evaluator().principal(operator.user_id).await?;
        authorize(&principal, resource, action).map_err(|e| ServiceError::forbidden(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use warden_auth::{Permission, UserStatus};
    use warden_core::ErrorCode;

    use super::*;
    use crate::test_support::Fixture;

    #[tokio::test]
    async fn embedded_permissions_gate_admin_calls() {
        let fx = Fixture::new().await;
        let reader = fx
            .user_with_role("reader", vec![Permission::new(RESOURCE_USER, ACTION_READ)])
            .await;

        let md = RpcMetadata::new();
        assert!(fx.service.authorize(&md, reader.user_id, RESOURCE_USER, ACTION_READ).await.unwrap());
        assert!(!fx.service.authorize(&md, reader.user_id, RESOURCE_USER, ACTION_WRITE).await.unwrap());

        fx.service.require(&reader, RESOURCE_USER, ACTION_READ).await.unwrap();
        let err = fx.service.require(&reader, RESOURCE_ROLE, ACTION_READ).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn super_admin_passes_everything() {
        let fx = Fixture::new().await;
        for (resource, action) in [(RESOURCE_USER, ACTION_WRITE), (RESOURCE_MENU, ACTION_READ)] {
            fx.service.require(&fx.admin, resource, action).await.unwrap();
        }
    }

    #[tokio::test]
    async fn restricted_token_is_never_authorized() {
        let fx = Fixture::new().await;
        let restricted =
            IdentityClaims::password_change_only(fx.admin.user_id, "admin", UserStatus::Active);
        let err = fx
            .service
            .require(&restricted, RESOURCE_USER, ACTION_READ)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }
}
