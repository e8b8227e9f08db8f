//! Login, logout, refresh and the password flows.

use chrono::Utc;
use tracing::info;

use warden_auth::{AuthError, IdentityClaims, UserStatus};
use warden_core::{ErrorCode, ServiceError, ServiceResult, UserId};
use warden_observability::RpcMetadata;

use crate::access::{ACTION_WRITE, RESOURCE_USER};
use crate::model::{
    ChangePasswordRequest, LoginRequest, LoginResponse, OperationStatus, PermissionInfo,
    RefreshResponse, ResetPasswordRequest,
};
use crate::service::{IdentityService, traced};

impl IdentityService {
    /// Verify credentials and mint a token.
    ///
    /// A user who must change their password still gets a token, restricted
    /// to the change-password endpoint; `password_change_required` is set.
    pub async fn login(&self, md: &RpcMetadata, req: LoginRequest) -> ServiceResult<LoginResponse> {
        traced(md, "login", async {
            let username = req.username.trim();
            if username.is_empty() || req.password.is_empty() {
                return Err(ServiceError::invalid_params("username and password are required"));
            }
            let now = Utc::now();
            match self.authenticator.login(username, &req.password, now).await {
                Ok(outcome) => {
                    let permission_info =
                        PermissionInfo::from_principal(&outcome.principal, &outcome.claims.core_permission);
                    let minted = self.tokens.mint(outcome.claims, now).await?;
                    Ok(LoginResponse {
                        user_profile: outcome.user,
                        token_info: minted.into(),
                        permission_info,
                        password_change_required: false,
                    })
                }
                Err(AuthError::MustChangePassword(claims)) => {
                    let user = self.load_user(claims.user_id).await?;
                    let minted = self.tokens.mint(*claims, now).await?;
                    info!(user_id = %user.id, "password change required; issued restricted token");
                    Ok(LoginResponse {
                        user_profile: user,
                        token_info: minted.into(),
                        permission_info: PermissionInfo::password_change_only(),
                        password_change_required: true,
                    })
                }
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    /// Revoke `token` for the rest of its lifetime.
    pub async fn logout(&self, md: &RpcMetadata, token: &str) -> ServiceResult<OperationStatus> {
        traced(md, "logout", async {
            self.tokens.revoke(token, Utc::now()).await?;
            Ok(OperationStatus::OK)
        })
        .await
    }

    /// Exchange a token still inside its refresh window for a fresh one.
    ///
    /// The account must still exist and be ACTIVE. The old token is left valid.
    pub async fn refresh(&self, md: &RpcMetadata, token: &str) -> ServiceResult<RefreshResponse> {
        traced(md, "refresh", async {
            let now = Utc::now();
            let claims = self.tokens.refresh_claims(token, now).await?;
            let user = self.load_user(claims.identity.user_id).await?;
            ensure_usable(user.status)?;
            if user.is_expired(now) {
                return Err(ErrorCode::UserInactive.into());
            }
            let minted = self.tokens.mint(claims.identity, now).await?;
            Ok(RefreshResponse {
                token_info: minted.into(),
            })
        })
        .await
    }

    /// Self-service password change by the token holder.
    pub async fn change_password(
        &self,
        md: &RpcMetadata,
        caller: &IdentityClaims,
        req: ChangePasswordRequest,
    ) -> ServiceResult<OperationStatus> {
        traced(md, "change_password", async {
            self.authenticator
                .change_password(caller.user_id, &req.old_password, &req.new_password)
                .await?;
            info!(user_id = %caller.user_id, "password changed");
            Ok(OperationStatus::OK)
        })
        .await
    }

    /// Administrative reset; the user must change the password at next login.
    pub async fn reset_password(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
        req: ResetPasswordRequest,
    ) -> ServiceResult<OperationStatus> {
        traced(md, "reset_password", async {
            self.require(operator, RESOURCE_USER, ACTION_WRITE).await?;
            self.authenticator.reset_password(user_id, &req.new_password).await?;
            Ok(OperationStatus::OK)
        })
        .await
    }

    pub async fn force_password_change(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        user_id: UserId,
    ) -> ServiceResult<OperationStatus> {
        traced(md, "force_password_change", async {
            self.require(operator, RESOURCE_USER, ACTION_WRITE).await?;
            self.authenticator.force_password_change(user_id).await?;
            Ok(OperationStatus::OK)
        })
        .await
    }
}

fn ensure_usable(status: UserStatus) -> Result<(), AuthError> {
    match status {
        UserStatus::Active => Ok(()),
        UserStatus::Locked => Err(AuthError::UserLocked),
        UserStatus::Suspended => Err(AuthError::UserSuspended),
        UserStatus::Inactive => Err(AuthError::UserInactive),
    }
}

#[cfg(test)]
mod tests {
    use warden_auth::CredentialStore as _;

    use super::*;
    use crate::test_support::{Fixture, PASSWORD};

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn login_returns_profile_token_and_permissions() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let nurse = fx.user_with_role("nurse", vec![]).await;

        let res = fx.service.login(&md, login("nurse", PASSWORD)).await.unwrap();
        assert_eq!(res.user_profile.id, nurse.user_id);
        assert!(!res.password_change_required);
        assert_eq!(res.permission_info.role_names, vec!["nurse-role".to_string()]);

        let claims = fx.service.tokens().parse(&res.token_info.token, Utc::now()).unwrap();
        assert_eq!(claims.identity.user_id, nurse.user_id);
    }

    #[tokio::test]
    async fn blank_credentials_are_invalid_params() {
        let fx = Fixture::new().await;
        let err = fx
            .service
            .login(&RpcMetadata::new(), login("  ", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn pending_password_change_yields_restricted_token() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let eve = fx.user_with_role("eve", vec![]).await;
        fx.service
            .force_password_change(&md, &fx.admin, eve.user_id)
            .await
            .unwrap();

        let res = fx.service.login(&md, login("eve", PASSWORD)).await.unwrap();
        assert!(res.password_change_required);
        let claims = fx.service.tokens().parse(&res.token_info.token, Utc::now()).unwrap();
        assert!(claims.identity.is_password_change_only());

        fx.service
            .change_password(
                &md,
                &claims.identity,
                ChangePasswordRequest {
                    old_password: PASSWORD.into(),
                    new_password: "Fresh!234".into(),
                },
            )
            .await
            .unwrap();
        let res = fx.service.login(&md, login("eve", "Fresh!234")).await.unwrap();
        assert!(!res.password_change_required);
    }

    #[tokio::test]
    async fn logout_then_authenticate_reports_expired() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        fx.user_with_role("alice", vec![]).await;
        let res = fx.service.login(&md, login("alice", PASSWORD)).await.unwrap();

        fx.service.logout(&md, &res.token_info.token).await.unwrap();
        let err = fx
            .service
            .tokens()
            .authenticate(&res.token_info.token, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TokenExpired);
    }

    #[tokio::test]
    async fn refresh_rejects_locked_accounts() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let bob = fx.user_with_role("bob", vec![]).await;
        let res = fx.service.login(&md, login("bob", PASSWORD)).await.unwrap();

        let refreshed = fx.service.refresh(&md, &res.token_info.token).await.unwrap();
        assert!(!refreshed.token_info.token.is_empty());

        fx.credentials.set_status(bob.user_id, UserStatus::Locked).await.unwrap();
        let err = fx.service.refresh(&md, &res.token_info.token).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UserLocked);
    }

    #[tokio::test]
    async fn reset_password_requires_user_write() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let target = fx.user_with_role("target", vec![]).await;
        let err = fx
            .service
            .reset_password(
                &md,
                &target,
                target.user_id,
                ResetPasswordRequest {
                    new_password: "Other!123".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        fx.service
            .reset_password(
                &md,
                &fx.admin,
                target.user_id,
                ResetPasswordRequest {
                    new_password: "Other!123".into(),
                },
            )
            .await
            .unwrap();
        let res = fx.service.login(&md, login("target", "Other!123")).await.unwrap();
        assert!(res.password_change_required);
    }
}
