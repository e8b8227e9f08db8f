//! Credential verification, account-state gates and the claims envelope.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use warden_core::{RoleId, UserId};

use crate::claims::IdentityClaims;
use crate::error::AuthError;
use crate::password::{PasswordHasher, PasswordPolicy};
use crate::policy::PolicyEvaluator;
use crate::principal::Principal;
use crate::store::CredentialStore;
use crate::user::{UserProfile, UserStatus};

pub const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub user: UserProfile,
    pub claims: IdentityClaims,
    pub role_ids: Vec<RoleId>,
    pub principal: Principal,
}

#[derive(Clone)]
pub struct Authenticator {
    credentials: Arc<dyn CredentialStore>,
    evaluator: PolicyEvaluator,
    hasher: PasswordHasher,
    policy: PasswordPolicy,
    lockout_threshold: u32,
}

impl core::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Authenticator")
            .field("lockout_threshold", &self.lockout_threshold)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        evaluator: PolicyEvaluator,
        hasher: PasswordHasher,
        lockout_threshold: u32,
    ) -> Self {
        Self {
            credentials,
            evaluator,
            hasher,
            policy: PasswordPolicy::default(),
            lockout_threshold: lockout_threshold.max(1),
        }
    }

    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn password_policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    pub fn evaluator(&self) -> &PolicyEvaluator {
        &self.evaluator
    }

    /// Look the user up and verify the password without touching counters.
    ///
    /// Unknown user and wrong password both yield `InvalidCredentials`.
    pub async fn check_credentials(&self, username: &str, password: &str) -> Result<UserProfile, AuthError> {
        let Some(user) = self.credentials.get_by_username(username).await? else {
            self.hasher.verify_dummy(password).await;
            return Err(AuthError::InvalidCredentials);
        };
        if self.hasher.verify(password, &user.password_hash).await? {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    /// Full login pipeline.
    ///
    /// 1. unknown user → `InvalidCredentials`
    /// 2. LOCKED / SUSPENDED / INACTIVE (or expired) → matching state error
    /// 3. mismatch → count the attempt, lock at the threshold
    /// 4. match → reset the counter and stamp the last login
    /// 5. pending password change → `MustChangePassword` with restricted claims
    /// 6. no ACTIVE role → `NoAvailableRoles`
    /// 7. primary membership → organization and department
    #[instrument(skip(self, password), err(level = "info"))]
    pub async fn login(&self, username: &str, password: &str, now: DateTime<Utc>) -> Result<LoginOutcome, AuthError> {
        let Some(user) = self.credentials.get_by_username(username).await? else {
            self.hasher.verify_dummy(password).await;
            return Err(AuthError::InvalidCredentials);
        };

        match user.status {
            UserStatus::Locked => return Err(AuthError::UserLocked),
            UserStatus::Suspended => return Err(AuthError::UserSuspended),
            UserStatus::Inactive => return Err(AuthError::UserInactive),
            UserStatus::Active => {}
        }
        if user.is_expired(now) {
            return Err(AuthError::UserInactive);
        }

        if !self.hasher.verify(password, &user.password_hash).await? {
            let attempts = self.credentials.increment_login_attempts(user.id).await?;
            if attempts >= self.lockout_threshold {
                self.credentials.set_status(user.id, UserStatus::Locked).await?;
                warn!(user_id = %user.id, attempts, "account locked after repeated failures");
            }
            return Err(AuthError::InvalidCredentials);
        }

        self.credentials.reset_login_attempts(user.id, Some(now)).await?;

        if user.must_change_password {
            return Err(AuthError::MustChangePassword(Box::new(
                IdentityClaims::password_change_only(user.id, &user.username, user.status),
            )));
        }

        let role_ids = self.evaluator.effective_role_ids(user.id).await?;
        if role_ids.is_empty() {
            return Err(AuthError::NoAvailableRoles);
        }
        let principal = self.evaluator.principal_for_roles(user.id, role_ids.clone()).await?;

        let membership = self.credentials.primary_membership(user.id).await?;

        let claims = IdentityClaims {
            user_id: user.id,
            username: user.username.clone(),
            status: user.status,
            role_id: principal.primary_role(),
            organization_id: membership.as_ref().map(|m| m.organization_id),
            department_id: membership.as_ref().and_then(|m| m.department_id),
            core_permission: if principal.core_level.is_granted() {
                principal.core_level.as_str().to_string()
            } else {
                String::new()
            },
        };

        info!(user_id = %user.id, roles = role_ids.len(), "login succeeded");

        let mut user = user;
        user.login_attempts = 0;
        user.last_login_at = Some(now);

        Ok(LoginOutcome {
            user,
            claims,
            role_ids,
            principal,
        })
    }

    async fn load(&self, user_id: UserId) -> Result<UserProfile, AuthError> {
        self.credentials
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Self-service change; requires the old password and clears the
    /// must-change flag.
    #[instrument(skip(self, old_password, new_password), err(level = "info"))]
    pub async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self.load(user_id).await?;
        if !self.hasher.verify(old_password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }
        if old_password == new_password {
            return Err(AuthError::WeakPassword("must differ from the current password".into()));
        }
        self.policy.validate(new_password)?;
        let hash = self.hasher.hash(new_password).await?;
        self.credentials.update_password_hash(user.id, &hash, false).await?;
        Ok(())
    }

    /// Administrative reset; the user must change the password at next login.
    #[instrument(skip(self, new_password), err(level = "info"))]
    pub async fn reset_password(&self, user_id: UserId, new_password: &str) -> Result<(), AuthError> {
        let user = self.load(user_id).await?;
        self.policy.validate(new_password)?;
        let hash = self.hasher.hash(new_password).await?;
        self.credentials.update_password_hash(user.id, &hash, true).await?;
        Ok(())
    }

    /// Flag the user for a password change without touching the hash.
    #[instrument(skip(self), err(level = "info"))]
    pub async fn force_password_change(&self, user_id: UserId) -> Result<(), AuthError> {
        let user = self.load(user_id).await?;
        self.credentials.set_must_change_password(user.id, true).await?;
        Ok(())
    }
}
