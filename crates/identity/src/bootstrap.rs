//! First-start administrator provisioning.

use tracing::{info, instrument};

use warden_auth::{NewRole, NewUser, Permission, RoleStatus, StoreError, UserRoleAssignment, UserStatus};
use warden_core::{RoleId, ServiceResult, UserId, time::now_millis};

use crate::service::IdentityService;

pub const DEFAULT_SUPER_ADMIN_ROLE: &str = "super_admin";

impl IdentityService {
    /// Create the system administrator unless a user with `username` exists.
    ///
    /// The account gets a system super-admin role (the first configured
    /// super-admin name, created when missing). Returns the new user id, or
    /// `None` when nothing was done.
    #[instrument(skip(self, password), err)]
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> ServiceResult<Option<UserId>> {
        if self.credentials.get_by_username(username).await?.is_some() {
            info!(username, "bootstrap admin already present");
            return Ok(None);
        }

        let role_name = self
            .super_admin_roles
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_SUPER_ADMIN_ROLE);
        let now = now_millis();
        let role = match self.policies.get_role_by_name(role_name).await? {
            Some(role) => role,
            None => {
                let role = NewRole {
                    name: role_name.to_string(),
                    description: "Built-in administrator".to_string(),
                    status: RoleStatus::Active,
                    permissions: vec![Permission::new("*", "*")],
                    is_system_role: true,
                }
                .into_definition(RoleId::new(), now);
                self.policies.create_role(role).await?
            }
        };

        let hash = self.authenticator.hasher().hash(password).await?;
        let user = NewUser {
            username: username.to_string(),
            password_hash: hash,
            email: None,
            phone: None,
            status: UserStatus::Active,
            must_change_password: false,
            account_expires_at: None,
            is_system_user: true,
        }
        .into_profile(UserId::new(), now);
        let user = self.credentials.create_user(user).await?;

        match self
            .policies
            .assign_role(UserRoleAssignment::new(user.id, role.id, None, now))
            .await
        {
            Ok(_) | Err(StoreError::AssignmentExists) => {}
            Err(err) => return Err(err.into()),
        }

        info!(user_id = %user.id, role = %role.name, "bootstrap admin created");
        Ok(Some(user.id))
    }
}
