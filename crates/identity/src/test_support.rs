use std::sync::Arc;

use chrono::{Duration, Utc};

use warden_auth::{
    CredentialStore, IdentityClaims, NewRole, NewUser, PasswordHasher, Permission, PolicyStore,
    RoleStatus, TokenSettings, UserRoleAssignment, UserStatus,
};
use warden_core::{RoleId, UserId};
use warden_infra::{InMemoryCredentialStore, InMemoryPolicyStore, InMemoryTokenCache};

use crate::service::{IdentityService, IdentitySettings};

pub(crate) const PASSWORD: &str = "Secret!1";
pub(crate) const SUPER_ADMIN: &str = "super_admin";

pub(crate) struct Fixture {
    pub service: IdentityService,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub policies: Arc<InMemoryPolicyStore>,
    pub cache: Arc<InMemoryTokenCache>,
    /// Claims of the bootstrapped super-admin.
    pub admin: IdentityClaims,
}

pub(crate) fn settings() -> IdentitySettings {
    IdentitySettings {
        token: TokenSettings {
            signing_key: "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=".into(),
            timeout: Duration::seconds(3_600),
            max_refresh: Duration::seconds(86_400),
        },
        lockout_threshold: 5,
        bcrypt_cost: 4,
        super_admin_roles: vec![SUPER_ADMIN.to_string()],
    }
}

impl Fixture {
    pub async fn new() -> Self {
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let policies = Arc::new(InMemoryPolicyStore::new());
        let cache = Arc::new(InMemoryTokenCache::new());
        let service =
            IdentityService::new(credentials.clone(), policies.clone(), cache.clone(), &settings()).unwrap();
        service.bootstrap_admin("admin", PASSWORD).await.unwrap();
        let admin = credentials.get_by_username("admin").await.unwrap().unwrap();
        let admin = IdentityClaims {
            user_id: admin.id,
            username: admin.username,
            status: admin.status,
            role_id: None,
            organization_id: None,
            department_id: None,
            core_permission: "view_all_organizations".into(),
        };
        Self {
            service,
            credentials,
            policies,
            cache,
            admin,
        }
    }

    /// An ACTIVE user `name` holding one ACTIVE role `<name>-role`.
    pub async fn user_with_role(&self, name: &str, permissions: Vec<Permission>) -> IdentityClaims {
        let (user_id, _) = self.user_with_role_ids(name, permissions).await;
        IdentityClaims {
            user_id,
            username: name.to_string(),
            status: UserStatus::Active,
            role_id: None,
            organization_id: None,
            department_id: None,
            core_permission: String::new(),
        }
    }

    pub async fn user_with_role_ids(&self, name: &str, permissions: Vec<Permission>) -> (UserId, RoleId) {
        let user_id = self.plain_user(name).await;
        let role = NewRole {
            name: format!("{name}-role"),
            description: String::new(),
            status: RoleStatus::Active,
            permissions,
            is_system_role: false,
        }
        .into_definition(RoleId::new(), Utc::now());
        let role = self.policies.create_role(role).await.unwrap();
        self.policies
            .assign_role(UserRoleAssignment::new(user_id, role.id, None, Utc::now()))
            .await
            .unwrap();
        (user_id, role.id)
    }

    /// An ACTIVE user with no roles.
    pub async fn plain_user(&self, name: &str) -> UserId {
        let hash = PasswordHasher::new(4).hash(PASSWORD).await.unwrap();
        let profile = NewUser {
            username: name.to_string(),
            password_hash: hash,
            email: None,
            phone: None,
            status: UserStatus::Active,
            must_change_password: false,
            account_expires_at: None,
            is_system_user: false,
        }
        .into_profile(UserId::new(), Utc::now());
        self.credentials.create_user(profile).await.unwrap().id
    }
}
