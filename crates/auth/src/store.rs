//! Storage ports for the credential store and the policy store.
//!
//! Both are async traits used as `Arc<dyn …>`; concrete backends (in-memory,
//! Postgres) live in `warden-infra`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use warden_core::{ErrorCode, RoleId, UserId};

use crate::menu::{MenuNode, MenuVersion};
use crate::policy_rule::{MenuGrant, PolicyRule, PolicyType};
use crate::roles::{RoleDefinition, RoleStatus, UserRoleAssignment};
use crate::user::{UserMembership, UserProfile, UserStatus};

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operation error.
///
/// Constraint violations are translated into domain codes by the backends so
/// business code never inspects driver errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,

    #[error("role not found")]
    RoleNotFound,

    #[error("{0} not found")]
    NotFound(String),

    #[error("no menu version available")]
    MenuVersionNotFound,

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("role assignment already exists")]
    AssignmentExists,

    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("role is assigned to {0} user(s)")]
    RoleInUse(usize),

    #[error("invalid menu permission '{0}'")]
    InvalidMenuPermission(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::UserNotFound => ErrorCode::UserNotFound,
            StoreError::RoleNotFound => ErrorCode::RoleNotFound,
            StoreError::NotFound(_) => ErrorCode::NotFound,
            StoreError::MenuVersionNotFound => ErrorCode::MenuVersionNotFound,
            StoreError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            StoreError::AssignmentExists => ErrorCode::RoleAssignmentAlreadyExists,
            StoreError::VersionConflict { .. } => ErrorCode::VersionConflict,
            StoreError::RoleInUse(_) => ErrorCode::RoleInUse,
            StoreError::InvalidMenuPermission(_) => ErrorCode::InvalidMenuPermission,
            StoreError::Backend(_) => ErrorCode::Internal,
        }
    }
}

/// Offset pagination for admin listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const MAX_LIMIT: usize = 500;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential store
// ─────────────────────────────────────────────────────────────────────────────

/// Persists user profiles, password hashes, lock/attempt counters and memberships.
///
/// Soft-deleted users are invisible to every lookup. Counter and flag
/// mutations do not bump `version`; only [`CredentialStore::update_user`] does.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_by_username(&self, username: &str) -> StoreResult<Option<UserProfile>>;

    async fn get_by_id(&self, user_id: UserId) -> StoreResult<Option<UserProfile>>;

    /// Insert a profile. A live user with the same username → `AlreadyExists`.
    async fn create_user(&self, profile: UserProfile) -> StoreResult<UserProfile>;

    /// Persist `profile` if the stored version equals `expected_version`.
    ///
    /// Returns the stored profile with `version = expected_version + 1`.
    async fn update_user(&self, profile: &UserProfile, expected_version: u64) -> StoreResult<UserProfile>;

    /// Live users ordered by creation time, plus the total live count.
    async fn list_users(&self, page: Page) -> StoreResult<(Vec<UserProfile>, usize)>;

    async fn soft_delete_user(&self, user_id: UserId, now: DateTime<Utc>) -> StoreResult<()>;

    /// Increment the failed-login counter and return the new value.
    async fn increment_login_attempts(&self, user_id: UserId) -> StoreResult<u32>;

    /// Reset the failed-login counter, stamping the last login when given.
    async fn reset_login_attempts(&self, user_id: UserId, last_login_at: Option<DateTime<Utc>>) -> StoreResult<()>;

    async fn set_status(&self, user_id: UserId, status: UserStatus) -> StoreResult<()>;

    async fn set_must_change_password(&self, user_id: UserId, must_change: bool) -> StoreResult<()>;

    async fn update_password_hash(&self, user_id: UserId, password_hash: &str, must_change: bool) -> StoreResult<()>;

    /// Add a membership. A new primary demotes any existing primary atomically.
    async fn add_membership(&self, membership: UserMembership) -> StoreResult<UserMembership>;

    async fn list_memberships(&self, user_id: UserId) -> StoreResult<Vec<UserMembership>>;

    async fn primary_membership(&self, user_id: UserId) -> StoreResult<Option<UserMembership>>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn get_by_username(&self, username: &str) -> StoreResult<Option<UserProfile>> {
        (**self).get_by_username(username).await
    }

    async fn get_by_id(&self, user_id: UserId) -> StoreResult<Option<UserProfile>> {
        (**self).get_by_id(user_id).await
    }

    async fn create_user(&self, profile: UserProfile) -> StoreResult<UserProfile> {
        (**self).create_user(profile).await
    }

    async fn update_user(&self, profile: &UserProfile, expected_version: u64) -> StoreResult<UserProfile> {
        (**self).update_user(profile, expected_version).await
    }

    async fn list_users(&self, page: Page) -> StoreResult<(Vec<UserProfile>, usize)> {
        (**self).list_users(page).await
    }

    async fn soft_delete_user(&self, user_id: UserId, now: DateTime<Utc>) -> StoreResult<()> {
        (**self).soft_delete_user(user_id, now).await
    }

    async fn increment_login_attempts(&self, user_id: UserId) -> StoreResult<u32> {
        (**self).increment_login_attempts(user_id).await
    }

    async fn reset_login_attempts(&self, user_id: UserId, last_login_at: Option<DateTime<Utc>>) -> StoreResult<()> {
        (**self).reset_login_attempts(user_id, last_login_at).await
    }

    async fn set_status(&self, user_id: UserId, status: UserStatus) -> StoreResult<()> {
        (**self).set_status(user_id, status).await
    }

    async fn set_must_change_password(&self, user_id: UserId, must_change: bool) -> StoreResult<()> {
        (**self).set_must_change_password(user_id, must_change).await
    }

    async fn update_password_hash(&self, user_id: UserId, password_hash: &str, must_change: bool) -> StoreResult<()> {
        (**self).update_password_hash(user_id, password_hash, must_change).await
    }

    async fn add_membership(&self, membership: UserMembership) -> StoreResult<UserMembership> {
        (**self).add_membership(membership).await
    }

    async fn list_memberships(&self, user_id: UserId) -> StoreResult<Vec<UserMembership>> {
        (**self).list_memberships(user_id).await
    }

    async fn primary_membership(&self, user_id: UserId) -> StoreResult<Option<UserMembership>> {
        (**self).primary_membership(user_id).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy store
// ─────────────────────────────────────────────────────────────────────────────

/// Persists roles, assignments, the menu catalog and the policy rule table.
///
/// Role writes mirror the embedded permission list into `p` rules; assignment
/// writes mirror into `g` rules. Multi-row operations are atomic.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    // roles

    /// Insert a role. A live role with the same name → `AlreadyExists`.
    async fn create_role(&self, role: RoleDefinition) -> StoreResult<RoleDefinition>;

    async fn get_role(&self, role_id: RoleId) -> StoreResult<Option<RoleDefinition>>;

    async fn get_role_by_name(&self, name: &str) -> StoreResult<Option<RoleDefinition>>;

    async fn list_roles(&self) -> StoreResult<Vec<RoleDefinition>>;

    /// Overwrite a live role; name uniqueness is re-checked.
    async fn update_role(&self, role: &RoleDefinition) -> StoreResult<RoleDefinition>;

    /// Soft-delete a role and purge its rules. Live assignments → `RoleInUse`.
    async fn delete_role(&self, role_id: RoleId, now: DateTime<Utc>) -> StoreResult<()>;

    // assignments

    /// Insert an assignment. A live `(user, role)` pair → `AssignmentExists`.
    async fn assign_role(&self, assignment: UserRoleAssignment) -> StoreResult<UserRoleAssignment>;

    /// Soft-delete the live `(user, role)` assignment. Missing → `NotFound`.
    async fn revoke_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        operator: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn list_user_assignments(&self, user_id: UserId) -> StoreResult<Vec<UserRoleAssignment>>;

    async fn list_role_assignments(&self, role_id: RoleId) -> StoreResult<Vec<UserRoleAssignment>>;

    /// Role ids of the user's live assignments whose live role has `status`,
    /// in assignment creation order.
    async fn list_active_role_ids_with_status(
        &self,
        user_id: UserId,
        status: RoleStatus,
    ) -> StoreResult<Vec<RoleId>>;

    /// Replace every assignment of `role_id` with `user_ids`, all or nothing.
    async fn replace_role_users(
        &self,
        role_id: RoleId,
        user_ids: &[UserId],
        operator: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<UserRoleAssignment>>;

    // menus

    /// Purge every `p2` rule of the role and insert `grants`, all or nothing.
    async fn configure_role_menus(&self, role_id: RoleId, grants: &[MenuGrant]) -> StoreResult<()>;

    /// Raw `p2` grants of a role, including ids absent from the catalog.
    async fn menu_grants_for_role(&self, role_id: RoleId) -> StoreResult<Vec<MenuGrant>>;

    /// Store a full catalog under a new version label.
    async fn insert_menu_version(&self, version: &str, nodes: Vec<MenuNode>) -> StoreResult<MenuVersion>;

    /// The version with the largest creation time.
    async fn latest_menu_version(&self) -> StoreResult<Option<MenuVersion>>;

    /// Rows of `version` ordered by `(parent, sort, id)`.
    async fn list_menus(&self, version: &str) -> StoreResult<Vec<MenuNode>>;

    /// Versions, newest first.
    async fn list_menu_versions(&self) -> StoreResult<Vec<MenuVersion>>;

    // rules

    async fn list_rules(&self, ptype: PolicyType) -> StoreResult<Vec<PolicyRule>>;

    /// Latest catalog rows. No catalog → `MenuVersionNotFound`.
    async fn latest_menu_nodes(&self) -> StoreResult<Vec<MenuNode>> {
        let latest = self
            .latest_menu_version()
            .await?
            .ok_or(StoreError::MenuVersionNotFound)?;
        self.list_menus(&latest.version).await
    }

    async fn get_roles(&self, role_ids: &[RoleId]) -> StoreResult<Vec<RoleDefinition>> {
        let mut out = Vec::with_capacity(role_ids.len());
        for id in role_ids {
            if let Some(role) = self.get_role(*id).await? {
                out.push(role);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl<S> PolicyStore for Arc<S>
where
    S: PolicyStore + ?Sized,
{
    async fn create_role(&self, role: RoleDefinition) -> StoreResult<RoleDefinition> {
        (**self).create_role(role).await
    }

    async fn get_role(&self, role_id: RoleId) -> StoreResult<Option<RoleDefinition>> {
        (**self).get_role(role_id).await
    }

    async fn get_role_by_name(&self, name: &str) -> StoreResult<Option<RoleDefinition>> {
        (**self).get_role_by_name(name).await
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleDefinition>> {
        (**self).list_roles().await
    }

    async fn update_role(&self, role: &RoleDefinition) -> StoreResult<RoleDefinition> {
        (**self).update_role(role).await
    }

    async fn delete_role(&self, role_id: RoleId, now: DateTime<Utc>) -> StoreResult<()> {
        (**self).delete_role(role_id, now).await
    }

    async fn assign_role(&self, assignment: UserRoleAssignment) -> StoreResult<UserRoleAssignment> {
        (**self).assign_role(assignment).await
    }

    async fn revoke_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        operator: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        (**self).revoke_role(user_id, role_id, operator, now).await
    }

    async fn list_user_assignments(&self, user_id: UserId) -> StoreResult<Vec<UserRoleAssignment>> {
        (**self).list_user_assignments(user_id).await
    }

    async fn list_role_assignments(&self, role_id: RoleId) -> StoreResult<Vec<UserRoleAssignment>> {
        (**self).list_role_assignments(role_id).await
    }

    async fn list_active_role_ids_with_status(
        &self,
        user_id: UserId,
        status: RoleStatus,
    ) -> StoreResult<Vec<RoleId>> {
        (**self).list_active_role_ids_with_status(user_id, status).await
    }

    async fn replace_role_users(
        &self,
        role_id: RoleId,
        user_ids: &[UserId],
        operator: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<UserRoleAssignment>> {
        (**self).replace_role_users(role_id, user_ids, operator, now).await
    }

    async fn configure_role_menus(&self, role_id: RoleId, grants: &[MenuGrant]) -> StoreResult<()> {
        (**self).configure_role_menus(role_id, grants).await
    }

    async fn menu_grants_for_role(&self, role_id: RoleId) -> StoreResult<Vec<MenuGrant>> {
        (**self).menu_grants_for_role(role_id).await
    }

    async fn insert_menu_version(&self, version: &str, nodes: Vec<MenuNode>) -> StoreResult<MenuVersion> {
        (**self).insert_menu_version(version, nodes).await
    }

    async fn latest_menu_version(&self) -> StoreResult<Option<MenuVersion>> {
        (**self).latest_menu_version().await
    }

    async fn list_menus(&self, version: &str) -> StoreResult<Vec<MenuNode>> {
        (**self).list_menus(version).await
    }

    async fn list_menu_versions(&self) -> StoreResult<Vec<MenuVersion>> {
        (**self).list_menu_versions().await
    }

    async fn list_rules(&self, ptype: PolicyType) -> StoreResult<Vec<PolicyRule>> {
        (**self).list_rules(ptype).await
    }
}
