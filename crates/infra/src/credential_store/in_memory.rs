use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_auth::{CredentialStore, Page, StoreError, StoreResult, UserMembership, UserProfile, UserStatus};
use warden_core::UserId;

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, UserProfile>,
    memberships: Vec<UserMembership>,
}

impl State {
    fn live(&self, user_id: UserId) -> StoreResult<&UserProfile> {
        self.users
            .get(&user_id)
            .filter(|u| !u.is_deleted())
            .ok_or(StoreError::UserNotFound)
    }

    fn live_mut(&mut self, user_id: UserId) -> StoreResult<&mut UserProfile> {
        self.users
            .get_mut(&user_id)
            .filter(|u| !u.is_deleted())
            .ok_or(StoreError::UserNotFound)
    }

    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| !u.is_deleted() && u.username == username && Some(u.id) != except)
    }
}

/// In-memory credential store.
///
/// Intended for tests/dev. Every mutation runs under one write lock so
/// multi-row changes (primary membership demotion) are atomic.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    state: RwLock<State>,
}

impl InMemoryCredentialStore {
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
impl CredentialStore for InMemoryCredentialStore {
    async fn get_by_username(&self, username: &str) -> StoreResult<Option<UserProfile>> {
        self.read(|s| {
            Ok(s.users
                .values()
                .find(|u| !u.is_deleted() && u.username == username)
                .cloned())
        })
    }

    async fn get_by_id(&self, user_id: UserId) -> StoreResult<Option<UserProfile>> {
        self.read(|s| Ok(s.live(user_id).ok().cloned()))
    }

    async fn create_user(&self, profile: UserProfile) -> StoreResult<UserProfile> {
        self.write(|s| {
            if s.username_taken(&profile.username, None) {
                return Err(StoreError::AlreadyExists(format!("user '{}'", profile.username)));
            }
            if s.users.contains_key(&profile.id) {
                return Err(StoreError::AlreadyExists(format!("user {}", profile.id)));
            }
            s.users.insert(profile.id, profile.clone());
            Ok(profile)
        })
    }

    async fn update_user(&self, profile: &UserProfile, expected_version: u64) -> StoreResult<UserProfile> {
        self.write(|s| {
            let actual = s.live(profile.id)?.version;
            if actual != expected_version {
                return Err(StoreError::VersionConflict {
                    expected: expected_version,
                    actual,
                });
            }
            if s.username_taken(&profile.username, Some(profile.id)) {
                return Err(StoreError::AlreadyExists(format!("user '{}'", profile.username)));
            }
            let stored = s.live_mut(profile.id)?;
            stored.username = profile.username.clone();
            stored.email = profile.email.clone();
            stored.phone = profile.phone.clone();
            stored.status = profile.status;
            stored.account_expires_at = profile.account_expires_at;
            stored.is_system_user = profile.is_system_user;
            stored.updated_at = profile.updated_at;
            stored.version = expected_version + 1;
            Ok(stored.clone())
        })
    }

    async fn list_users(&self, page: Page) -> StoreResult<(Vec<UserProfile>, usize)> {
        self.read(|s| {
            let mut live: Vec<&UserProfile> = s.users.values().filter(|u| !u.is_deleted()).collect();
            live.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.username.cmp(&b.username)));
            let total = live.len();
            let items = live
                .into_iter()
                .skip(page.offset)
                .take(page.limit)
                .cloned()
                .collect();
            Ok((items, total))
        })
    }

    async fn soft_delete_user(&self, user_id: UserId, now: DateTime<Utc>) -> StoreResult<()> {
        self.write(|s| {
            let user = s.live_mut(user_id)?;
            user.deleted_at = Some(now);
            user.updated_at = now;
            for m in s.memberships.iter_mut().filter(|m| m.user_id == user_id && m.is_active()) {
                m.deleted_at = Some(now);
            }
            Ok(())
        })
    }

    async fn increment_login_attempts(&self, user_id: UserId) -> StoreResult<u32> {
        self.write(|s| {
            let user = s.live_mut(user_id)?;
            user.login_attempts = user.login_attempts.saturating_add(1);
            Ok(user.login_attempts)
        })
    }

    async fn reset_login_attempts(&self, user_id: UserId, last_login_at: Option<DateTime<Utc>>) -> StoreResult<()> {
        self.write(|s| {
            let user = s.live_mut(user_id)?;
            user.login_attempts = 0;
            if last_login_at.is_some() {
                user.last_login_at = last_login_at;
            }
            Ok(())
        })
    }

    async fn set_status(&self, user_id: UserId, status: UserStatus) -> StoreResult<()> {
        self.write(|s| {
            s.live_mut(user_id)?.status = status;
            Ok(())
        })
    }

    async fn set_must_change_password(&self, user_id: UserId, must_change: bool) -> StoreResult<()> {
        self.write(|s| {
            s.live_mut(user_id)?.must_change_password = must_change;
            Ok(())
        })
    }

    async fn update_password_hash(&self, user_id: UserId, password_hash: &str, must_change: bool) -> StoreResult<()> {
        self.write(|s| {
            let user = s.live_mut(user_id)?;
            user.password_hash = password_hash.to_string();
            user.must_change_password = must_change;
            Ok(())
        })
    }

    async fn add_membership(&self, membership: UserMembership) -> StoreResult<UserMembership> {
        self.write(|s| {
            s.live(membership.user_id)?;
            let duplicate = s.memberships.iter().any(|m| {
                m.is_active()
                    && m.user_id == membership.user_id
                    && m.organization_id == membership.organization_id
                    && m.department_id == membership.department_id
            });
            if duplicate {
                return Err(StoreError::AlreadyExists("membership".to_string()));
            }
            if membership.is_primary {
                for m in s
                    .memberships
                    .iter_mut()
                    .filter(|m| m.user_id == membership.user_id && m.is_active())
                {
                    m.is_primary = false;
                }
            }
            s.memberships.push(membership.clone());
            Ok(membership)
        })
    }

    async fn list_memberships(&self, user_id: UserId) -> StoreResult<Vec<UserMembership>> {
        self.read(|s| {
            Ok(s.memberships
                .iter()
                .filter(|m| m.user_id == user_id && m.is_active())
                .cloned()
                .collect())
        })
    }

    async fn primary_membership(&self, user_id: UserId) -> StoreResult<Option<UserMembership>> {
        self.read(|s| {
            Ok(s.memberships
                .iter()
                .find(|m| m.user_id == user_id && m.is_active() && m.is_primary)
                .cloned())
        })
    }
}
