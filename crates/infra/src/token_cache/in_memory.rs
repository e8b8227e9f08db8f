use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::debug;

use warden_auth::{SessionRecord, StoreError, StoreResult, TokenCache, token_fingerprint};
use warden_core::UserId;

#[derive(Debug)]
struct Entry<T> {
    value: T,
    deadline: Instant,
}

impl<T> Entry<T> {
    fn live(&self, now: Instant) -> bool {
        self.deadline > now
    }
}

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<String, Entry<SessionRecord>>,
    revoked: HashMap<String, Entry<()>>,
}

impl State {
    fn sweep(&mut self, now: Instant) {
        self.sessions.retain(|_, e| e.live(now));
        self.revoked.retain(|_, e| e.live(now));
    }

    fn revoke_fingerprint(&mut self, fingerprint: String, deadline: Instant) {
        self.sessions.remove(&fingerprint);
        let slot = self.revoked.entry(fingerprint).or_insert(Entry { value: (), deadline });
        slot.deadline = slot.deadline.max(deadline);
    }
}

/// Single-process token cache with per-entry TTL.
///
/// Deadlines use `tokio::time::Instant` so paused-clock tests can advance
/// past them. Expired entries are swept lazily on every access.
#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    state: Mutex<State>,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut State, Instant) -> T) -> StoreResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let now = Instant::now();
        state.sweep(now);
        Ok(f(&mut state, now))
    }

    /// Live session count; tests and diagnostics.
    pub fn session_count(&self) -> usize {
        self.with(|s, _| s.sessions.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn cache_session(&self, token: &str, user_id: UserId, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        let fingerprint = token_fingerprint(token);
        self.with(|s, now| {
            let created_at = Utc::now();
            let expires_at = created_at + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
            s.sessions.insert(
                fingerprint,
                Entry {
                    value: SessionRecord {
                        user_id,
                        created_at,
                        expires_at,
                    },
                    deadline: now + ttl,
                },
            );
        })
    }

    async fn is_revoked(&self, token: &str) -> StoreResult<bool> {
        let fingerprint = token_fingerprint(token);
        self.with(|s, _| s.revoked.contains_key(&fingerprint))
    }

    async fn revoke_token(&self, token: &str, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        let fingerprint = token_fingerprint(token);
        self.with(|s, now| s.revoke_fingerprint(fingerprint, now + ttl))
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> StoreResult<usize> {
        self.with(|s, _| {
            let targets: Vec<(String, Instant)> = s
                .sessions
                .iter()
                .filter(|(_, e)| e.value.user_id == user_id)
                .map(|(fp, e)| (fp.clone(), e.deadline))
                .collect();
            let count = targets.len();
            for (fingerprint, deadline) in targets {
                s.revoke_fingerprint(fingerprint, deadline);
            }
            debug!(user_id = %user_id, count, "revoked all sessions");
            count
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn revocation_lasts_exactly_its_ttl() {
        let cache = InMemoryTokenCache::new();
        cache.revoke_token("t1", Duration::from_secs(10)).await.unwrap();
        assert!(cache.is_revoked("t1").await.unwrap());

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.is_revoked("t1").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.is_revoked("t1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_revocation_is_a_no_op() {
        let cache = InMemoryTokenCache::new();
        cache.revoke_token("t1", Duration::ZERO).await.unwrap();
        assert!(!cache.is_revoked("t1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn revoking_a_token_drops_its_session() {
        let cache = InMemoryTokenCache::new();
        let user = UserId::new();
        cache.cache_session("t1", user, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.session_count(), 1);
        cache.revoke_token("t1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.session_count(), 0);
        assert_eq!(cache.revoke_all_for_user(user).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn revoke_all_targets_only_live_sessions_of_the_user() {
        let cache = InMemoryTokenCache::new();
        let alice = UserId::new();
        let bob = UserId::new();
        cache.cache_session("a1", alice, Duration::from_secs(60)).await.unwrap();
        cache.cache_session("a2", alice, Duration::from_secs(5)).await.unwrap();
        cache.cache_session("b1", bob, Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.revoke_all_for_user(alice).await.unwrap(), 1);
        assert!(cache.is_revoked("a1").await.unwrap());
        assert!(!cache.is_revoked("a2").await.unwrap());
        assert!(!cache.is_revoked("b1").await.unwrap());

        // the revocation expires with the session it replaced
        tokio::time::advance(Duration::from_secs(55)).await;
        assert!(!cache.is_revoked("a1").await.unwrap());
    }
}
