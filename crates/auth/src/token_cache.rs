//! Token cache port: session index and revocation records.
//!
//! Tokens are never stored; every key is the hex SHA-256 fingerprint of the
//! token so a cache dump cannot be replayed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use warden_core::UserId;

use crate::store::StoreResult;

/// Hex-encoded SHA-256 of a token.
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Per-token session metadata enabling bulk logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user_id: UserId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Lifetime left at `now`, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Revocation record stored under the revocation namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub revoked_at: DateTime<Utc>,
}

/// Key-value cache with per-key TTL holding sessions and revocations.
///
/// Revocations written by one instance are visible to that instance's next
/// read. Entries disappear when their TTL elapses.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Record a session for `token`. Idempotent.
    async fn cache_session(&self, token: &str, user_id: UserId, ttl: Duration) -> StoreResult<()>;

    async fn is_revoked(&self, token: &str) -> StoreResult<bool>;

    /// Flag `token` as revoked for `ttl` and drop its session. A zero TTL is a no-op.
    async fn revoke_token(&self, token: &str, ttl: Duration) -> StoreResult<()>;

    /// Revoke every live session of the user. Returns how many were revoked.
    async fn revoke_all_for_user(&self, user_id: UserId) -> StoreResult<usize>;

    /// Cheap reachability probe used by health checks.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<C> TokenCache for Arc<C>
where
    C: TokenCache + ?Sized,
{
    async fn cache_session(&self, token: &str, user_id: UserId, ttl: Duration) -> StoreResult<()> {
        (**self).cache_session(token, user_id, ttl).await
    }

    async fn is_revoked(&self, token: &str) -> StoreResult<bool> {
        (**self).is_revoked(token).await
    }

    async fn revoke_token(&self, token: &str, ttl: Duration) -> StoreResult<()> {
        (**self).revoke_token(token, ttl).await
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> StoreResult<usize> {
        (**self).revoke_all_for_user(user_id).await
    }

    async fn ping(&self) -> StoreResult<()> {
        (**self).ping().await
    }
}
