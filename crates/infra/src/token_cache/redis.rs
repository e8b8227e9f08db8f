//! Redis-backed token cache.
//!
//! Key layout (every token appears only as its SHA-256 fingerprint):
//!
//! | Key | Value | TTL |
//! |---|---|---|
//! | `warden:session:<fp>` | JSON [`SessionRecord`] | token lifetime |
//! | `warden:revoked:<fp>` | JSON [`RevocationRecord`] | remaining token lifetime |
//! | `warden:user_sessions:<user_id>` | set of fingerprints | longest session TTL |

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use tracing::{debug, instrument, warn};

use warden_auth::{RevocationRecord, SessionRecord, StoreError, StoreResult, TokenCache, token_fingerprint};
use warden_core::UserId;

const SESSION_PREFIX: &str = "warden:session:";
const REVOKED_PREFIX: &str = "warden:revoked:";
const USER_SESSIONS_PREFIX: &str = "warden:user_sessions:";

fn session_key(fingerprint: &str) -> String {
    format!("{SESSION_PREFIX}{fingerprint}")
}

fn revoked_key(fingerprint: &str) -> String {
    format!("{REVOKED_PREFIX}{fingerprint}")
}

fn user_sessions_key(user_id: UserId) -> String {
    format!("{USER_SESSIONS_PREFIX}{user_id}")
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> StoreError {
    StoreError::Backend(format!("redis error in {operation}: {err}"))
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(format!("encode cache record: {e}")))
}

/// Shared token cache for multi-instance deployments.
///
/// Holds a [`ConnectionManager`], which reconnects transparently and is cheap
/// to clone per call.
#[derive(Clone)]
pub struct RedisTokenCache {
    conn: ConnectionManager,
}

impl core::fmt::Debug for RedisTokenCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisTokenCache").finish_non_exhaustive()
    }
}

impl RedisTokenCache {
    /// Connect to `redis_url`. Fails when the server is unreachable.
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| map_redis_error("open_client", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| map_redis_error("connect", e))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl TokenCache for RedisTokenCache {
    #[instrument(skip(self, token), fields(user_id = %user_id), err)]
    async fn cache_session(&self, token: &str, user_id: UserId, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        let fingerprint = token_fingerprint(token);
        let created_at = Utc::now();
        let record = SessionRecord {
            user_id,
            created_at,
            expires_at: created_at + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
        };
        let ms = ttl_millis(ttl);
        let index = user_sessions_key(user_id);

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(session_key(&fingerprint))
            .arg(encode(&record)?)
            .arg("PX")
            .arg(ms)
            .ignore()
            .cmd("SADD")
            .arg(&index)
            .arg(&fingerprint)
            .ignore()
            // extend the index to cover the newest session, never shorten it
            .cmd("PEXPIRE")
            .arg(&index)
            .arg(ms)
            .arg("GT")
            .ignore()
            .cmd("PEXPIRE")
            .arg(&index)
            .arg(ms)
            .arg("NX")
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("cache_session", e))
    }

    #[instrument(skip(self, token), err)]
    async fn is_revoked(&self, token: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        redis::cmd("EXISTS")
            .arg(revoked_key(&token_fingerprint(token)))
            .query_async::<_, bool>(&mut conn)
            .await
            .map_err(|e| map_redis_error("is_revoked", e))
    }

    #[instrument(skip(self, token), err)]
    async fn revoke_token(&self, token: &str, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        let fingerprint = token_fingerprint(token);
        let record = RevocationRecord { revoked_at: Utc::now() };
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(revoked_key(&fingerprint))
            .arg(encode(&record)?)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .ignore()
            .cmd("DEL")
            .arg(session_key(&fingerprint))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("revoke_token", e))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn revoke_all_for_user(&self, user_id: UserId) -> StoreResult<usize> {
        let index = user_sessions_key(user_id);
        let mut conn = self.conn.clone();

        let fingerprints: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&index)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("list_user_sessions", e))?;
        if fingerprints.is_empty() {
            return Ok(0);
        }

        let mut ttl_query = redis::pipe();
        for fp in &fingerprints {
            ttl_query.cmd("PTTL").arg(session_key(fp));
        }
        let ttls: Vec<i64> = ttl_query
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("session_ttls", e))?;

        let record = encode(&RevocationRecord { revoked_at: Utc::now() })?;
        let mut revoke = redis::pipe();
        revoke.atomic();
        let mut revoked = 0usize;
        for (fp, ttl) in fingerprints.iter().zip(ttls) {
            // -2: session already gone; -1: no TTL, which we never write
            if ttl <= 0 {
                if ttl == -1 {
                    warn!(fingerprint = %fp, "session key without ttl skipped");
                }
                continue;
            }
            revoke
                .cmd("SET")
                .arg(revoked_key(fp))
                .arg(&record)
                .arg("PX")
                .arg(ttl)
                .ignore()
                .cmd("DEL")
                .arg(session_key(fp))
                .ignore();
            revoked += 1;
        }
        revoke.cmd("DEL").arg(&index).ignore();
        revoke
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("revoke_all_for_user", e))?;

        debug!(revoked, "revoked all sessions");
        Ok(revoked)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| map_redis_error("ping", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_fingerprints() {
        let fp = token_fingerprint("abc");
        assert_eq!(session_key(&fp), format!("warden:session:{fp}"));
        assert_eq!(revoked_key(&fp), format!("warden:revoked:{fp}"));
        assert!(!session_key(&fp).contains("abc:"));
    }

    #[test]
    fn sub_millisecond_ttl_rounds_up() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2_000);
    }
}
