//! HS256 token service: mint, parse, refresh and revoke.
//!
//! Every operation takes an explicit `now` so expiry behavior is testable
//! without sleeping.

use std::collections::HashSet;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use warden_core::ErrorCode;

use crate::claims::{IdentityClaims, TokenClaims, TokenValidationError, validate_claims};
use crate::store::StoreError;
use crate::token_cache::TokenCache;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is missing")]
    Missing,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token is invalid: {0}")]
    Invalid(String),

    #[error("token has expired")]
    Expired,

    #[error("token is not active yet")]
    NotActive,

    #[error("token is past its refresh window")]
    RefreshWindowExceeded,

    #[error("token has been revoked")]
    Revoked,

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("token cache unavailable: {0}")]
    Cache(#[from] StoreError),
}

impl TokenError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TokenError::Missing => ErrorCode::TokenMissing,
            TokenError::Malformed(_) => ErrorCode::TokenMalformed,
            TokenError::Invalid(_) => ErrorCode::TokenInvalid,
            // A revoked token is reported as expired so clients re-authenticate.
            TokenError::Expired | TokenError::RefreshWindowExceeded | TokenError::Revoked => {
                ErrorCode::TokenExpired
            }
            TokenError::NotActive => ErrorCode::TokenNotActive,
            TokenError::Signing(_) => ErrorCode::SigningError,
            TokenError::Cache(_) => ErrorCode::ServiceDown,
        }
    }
}

impl From<TokenValidationError> for TokenError {
    fn from(err: TokenValidationError) -> Self {
        match err {
            TokenValidationError::Expired => TokenError::Expired,
            TokenValidationError::NotYetValid => TokenError::NotActive,
            TokenValidationError::InvalidTimeWindow => TokenError::Malformed(err.to_string()),
        }
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            TokenError::Invalid(err.to_string())
        }
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotActive,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::MissingRequiredClaim(_) => TokenError::Malformed(err.to_string()),
        _ => TokenError::Invalid(err.to_string()),
    }
}

/// Startup validation failures of [`TokenSettings`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenConfigError {
    #[error("signing key is empty")]
    EmptyKey,

    #[error("signing key is not valid base64: {0}")]
    KeyNotBase64(String),

    #[error("token timeout must be positive")]
    NonPositiveTimeout,

    #[error("max refresh ({max_refresh}s) must be >= timeout ({timeout}s)")]
    RefreshShorterThanTimeout { timeout: i64, max_refresh: i64 },
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSettings {
    /// Base64-encoded HMAC secret.
    pub signing_key: String,
    pub timeout: Duration,
    pub max_refresh: Duration,
}

impl TokenSettings {
    /// Decode the key and check the lifetimes.
    pub fn validate(&self) -> Result<Vec<u8>, TokenConfigError> {
        let raw = self.signing_key.trim();
        if raw.is_empty() {
            return Err(TokenConfigError::EmptyKey);
        }
        let key = BASE64
            .decode(raw)
            .map_err(|e| TokenConfigError::KeyNotBase64(e.to_string()))?;
        if key.is_empty() {
            return Err(TokenConfigError::EmptyKey);
        }
        if self.timeout <= Duration::zero() {
            return Err(TokenConfigError::NonPositiveTimeout);
        }
        if self.max_refresh < self.timeout {
            return Err(TokenConfigError::RefreshShorterThanTimeout {
                timeout: self.timeout.num_seconds(),
                max_refresh: self.max_refresh.num_seconds(),
            });
        }
        Ok(key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// A freshly signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintedToken {
    pub token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    timeout: Duration,
    max_refresh: Duration,
    cache: Arc<dyn TokenCache>,
}

impl core::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("timeout", &self.timeout)
            .field("max_refresh", &self.max_refresh)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(settings: &TokenSettings, cache: Arc<dyn TokenCache>) -> Result<Self, TokenConfigError> {
        let key = settings.validate()?;
        Ok(Self {
            encoding: EncodingKey::from_secret(&key),
            decoding: DecodingKey::from_secret(&key),
            timeout: settings.timeout,
            max_refresh: settings.max_refresh,
            cache,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cache(&self) -> &Arc<dyn TokenCache> {
        &self.cache
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time claims are checked against the caller's clock in `validate_claims`.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string(), "iat".to_string()]);
        validation
    }

    /// Sign `identity` and record the session in the token cache.
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id), err)]
    pub async fn mint(&self, identity: IdentityClaims, now: DateTime<Utc>) -> Result<MintedToken, TokenError> {
        let issued_at = now.timestamp();
        let expires_at = now + self.timeout;
        let user_id = identity.user_id;
        let claims = TokenClaims {
            identity,
            jti: Uuid::new_v4().to_string(),
            iat: issued_at,
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        let ttl = (expires_at - now).to_std().unwrap_or_default();
        self.cache.cache_session(&token, user_id, ttl).await?;

        Ok(MintedToken {
            token,
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        })
    }

    /// Verify the signature only; time claims are not checked.
    fn decode_unchecked(&self, token: &str) -> Result<TokenClaims, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::Missing);
        }
        decode::<TokenClaims>(token, &self.decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }

    /// Verify signature and expiry.
    pub fn parse(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let claims = self.decode_unchecked(token)?;
        validate_claims(&claims, now)?;
        Ok(claims)
    }

    /// Parse and reject revoked tokens.
    pub async fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let claims = self.parse(token, now)?;
        if self.cache.is_revoked(token).await? {
            return Err(TokenError::Revoked);
        }
        Ok(claims)
    }

    /// Issue a fresh token carrying the same identity.
    ///
    /// Accepts an expired token as long as `now - iat <= max_refresh`. The old
    /// token stays valid until it expires or is revoked explicitly.
    #[instrument(skip(self, token), err)]
    pub async fn refresh(&self, token: &str, now: DateTime<Utc>) -> Result<(MintedToken, TokenClaims), TokenError> {
        let claims = self.refresh_claims(token, now).await?;
        let minted = self.mint(claims.identity.clone(), now).await?;
        Ok((minted, claims))
    }

    /// The claims of `token` if it may be refreshed at `now`, without minting.
    pub async fn refresh_claims(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let claims = self.decode_unchecked(token)?;
        if claims.exp <= claims.iat {
            return Err(TokenValidationError::InvalidTimeWindow.into());
        }
        if now < claims.issued_at() {
            return Err(TokenError::NotActive);
        }
        if now - claims.issued_at() > self.max_refresh {
            return Err(TokenError::RefreshWindowExceeded);
        }
        if self.cache.is_revoked(token).await? {
            return Err(TokenError::Revoked);
        }
        Ok(claims)
    }

    /// Revoke `token` for the rest of its lifetime.
    ///
    /// Unparseable tokens and tokens already past `exp` are accepted as no-ops.
    #[instrument(skip(self, token), err)]
    pub async fn revoke(&self, token: &str, now: DateTime<Utc>) -> Result<(), TokenError> {
        let claims = match self.decode_unchecked(token) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(error = %err, "revoke of unparseable token ignored");
                return Ok(());
            }
        };
        let remaining = claims.remaining_secs(now);
        if remaining == 0 {
            return Ok(());
        }
        self.cache
            .revoke_token(token, std::time::Duration::from_secs(remaining))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use warden_core::{RoleId, UserId};

    use super::*;
    use crate::store::StoreResult;
    use crate::token_cache::token_fingerprint;
    use crate::user::UserStatus;

    #[derive(Default)]
    struct RecordingCache {
        sessions: Mutex<HashMap<String, UserId>>,
        revoked: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl TokenCache for RecordingCache {
        async fn cache_session(&self, token: &str, user_id: UserId, _ttl: std::time::Duration) -> StoreResult<()> {
            self.sessions.lock().unwrap().insert(token_fingerprint(token), user_id);
            Ok(())
        }

        async fn is_revoked(&self, token: &str) -> StoreResult<bool> {
            Ok(self.revoked.lock().unwrap().contains(&token_fingerprint(token)))
        }

        async fn revoke_token(&self, token: &str, ttl: std::time::Duration) -> StoreResult<()> {
            if !ttl.is_zero() {
                self.revoked.lock().unwrap().insert(token_fingerprint(token));
            }
            Ok(())
        }

        async fn revoke_all_for_user(&self, _user_id: UserId) -> StoreResult<usize> {
            Ok(0)
        }
    }

    fn settings() -> TokenSettings {
        TokenSettings {
            signing_key: BASE64.encode(b"0123456789abcdef0123456789abcdef"),
            timeout: Duration::seconds(3600),
            max_refresh: Duration::seconds(86_400),
        }
    }

    fn service() -> (TokenService, Arc<RecordingCache>) {
        let cache = Arc::new(RecordingCache::default());
        let svc = TokenService::new(&settings(), cache.clone()).unwrap();
        (svc, cache)
    }

    fn identity() -> IdentityClaims {
        IdentityClaims {
            user_id: UserId::new(),
            username: "alice".into(),
            status: UserStatus::Active,
            role_id: Some(RoleId::new()),
            organization_id: None,
            department_id: None,
            core_permission: "view_own_organization".into(),
        }
    }

    #[tokio::test]
    async fn parse_of_mint_returns_claims_and_records_session() {
        let (svc, cache) = service();
        let now = Utc::now();
        let id = identity();
        let minted = svc.mint(id.clone(), now).await.unwrap();

        let parsed = svc.parse(&minted.token, now).unwrap();
        assert_eq!(parsed.identity, id);
        assert_eq!(parsed.exp - parsed.iat, 3600);
        assert_eq!(
            cache.sessions.lock().unwrap().get(&token_fingerprint(&minted.token)),
            Some(&id.user_id)
        );
    }

    #[tokio::test]
    async fn expires_after_timeout() {
        let (svc, _) = service();
        let now = Utc::now();
        let minted = svc.mint(identity(), now).await.unwrap();

        assert!(svc.parse(&minted.token, now + Duration::seconds(3599)).is_ok());
        let err = svc.parse(&minted.token, now + Duration::seconds(3600)).unwrap_err();
        assert_eq!(err, TokenError::Expired);
        assert_eq!(err.code(), ErrorCode::TokenExpired);
    }

    #[tokio::test]
    async fn tampered_and_garbage_tokens() {
        let (svc, _) = service();
        let now = Utc::now();
        let minted = svc.mint(identity(), now).await.unwrap();

        let mut parts: Vec<&str> = minted.token.split('.').collect();
        parts[2] = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        let tampered = parts.join(".");
        assert_eq!(svc.parse(&tampered, now).unwrap_err().code(), ErrorCode::TokenInvalid);

        assert_eq!(svc.parse("abc", now).unwrap_err().code(), ErrorCode::TokenMalformed);
        assert_eq!(svc.parse("", now).unwrap_err(), TokenError::Missing);
    }

    #[tokio::test]
    async fn foreign_key_is_rejected() {
        let (svc, _) = service();
        let now = Utc::now();
        let minted = svc.mint(identity(), now).await.unwrap();

        let mut other = settings();
        other.signing_key = BASE64.encode(b"another-secret-another-secret!!!");
        let foreign = TokenService::new(&other, Arc::new(RecordingCache::default())).unwrap();
        assert_eq!(
            foreign.parse(&minted.token, now).unwrap_err().code(),
            ErrorCode::TokenInvalid
        );
    }

    #[tokio::test]
    async fn refresh_accepts_expired_token_within_window() {
        let (svc, _) = service();
        let now = Utc::now();
        let old = svc.mint(identity(), now).await.unwrap();

        let later = now + Duration::seconds(7200);
        let (fresh, old_claims) = svc.refresh(&old.token, later).await.unwrap();
        let parsed = svc.parse(&fresh.token, later).unwrap();
        assert_eq!(parsed.identity, old_claims.identity);
        assert_eq!(parsed.iat, later.timestamp());

        let too_late = now + Duration::seconds(86_401);
        assert_eq!(
            svc.refresh(&old.token, too_late).await.unwrap_err(),
            TokenError::RefreshWindowExceeded
        );
    }

    #[tokio::test]
    async fn refresh_keeps_old_token_valid() {
        let (svc, _) = service();
        let now = Utc::now();
        let old = svc.mint(identity(), now).await.unwrap();
        svc.refresh(&old.token, now + Duration::seconds(10)).await.unwrap();
        assert!(svc.authenticate(&old.token, now + Duration::seconds(10)).await.is_ok());
    }

    #[tokio::test]
    async fn same_second_mints_are_distinct_sessions() {
        let (svc, cache) = service();
        let now = Utc::now();
        let id = identity();
        let first = svc.mint(id.clone(), now).await.unwrap();
        let second = svc.mint(id, now).await.unwrap();

        assert_ne!(first.token, second.token);
        assert_eq!(cache.sessions.lock().unwrap().len(), 2);

        // Logging out one device leaves the other signed in.
        svc.revoke(&first.token, now).await.unwrap();
        assert!(svc.authenticate(&second.token, now).await.is_ok());
    }

    #[tokio::test]
    async fn revoking_old_token_after_same_second_refresh_keeps_new_one() {
        let (svc, _) = service();
        let now = Utc::now();
        let old = svc.mint(identity(), now).await.unwrap();

        let (fresh, _) = svc.refresh(&old.token, now).await.unwrap();
        assert_ne!(fresh.token, old.token);

        svc.revoke(&old.token, now).await.unwrap();
        assert_eq!(
            svc.authenticate(&old.token, now).await.unwrap_err(),
            TokenError::Revoked
        );
        let parsed = svc.authenticate(&fresh.token, now).await.unwrap();
        assert!(!parsed.jti.is_empty());
    }

    #[tokio::test]
    async fn revoke_is_lenient_and_effective() {
        let (svc, cache) = service();
        let now = Utc::now();
        let minted = svc.mint(identity(), now).await.unwrap();

        svc.revoke("not-a-token", now).await.unwrap();
        assert!(cache.revoked.lock().unwrap().is_empty());

        svc.revoke(&minted.token, now).await.unwrap();
        assert_eq!(
            svc.authenticate(&minted.token, now).await.unwrap_err(),
            TokenError::Revoked
        );
        assert_eq!(
            svc.refresh(&minted.token, now).await.unwrap_err().code(),
            ErrorCode::TokenExpired
        );
    }

    #[tokio::test]
    async fn revoking_an_expired_token_writes_nothing() {
        let (svc, cache) = service();
        let now = Utc::now();
        let minted = svc.mint(identity(), now).await.unwrap();
        svc.revoke(&minted.token, now + Duration::seconds(4000)).await.unwrap();
        assert!(cache.revoked.lock().unwrap().is_empty());
    }

    #[test]
    fn settings_validation() {
        let mut s = settings();
        assert!(s.validate().is_ok());

        s.signing_key = "   ".into();
        assert_eq!(s.validate(), Err(TokenConfigError::EmptyKey));

        s.signing_key = "%%%not base64%%%".into();
        assert!(matches!(s.validate(), Err(TokenConfigError::KeyNotBase64(_))));

        let mut s = settings();
        s.max_refresh = Duration::seconds(10);
        assert!(matches!(
            s.validate(),
            Err(TokenConfigError::RefreshShorterThanTimeout { .. })
        ));
    }
}
