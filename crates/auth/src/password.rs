//! Password hashing (bcrypt) and the password policy.
//!
//! Hashing and verification run on the blocking pool; bcrypt is deliberately
//! slow and must not stall the async workers.

use std::sync::{Arc, OnceLock};

use crate::error::AuthError;

pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Minimum strength rules for new passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_len: usize,
    /// bcrypt only reads the first 72 bytes.
    pub max_len: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_len: 8,
            max_len: 72,
        }
    }
}

impl PasswordPolicy {
    /// Length bounds, at least one letter and at least one digit.
    pub fn validate(&self, password: &str) -> Result<(), AuthError> {
        let len = password.len();
        if len < self.min_len {
            return Err(AuthError::WeakPassword(format!(
                "must be at least {} characters",
                self.min_len
            )));
        }
        if len > self.max_len {
            return Err(AuthError::WeakPassword(format!(
                "must be at most {} bytes",
                self.max_len
            )));
        }
        if !password.chars().any(|c| c.is_alphabetic()) {
            return Err(AuthError::WeakPassword("must contain a letter".into()));
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::WeakPassword("must contain a digit".into()));
        }
        Ok(())
    }
}

/// bcrypt hasher with a fixed cost.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy: Arc<OnceLock<String>>,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy: Arc::new(OnceLock::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AuthError::PasswordHash(e.to_string()))?
            .map_err(|e| AuthError::PasswordHash(e.to_string()))
    }

    /// Constant-time comparison of `password` against `hash`.
    ///
    /// A malformed stored hash verifies as `false`.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        let matched = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AuthError::PasswordHash(e.to_string()))?;
        match matched {
            Ok(ok) => Ok(ok),
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is unreadable");
                Ok(false)
            }
        }
    }

    /// Spend the same work as a real verification so unknown usernames are
    /// indistinguishable by timing.
    pub async fn verify_dummy(&self, password: &str) {
        let dummy = match self.dummy.get() {
            Some(h) => h.clone(),
            None => match self.hash("warden-dummy-password-0").await {
                Ok(h) => self.dummy.get_or_init(|| h).clone(),
                Err(_) => return,
            },
        };
        let _ = self.verify(password, &dummy).await;
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}
