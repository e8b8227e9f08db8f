//! Authentication/authorization error model.

use thiserror::Error;

use warden_core::{ErrorCode, ServiceError};

use crate::claims::IdentityClaims;
use crate::store::StoreError;
use crate::token::TokenError;

/// Failures raised by the authenticator, evaluator and identity operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password (deliberately indistinguishable).
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("user is locked")]
    UserLocked,

    #[error("user is suspended")]
    UserSuspended,

    #[error("user is inactive")]
    UserInactive,

    #[error("user not found")]
    UserNotFound,

    /// Credentials were correct but the password must be changed first.
    ///
    /// Carries claims that are only good enough for the change-password endpoint.
    #[error("password must be changed")]
    MustChangePassword(Box<IdentityClaims>),

    #[error("user has no available roles")]
    NoAvailableRoles,

    #[error("role not found")]
    RoleNotFound,

    #[error("weak password: {0}")]
    WeakPassword(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("system user cannot be modified: {0}")]
    SystemUserCannotModify(String),

    #[error("system user cannot be deleted")]
    SystemUserCannotDelete,

    #[error("system role cannot be modified")]
    SystemRoleCannotModify,

    #[error("system role cannot be deleted")]
    SystemRoleCannotDelete,

    #[error("system role cannot be revoked from a system user")]
    SystemRoleCannotRevoke,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AuthError::UserLocked => ErrorCode::UserLocked,
            AuthError::UserSuspended => ErrorCode::UserSuspended,
            AuthError::UserInactive => ErrorCode::UserInactive,
            AuthError::UserNotFound => ErrorCode::UserNotFound,
            AuthError::MustChangePassword(_) => ErrorCode::MustChangePassword,
            AuthError::NoAvailableRoles => ErrorCode::NoAvailableRoles,
            AuthError::RoleNotFound => ErrorCode::RoleNotFound,
            AuthError::WeakPassword(_) => ErrorCode::WeakPassword,
            AuthError::InvalidInput(_) => ErrorCode::InvalidParams,
            AuthError::SystemUserCannotModify(_) => ErrorCode::SystemUserCannotModify,
            AuthError::SystemUserCannotDelete => ErrorCode::SystemUserCannotDelete,
            AuthError::SystemRoleCannotModify => ErrorCode::SystemRoleCannotModify,
            AuthError::SystemRoleCannotDelete => ErrorCode::SystemRoleCannotDelete,
            AuthError::SystemRoleCannotRevoke => ErrorCode::SystemRoleCannotRevoke,
            AuthError::Forbidden(_) => ErrorCode::Forbidden,
            AuthError::PasswordHash(_) => ErrorCode::Internal,
            AuthError::Token(e) => e.code(),
            AuthError::Store(e) => e.code(),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        let code = err.code();
        // Backend details stay in the logs.
        let message = match code {
            ErrorCode::Internal => code.default_message().to_string(),
            _ => err.to_string(),
        };
        ServiceError::new(code, message)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        AuthError::from(err).into()
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        AuthError::from(err).into()
    }
}
