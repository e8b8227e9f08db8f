//! Stable error taxonomy shared by the gateway and the identity service.
//!
//! Codes follow the `A-BB-CCC` pattern: `A` is the level, `BB` the module and
//! `CCC` the specific failure. Numeric values are part of the wire contract and
//! must never be renumbered.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across service boundaries.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Broad family an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Success,
    /// 100xxx
    System,
    /// 101xxx
    Jwt,
    /// 110xxx
    Gateway,
    /// 201xxx
    Identity,
}

/// Every failure the platform can surface to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success,

    // System (100xxx)
    InvalidParams,
    Unauthorized,
    Forbidden,
    NotFound,
    Internal,
    MethodNotAllowed,

    // JWT (101xxx)
    TokenMissing,
    TokenInvalid,
    TokenExpired,
    TokenNotActive,
    TokenMalformed,
    ValidationFailure,
    SigningError,
    CreationFailure,
    JwtInvalidCredentials,

    // Gateway (110xxx)
    GatewayTimeout,
    ServiceDown,
    RateLimited,

    // Identity business (201xxx)
    UserInactive,
    UserNotFound,
    InvalidCredentials,
    UserSuspended,
    MustChangePassword,
    NoAvailableRoles,
    SystemUserCannotDelete,
    SystemRoleCannotModify,
    SystemRoleCannotDelete,
    RoleInUse,
    SystemRoleCannotRevoke,
    RoleAssignmentAlreadyExists,
    UserLocked,
    VersionConflict,
    AlreadyExists,
    RoleNotFound,
    MenuVersionNotFound,
    InvalidMenuPermission,
    InvalidMenuDocument,
    SystemUserCannotModify,
    WeakPassword,
}

impl ErrorCode {
    pub const ALL: &'static [ErrorCode] = &[
        ErrorCode::Success,
        ErrorCode::InvalidParams,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::Internal,
        ErrorCode::MethodNotAllowed,
        ErrorCode::TokenMissing,
        ErrorCode::TokenInvalid,
        ErrorCode::TokenExpired,
        ErrorCode::TokenNotActive,
        ErrorCode::TokenMalformed,
        ErrorCode::ValidationFailure,
        ErrorCode::SigningError,
        ErrorCode::CreationFailure,
        ErrorCode::JwtInvalidCredentials,
        ErrorCode::GatewayTimeout,
        ErrorCode::ServiceDown,
        ErrorCode::RateLimited,
        ErrorCode::UserInactive,
        ErrorCode::UserNotFound,
        ErrorCode::InvalidCredentials,
        ErrorCode::UserSuspended,
        ErrorCode::MustChangePassword,
        ErrorCode::NoAvailableRoles,
        ErrorCode::SystemUserCannotDelete,
        ErrorCode::SystemRoleCannotModify,
        ErrorCode::SystemRoleCannotDelete,
        ErrorCode::RoleInUse,
        ErrorCode::SystemRoleCannotRevoke,
        ErrorCode::RoleAssignmentAlreadyExists,
        ErrorCode::UserLocked,
        ErrorCode::VersionConflict,
        ErrorCode::AlreadyExists,
        ErrorCode::RoleNotFound,
        ErrorCode::MenuVersionNotFound,
        ErrorCode::InvalidMenuPermission,
        ErrorCode::InvalidMenuDocument,
        ErrorCode::SystemUserCannotModify,
        ErrorCode::WeakPassword,
    ];

    /// Numeric wire value.
    pub const fn as_u32(self) -> u32 {
        match self {
            ErrorCode::Success => 0,

            ErrorCode::InvalidParams => 100_001,
            ErrorCode::Unauthorized => 100_002,
            ErrorCode::Forbidden => 100_003,
            ErrorCode::NotFound => 100_004,
            ErrorCode::Internal => 100_005,
            ErrorCode::MethodNotAllowed => 100_006,

            ErrorCode::TokenMissing => 101_001,
            ErrorCode::TokenInvalid => 101_002,
            ErrorCode::TokenExpired => 101_003,
            ErrorCode::TokenNotActive => 101_004,
            ErrorCode::TokenMalformed => 101_005,
            ErrorCode::ValidationFailure => 101_006,
            ErrorCode::SigningError => 101_007,
            ErrorCode::CreationFailure => 101_008,
            ErrorCode::JwtInvalidCredentials => 101_009,

            ErrorCode::GatewayTimeout => 110_001,
            ErrorCode::ServiceDown => 110_002,
            ErrorCode::RateLimited => 110_003,

            ErrorCode::UserInactive => 201_001,
            ErrorCode::UserNotFound => 201_002,
            ErrorCode::InvalidCredentials => 201_003,
            ErrorCode::UserSuspended => 201_004,
            ErrorCode::MustChangePassword => 201_005,
            ErrorCode::NoAvailableRoles => 201_006,
            ErrorCode::SystemUserCannotDelete => 201_007,
            ErrorCode::SystemRoleCannotModify => 201_008,
            ErrorCode::SystemRoleCannotDelete => 201_009,
            ErrorCode::RoleInUse => 201_010,
            ErrorCode::SystemRoleCannotRevoke => 201_011,
            ErrorCode::RoleAssignmentAlreadyExists => 201_012,
            ErrorCode::UserLocked => 201_013,
            ErrorCode::VersionConflict => 201_014,
            ErrorCode::AlreadyExists => 201_015,
            ErrorCode::RoleNotFound => 201_016,
            ErrorCode::MenuVersionNotFound => 201_017,
            ErrorCode::InvalidMenuPermission => 201_018,
            ErrorCode::InvalidMenuDocument => 201_019,
            ErrorCode::SystemUserCannotModify => 201_020,
            ErrorCode::WeakPassword => 201_021,
        }
    }

    /// Look a code up by its numeric wire value.
    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_u32() == value)
    }

    pub const fn category(self) -> ErrorCategory {
        match self.as_u32() / 1000 {
            0 => ErrorCategory::Success,
            100 => ErrorCategory::System,
            101 => ErrorCategory::Jwt,
            110 => ErrorCategory::Gateway,
            _ => ErrorCategory::Identity,
        }
    }

    /// Stable upper-snake name, used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            ErrorCode::Success => "SUCCESS",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::TokenMissing => "TOKEN_MISSING",
            ErrorCode::TokenInvalid => "TOKEN_INVALID",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::TokenNotActive => "TOKEN_NOT_ACTIVE",
            ErrorCode::TokenMalformed => "TOKEN_MALFORMED",
            ErrorCode::ValidationFailure => "VALIDATION_FAILURE",
            ErrorCode::SigningError => "SIGNING_ERROR",
            ErrorCode::CreationFailure => "CREATION_FAILURE",
            ErrorCode::JwtInvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::GatewayTimeout => "GATEWAY_TIMEOUT",
            ErrorCode::ServiceDown => "SERVICE_DOWN",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::UserInactive => "USER_INACTIVE",
            ErrorCode::UserNotFound => "USER_NOT_FOUND",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::UserSuspended => "USER_SUSPENDED",
            ErrorCode::MustChangePassword => "MUST_CHANGE_PASSWORD",
            ErrorCode::NoAvailableRoles => "NO_AVAILABLE_ROLES",
            ErrorCode::SystemUserCannotDelete => "SYSTEM_USER_CANNOT_DELETE",
            ErrorCode::SystemRoleCannotModify => "SYSTEM_ROLE_CANNOT_MODIFY",
            ErrorCode::SystemRoleCannotDelete => "SYSTEM_ROLE_CANNOT_DELETE",
            ErrorCode::RoleInUse => "ROLE_IN_USE",
            ErrorCode::SystemRoleCannotRevoke => "SYSTEM_ROLE_CANNOT_REVOKE",
            ErrorCode::RoleAssignmentAlreadyExists => "ROLE_ASSIGNMENT_ALREADY_EXISTS",
            ErrorCode::UserLocked => "USER_LOCKED",
            ErrorCode::VersionConflict => "VERSION_CONFLICT",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::RoleNotFound => "ROLE_NOT_FOUND",
            ErrorCode::MenuVersionNotFound => "MENU_VERSION_NOT_FOUND",
            ErrorCode::InvalidMenuPermission => "INVALID_MENU_PERMISSION",
            ErrorCode::InvalidMenuDocument => "INVALID_MENU_DOCUMENT",
            ErrorCode::SystemUserCannotModify => "SYSTEM_USER_CANNOT_MODIFY",
            ErrorCode::WeakPassword => "WEAK_PASSWORD",
        }
    }

    /// Default human-readable message for the code.
    pub const fn default_message(self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::InvalidParams => "invalid request parameters",
            ErrorCode::Unauthorized => "authentication required",
            ErrorCode::Forbidden => "permission denied",
            ErrorCode::NotFound => "resource not found",
            ErrorCode::Internal => "internal server error",
            ErrorCode::MethodNotAllowed => "method not allowed",
            ErrorCode::TokenMissing => "token is missing",
            ErrorCode::TokenInvalid => "token is invalid",
            ErrorCode::TokenExpired => "token has expired",
            ErrorCode::TokenNotActive => "token is not active yet",
            ErrorCode::TokenMalformed => "token is malformed",
            ErrorCode::ValidationFailure => "token validation failed",
            ErrorCode::SigningError => "token signing failed",
            ErrorCode::CreationFailure => "token creation failed",
            ErrorCode::JwtInvalidCredentials => "invalid credentials",
            ErrorCode::GatewayTimeout => "request timed out",
            ErrorCode::ServiceDown => "service unavailable",
            ErrorCode::RateLimited => "too many requests",
            ErrorCode::UserInactive => "user is inactive",
            ErrorCode::UserNotFound => "user not found",
            ErrorCode::InvalidCredentials => "invalid username or password",
            ErrorCode::UserSuspended => "user is suspended",
            ErrorCode::MustChangePassword => "password must be changed",
            ErrorCode::NoAvailableRoles => "user has no available roles",
            ErrorCode::SystemUserCannotDelete => "system user cannot be deleted",
            ErrorCode::SystemRoleCannotModify => "system role cannot be modified",
            ErrorCode::SystemRoleCannotDelete => "system role cannot be deleted",
            ErrorCode::RoleInUse => "role is assigned to users",
            ErrorCode::SystemRoleCannotRevoke => "system role cannot be revoked from system user",
            ErrorCode::RoleAssignmentAlreadyExists => "role assignment already exists",
            ErrorCode::UserLocked => "user is locked",
            ErrorCode::VersionConflict => "resource was modified concurrently",
            ErrorCode::AlreadyExists => "resource already exists",
            ErrorCode::RoleNotFound => "role not found",
            ErrorCode::MenuVersionNotFound => "no menu version available",
            ErrorCode::InvalidMenuPermission => "invalid menu permission",
            ErrorCode::InvalidMenuDocument => "invalid menu document",
            ErrorCode::SystemUserCannotModify => "system user cannot be modified",
            ErrorCode::WeakPassword => "password does not satisfy the password policy",
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({})", self.name(), self.as_u32())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.as_u32())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u32::deserialize(deserializer)?;
        ErrorCode::from_u32(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code {raw}")))
    }
}

/// Error crossing the identity-service boundary.
///
/// Code and message are preserved intact from where the error was raised to
/// the gateway envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ServiceError {
    code: ErrorCode,
    message: String,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, msg)
    }
}

impl From<ErrorCode> for ServiceError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn numeric_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ErrorCode::ALL {
            assert!(seen.insert(code.as_u32()), "duplicate code {code}");
        }
    }

    #[test]
    fn from_u32_is_inverse_of_as_u32() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::from_u32(code.as_u32()), Some(*code));
        }
        assert_eq!(ErrorCode::from_u32(999_999), None);
    }

    #[test]
    fn categories_follow_code_prefix() {
        assert_eq!(ErrorCode::Success.category(), ErrorCategory::Success);
        assert_eq!(ErrorCode::Forbidden.category(), ErrorCategory::System);
        assert_eq!(ErrorCode::TokenExpired.category(), ErrorCategory::Jwt);
        assert_eq!(ErrorCode::RateLimited.category(), ErrorCategory::Gateway);
        assert_eq!(ErrorCode::UserLocked.category(), ErrorCategory::Identity);
    }

    #[test]
    fn serializes_as_number() {
        let err = ServiceError::from(ErrorCode::TokenExpired);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 101_003);
        assert_eq!(json["message"], "token has expired");

        let back: ServiceError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }
}
