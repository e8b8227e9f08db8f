use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use warden_core::{ErrorCode, ServiceError};

use crate::app::dto::Envelope;

/// HTTP status for an error code.
///
/// Token and credential failures are 401, user-state problems 403, lookups
/// 404. Business rule violations stay 200 so clients read the envelope code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Success => StatusCode::OK,

        ErrorCode::InvalidParams => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,

        ErrorCode::TokenMissing
        | ErrorCode::TokenInvalid
        | ErrorCode::TokenExpired
        | ErrorCode::TokenNotActive
        | ErrorCode::TokenMalformed
        | ErrorCode::ValidationFailure
        | ErrorCode::JwtInvalidCredentials => StatusCode::UNAUTHORIZED,
        ErrorCode::SigningError | ErrorCode::CreationFailure => StatusCode::INTERNAL_SERVER_ERROR,

        ErrorCode::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::ServiceDown => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,

        ErrorCode::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ErrorCode::UserInactive
        | ErrorCode::UserSuspended
        | ErrorCode::UserLocked
        | ErrorCode::MustChangePassword
        | ErrorCode::NoAvailableRoles => StatusCode::FORBIDDEN,
        ErrorCode::UserNotFound | ErrorCode::RoleNotFound | ErrorCode::MenuVersionNotFound => {
            StatusCode::NOT_FOUND
        }
        ErrorCode::SystemUserCannotDelete
        | ErrorCode::SystemRoleCannotModify
        | ErrorCode::SystemRoleCannotDelete
        | ErrorCode::RoleInUse
        | ErrorCode::SystemRoleCannotRevoke
        | ErrorCode::RoleAssignmentAlreadyExists
        | ErrorCode::VersionConflict
        | ErrorCode::AlreadyExists
        | ErrorCode::InvalidMenuPermission
        | ErrorCode::InvalidMenuDocument
        | ErrorCode::SystemUserCannotModify
        | ErrorCode::WeakPassword => StatusCode::OK,
    }
}

/// A failed request, rendered as the `{code, message, data?}` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    error: ServiceError,
    data: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ServiceError::new(code, message).into()
    }

    /// Error envelope that still carries a payload.
    pub fn with_data(error: ServiceError, data: serde_json::Value) -> Self {
        Self {
            error,
            data: Some(data),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.error.code()
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        Self { error, data: None }
    }
}

impl From<ErrorCode> for ApiError {
    fn from(code: ErrorCode) -> Self {
        ServiceError::from(code).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error.code();
        let body = Envelope {
            code,
            message: self.error.message().to_string(),
            data: self.data,
        };
        (status_for(code), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
