use thiserror::Error;

use crate::error::AuthError;
use crate::principal::Principal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{resource}:{action}'")]
    Forbidden { resource: String, action: String },
}

impl From<AuthzError> for AuthError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Forbidden { resource, action } => {
                AuthError::Forbidden(format!("{resource}:{action}"))
            }
        }
    }
}

/// Authorize a principal for `(resource, action)`.
///
/// - No IO
/// - No panics
/// - Super-admins pass unconditionally
pub fn authorize(principal: &Principal, resource: &str, action: &str) -> Result<(), AuthzError> {
    if principal.is_super_admin || principal.permissions.allows(resource, action) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            resource: resource.to_string(),
            action: action.to_string(),
        })
    }
}
