use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info_span};

use warden_auth::{
    Authenticator, CredentialStore, PasswordHasher, PolicyEvaluator, PolicyStore, RoleDefinition,
    TokenCache, TokenConfigError, TokenService, TokenSettings, UserProfile,
};
use warden_core::{ErrorCode, RoleId, ServiceResult, UserId};
use warden_observability::RpcMetadata;

/// Construction parameters of the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySettings {
    pub token: TokenSettings,
    pub lockout_threshold: u32,
    pub bcrypt_cost: u32,
    /// Role names that grant unconditional access.
    pub super_admin_roles: Vec<String>,
}

/// The identity service: authentication, administration and authorization
/// over a credential store, a policy store and a token cache.
pub struct IdentityService {
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) policies: Arc<dyn PolicyStore>,
    pub(crate) authenticator: Authenticator,
    pub(crate) tokens: TokenService,
    pub(crate) super_admin_roles: Vec<String>,
    /// Timestamp of the last menu version label handed out.
    pub(crate) menu_clock: Mutex<Option<DateTime<Utc>>>,
}

impl core::fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityService")
            .field("authenticator", &self.authenticator)
            .field("tokens", &self.tokens)
            .field("super_admin_roles", &self.super_admin_roles)
            .finish_non_exhaustive()
    }
}

impl IdentityService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        policies: Arc<dyn PolicyStore>,
        cache: Arc<dyn TokenCache>,
        settings: &IdentitySettings,
    ) -> Result<Self, TokenConfigError> {
        let tokens = TokenService::new(&settings.token, cache)?;
        let evaluator = PolicyEvaluator::new(policies.clone(), settings.super_admin_roles.iter().cloned());
        let authenticator = Authenticator::new(
            credentials.clone(),
            evaluator,
            PasswordHasher::new(settings.bcrypt_cost),
            settings.lockout_threshold,
        );
        Ok(Self {
            credentials,
            policies,
            authenticator,
            tokens,
            super_admin_roles: settings.super_admin_roles.clone(),
            menu_clock: Mutex::new(None),
        })
    }

    /// Token service shared with the gateway's auth filter.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub(crate) async fn load_user(&self, user_id: UserId) -> ServiceResult<UserProfile> {
        self.credentials
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| ErrorCode::UserNotFound.into())
    }

    pub(crate) async fn load_role(&self, role_id: RoleId) -> ServiceResult<RoleDefinition> {
        self.policies
            .get_role(role_id)
            .await?
            .ok_or_else(|| ErrorCode::RoleNotFound.into())
    }
}

/// Run one service call inside a span carrying the caller's trace ids.
///
/// Failures are logged once here: internal ones at ERROR, business outcomes at
/// DEBUG.
pub(crate) async fn traced<T, F>(md: &RpcMetadata, op: &'static str, call: F) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>>,
{
    let ctx = md.extract();
    let span = info_span!("identity", op, request_id = %ctx.request_id, trace_id = %ctx.trace_id);
    let result = call.instrument(span.clone()).await;
    if let Err(err) = &result {
        let _entered = span.enter();
        match err.code() {
            ErrorCode::Internal | ErrorCode::ServiceDown => {
                error!(code = %err.code(), message = err.message(), "identity call failed");
            }
            code => debug!(code = %code, message = err.message(), "identity call rejected"),
        }
    }
    result
}
