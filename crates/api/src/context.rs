use warden_auth::IdentityClaims;
use warden_observability::{RpcMetadata, TraceContext};

/// Trace identifiers of the current request.
///
/// Inserted by the trace middleware before anything else runs, so every
/// handler can rely on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    trace: TraceContext,
}

impl RequestContext {
    pub fn new(trace: TraceContext) -> Self {
        Self { trace }
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn request_id(&self) -> &str {
        &self.trace.request_id
    }

    /// Outbound metadata for identity service calls.
    pub fn metadata(&self) -> RpcMetadata {
        RpcMetadata::from_context(&self.trace)
    }
}

/// Authenticated caller (verified, unrevoked token + its claims).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    token: String,
    claims: IdentityClaims,
}

impl AuthContext {
    pub fn new(token: String, claims: IdentityClaims) -> Self {
        Self { token, claims }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }
}
