use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, Method, Uri, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::debug;

use warden_auth::TokenService;
use warden_core::{ErrorCode, ServiceError};
use warden_infra::config::CookieConfig;

use crate::app::cookie;
use crate::app::dto::TokenQuery;
use crate::app::errors::ApiError;
use crate::context::AuthContext;

/// The only endpoint a password-change-only token may reach.
pub const CHANGE_PASSWORD_PATH: &str = "/api/v1/identity/auth/change-password";

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathPattern {
    Exact(String),
    /// `prefix/*`: the prefix itself or anything below it.
    Prefix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SkipRule {
    method: Option<Method>,
    path: PathPattern,
}

impl SkipRule {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (method, path) = match raw.split_once(':') {
            Some((m, p)) if !m.is_empty() && m.bytes().all(|b| b.is_ascii_alphabetic()) => {
                (Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok(), p)
            }
            _ => (None, raw),
        };
        if path.is_empty() {
            return None;
        }
        let path = match path.strip_suffix("/*") {
            Some(prefix) => PathPattern::Prefix(prefix.to_string()),
            None => PathPattern::Exact(path.to_string()),
        };
        Some(Self { method, path })
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        if self.method.as_ref().is_some_and(|m| m != method) {
            return false;
        }
        match &self.path {
            PathPattern::Exact(p) => p == path,
            PathPattern::Prefix(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

/// Routes admitted without a token.
///
/// Patterns are `path`, `METHOD:path` or `prefix/*` (optionally with a method).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipPaths(Vec<SkipRule>);

impl SkipPaths {
    pub fn parse<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(patterns.into_iter().filter_map(|p| SkipRule::parse(p.as_ref())).collect())
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.0.iter().any(|rule| rule.matches(method, path))
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub tokens: TokenService,
    pub skip: Arc<SkipPaths>,
    pub cookie: CookieConfig,
}

/// Token from the bearer header, then `?token=`, then the session cookie
/// (only when cookie delivery is enabled).
pub fn extract_token(headers: &HeaderMap, uri: &Uri, cookie_cfg: &CookieConfig) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    let query = Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.trim().is_empty());
    if let Some(token) = query {
        return Some(token.trim().to_string());
    }

    if cookie_cfg.enabled {
        return cookie::read(headers, &cookie_cfg.name).map(str::to_string);
    }
    None
}

/// Verify the token, reject revoked ones and put the caller into the request.
pub async fn auth_middleware(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    if state.skip.matches(req.method(), req.uri().path()) {
        return next.run(req).await;
    }

    let Some(token) = extract_token(req.headers(), req.uri(), &state.cookie) else {
        return ApiError::new(ErrorCode::Unauthorized, "authentication token is required").into_response();
    };

    let claims = match state.tokens.authenticate(&token, Utc::now()).await {
        Ok(claims) => claims.identity,
        Err(err) => {
            debug!(error = %err, "token rejected");
            return ApiError::from(ServiceError::from(err)).into_response();
        }
    };

    if claims.is_password_change_only()
        && !(req.method() == Method::POST && req.uri().path() == CHANGE_PASSWORD_PATH)
    {
        return ApiError::from(ErrorCode::MustChangePassword).into_response();
    }

    req.extensions_mut().insert(AuthContext::new(token, claims));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use axum::http::header::COOKIE;

    use super::*;

    fn skip() -> SkipPaths {
        SkipPaths::parse([
            "/health",
            "POST:/api/v1/identity/auth/login",
            "/public/*",
            "get:/docs/*",
        ])
    }

    #[test]
    fn skip_patterns_cover_exact_method_and_prefix_forms() {
        let s = skip();
        assert!(s.matches(&Method::GET, "/health"));
        assert!(!s.matches(&Method::GET, "/health/deep"));

        assert!(s.matches(&Method::POST, "/api/v1/identity/auth/login"));
        assert!(!s.matches(&Method::GET, "/api/v1/identity/auth/login"));

        assert!(s.matches(&Method::DELETE, "/public"));
        assert!(s.matches(&Method::GET, "/public/a/b"));
        assert!(!s.matches(&Method::GET, "/publicity"));

        assert!(s.matches(&Method::GET, "/docs/index"));
        assert!(!s.matches(&Method::POST, "/docs/index"));
    }

    #[test]
    fn token_sources_are_tried_in_order() {
        let uri: Uri = "/x?token=from-query".parse().unwrap();
        let enabled = CookieConfig {
            enabled: true,
            ..CookieConfig::default()
        };

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("auth_token=from-cookie"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_token(&headers, &uri, &enabled).as_deref(), Some("from-header"));

        headers.remove(AUTHORIZATION);
        assert_eq!(extract_token(&headers, &uri, &enabled).as_deref(), Some("from-query"));

        let bare: Uri = "/x".parse().unwrap();
        assert_eq!(extract_token(&headers, &bare, &enabled).as_deref(), Some("from-cookie"));
        assert_eq!(extract_token(&headers, &bare, &CookieConfig::default()), None);
    }

    #[test]
    fn non_bearer_and_blank_headers_are_ignored() {
        let bare: Uri = "/x".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(extract_token(&headers, &bare, &CookieConfig::default()), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer   "));
        assert_eq!(extract_token(&headers, &bare, &CookieConfig::default()), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(
            extract_token(&headers, &bare, &CookieConfig::default()).as_deref(),
            Some("abc")
        );
    }
}
