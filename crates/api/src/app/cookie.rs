//! Token delivery by cookie.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use chrono::Duration;

use warden_infra::config::CookieConfig;

fn render(cfg: &CookieConfig, value: &str, max_age_secs: i64) -> String {
    let mut cookie = format!("{}={}; Path=/; Max-Age={}", cfg.name, value, max_age_secs.max(0));
    if let Some(domain) = &cfg.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if cfg.http_only {
        cookie.push_str("; HttpOnly");
    }
    if cfg.secure {
        cookie.push_str("; Secure");
    }
    if let Some(same_site) = cfg.same_site.attribute() {
        cookie.push_str("; SameSite=");
        cookie.push_str(same_site);
    }
    cookie
}

/// `Set-Cookie` value carrying `token` for `ttl`.
pub fn session_cookie(cfg: &CookieConfig, token: &str, ttl: Duration) -> String {
    render(cfg, token, ttl.num_seconds())
}

/// `Set-Cookie` value that removes the session cookie.
pub fn expired_cookie(cfg: &CookieConfig) -> String {
    render(cfg, "", 0)
}

/// Append `cookie` to the response when delivery is enabled.
pub fn attach(cfg: &CookieConfig, response: &mut Response, cookie: String) {
    if !cfg.enabled {
        return;
    }
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => tracing::warn!(error = %err, "session cookie not representable as a header"),
    }
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn read<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use warden_infra::config::SameSite;

    use super::*;

    fn cfg() -> CookieConfig {
        CookieConfig {
            enabled: true,
            secure: true,
            domain: Some("example.org".into()),
            ..CookieConfig::default()
        }
    }

    #[test]
    fn session_cookie_carries_every_attribute() {
        let cookie = session_cookie(&cfg(), "abc", Duration::seconds(3_600));
        assert_eq!(
            cookie,
            "auth_token=abc; Path=/; Max-Age=3600; Domain=example.org; HttpOnly; Secure; SameSite=Lax"
        );
    }

    #[test]
    fn default_same_site_omits_the_attribute() {
        let cfg = CookieConfig {
            same_site: SameSite::Default,
            ..CookieConfig::default()
        };
        assert!(!expired_cookie(&cfg).contains("SameSite"));
        assert!(expired_cookie(&cfg).contains("Max-Age=0"));
    }

    #[test]
    fn reads_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; auth_token=tok123; lang=en"));
        assert_eq!(read(&headers, "auth_token"), Some("tok123"));
        assert_eq!(read(&headers, "missing"), None);
    }
}
