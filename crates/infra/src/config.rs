//! Process configuration loaded from the environment.
//!
//! Every variable is enumerated explicitly in [`Config::from_lookup`]. The
//! loaded value is immutable and shared by `Arc` after startup.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use warden_auth::{DEFAULT_BCRYPT_COST, DEFAULT_LOCKOUT_THRESHOLD, TokenConfigError, TokenSettings};
use warden_observability::LogFormat;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_TOKEN_TIMEOUT_SECS: i64 = 3_600;
pub const DEFAULT_TOKEN_MAX_REFRESH_SECS: i64 = 86_400;
pub const DEFAULT_COOKIE_NAME: &str = "auth_token";
pub const DEFAULT_SUPER_ADMIN_ROLE: &str = "super_admin";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Public routes admitted without a token unless overridden.
pub const DEFAULT_SKIP_PATHS: &[&str] = &[
    "POST:/api/v1/identity/auth/login",
    "POST:/api/v1/identity/auth/refresh",
    "/health",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error(transparent)]
    Token(#[from] TokenConfigError),
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.into(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub request_timeout: Duration,
    /// Expose internal error detail in 500 envelopes.
    pub detailed_errors: bool,
    /// `None` allows any origin.
    pub cors_allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
    /// Omit the attribute and let the browser decide.
    Default,
}

impl SameSite {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lax" => Some(SameSite::Lax),
            "strict" => Some(SameSite::Strict),
            "none" => Some(SameSite::None),
            "default" => Some(SameSite::Default),
            _ => None,
        }
    }

    /// Attribute value, `None` for [`SameSite::Default`].
    pub fn attribute(&self) -> Option<&'static str> {
        match self {
            SameSite::Lax => Some("Lax"),
            SameSite::Strict => Some("Strict"),
            SameSite::None => Some("None"),
            SameSite::Default => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    pub enabled: bool,
    pub name: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    pub domain: Option<String>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: DEFAULT_COOKIE_NAME.to_string(),
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
            domain: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub skip_paths: Vec<String>,
    pub lockout_threshold: u32,
    pub bcrypt_cost: u32,
    pub super_admin_roles: Vec<String>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AuthConfig {
    /// The role created for the bootstrap admin.
    pub fn primary_super_admin_role(&self) -> &str {
        self.super_admin_roles
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_SUPER_ADMIN_ROLE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub persistent: bool,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub redis_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub log_format: LogFormat,
    pub server: ServerConfig,
    pub token: TokenSettings,
    pub cookie: CookieConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(var, format!("'{other}' is not a boolean"))),
    }
}

fn parse_num<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(var, format!("'{value}' is not a number")))
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = match get("WARDEN_ENV") {
            Some(v) => Environment::parse(&v).ok_or_else(|| invalid("WARDEN_ENV", v))?,
            None => Environment::default(),
        };
        let log_format = match get("LOG_FORMAT") {
            Some(v) => LogFormat::parse(&v).ok_or_else(|| invalid("LOG_FORMAT", v))?,
            None => LogFormat::default(),
        };

        // server
        let listen_addr = get("WARDEN_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| invalid("WARDEN_LISTEN_ADDR", e.to_string()))?;
        let timeout_ms: u64 = match get("WARDEN_REQUEST_TIMEOUT_MS") {
            Some(v) => parse_num("WARDEN_REQUEST_TIMEOUT_MS", &v)?,
            None => DEFAULT_REQUEST_TIMEOUT_MS,
        };
        if timeout_ms == 0 {
            return Err(invalid("WARDEN_REQUEST_TIMEOUT_MS", "must be positive"));
        }
        let detailed_errors = match get("WARDEN_DETAILED_ERRORS") {
            Some(v) => parse_bool("WARDEN_DETAILED_ERRORS", &v)?,
            None => false,
        };
        let cors_allowed_origins = match get("WARDEN_CORS_ALLOWED_ORIGINS") {
            Some(v) => {
                let origins = comma_list(&v);
                if origins.is_empty() || origins.iter().any(|o| o == "*") {
                    None
                } else {
                    Some(origins)
                }
            }
            None => None,
        };
        let server = ServerConfig {
            listen_addr,
            request_timeout: Duration::from_millis(timeout_ms),
            detailed_errors,
            cors_allowed_origins,
        };

        // token
        let signing_key = get("WARDEN_SIGNING_KEY").ok_or(ConfigError::Missing("WARDEN_SIGNING_KEY"))?;
        let timeout_secs: i64 = match get("WARDEN_TOKEN_TIMEOUT_SECS") {
            Some(v) => parse_num("WARDEN_TOKEN_TIMEOUT_SECS", &v)?,
            None => DEFAULT_TOKEN_TIMEOUT_SECS,
        };
        let max_refresh_secs: i64 = match get("WARDEN_TOKEN_MAX_REFRESH_SECS") {
            Some(v) => parse_num("WARDEN_TOKEN_MAX_REFRESH_SECS", &v)?,
            None => DEFAULT_TOKEN_MAX_REFRESH_SECS,
        };
        let token = TokenSettings {
            signing_key,
            timeout: chrono::Duration::seconds(timeout_secs),
            max_refresh: chrono::Duration::seconds(max_refresh_secs),
        };
        token.validate()?;

        // cookie
        let defaults = CookieConfig::default();
        let cookie = CookieConfig {
            enabled: match get("WARDEN_COOKIE_ENABLED") {
                Some(v) => parse_bool("WARDEN_COOKIE_ENABLED", &v)?,
                None => defaults.enabled,
            },
            name: get("WARDEN_COOKIE_NAME").unwrap_or(defaults.name),
            secure: match get("WARDEN_COOKIE_SECURE") {
                Some(v) => parse_bool("WARDEN_COOKIE_SECURE", &v)?,
                None => defaults.secure,
            },
            http_only: match get("WARDEN_COOKIE_HTTP_ONLY") {
                Some(v) => parse_bool("WARDEN_COOKIE_HTTP_ONLY", &v)?,
                None => defaults.http_only,
            },
            same_site: match get("WARDEN_COOKIE_SAME_SITE") {
                Some(v) => SameSite::parse(&v).ok_or_else(|| {
                    invalid("WARDEN_COOKIE_SAME_SITE", "expected Lax, Strict, None or Default")
                })?,
                None => defaults.same_site,
            },
            domain: get("WARDEN_COOKIE_DOMAIN"),
        };
        if environment.is_production() && !cookie.http_only {
            return Err(invalid(
                "WARDEN_COOKIE_HTTP_ONLY",
                "must be true in production",
            ));
        }

        // auth
        let lockout_threshold: u32 = match get("WARDEN_LOCKOUT_THRESHOLD") {
            Some(v) => parse_num("WARDEN_LOCKOUT_THRESHOLD", &v)?,
            None => DEFAULT_LOCKOUT_THRESHOLD,
        };
        if lockout_threshold < 1 {
            return Err(invalid("WARDEN_LOCKOUT_THRESHOLD", "must be at least 1"));
        }
        let bcrypt_cost: u32 = match get("WARDEN_BCRYPT_COST") {
            Some(v) => parse_num("WARDEN_BCRYPT_COST", &v)?,
            None => DEFAULT_BCRYPT_COST,
        };
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(invalid("WARDEN_BCRYPT_COST", "must be within 4..=31"));
        }
        let skip_paths = match get("WARDEN_SKIP_PATHS") {
            Some(v) => comma_list(&v),
            None => DEFAULT_SKIP_PATHS.iter().map(|s| s.to_string()).collect(),
        };
        let super_admin_roles = match get("WARDEN_SUPER_ADMIN_ROLES") {
            Some(v) => comma_list(&v),
            None => vec![DEFAULT_SUPER_ADMIN_ROLE.to_string()],
        };
        let bootstrap_admin = match (
            get("WARDEN_BOOTSTRAP_ADMIN_USERNAME"),
            get("WARDEN_BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(BootstrapAdmin { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("WARDEN_BOOTSTRAP_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("WARDEN_BOOTSTRAP_ADMIN_USERNAME")),
        };
        let auth = AuthConfig {
            skip_paths,
            lockout_threshold,
            bcrypt_cost,
            super_admin_roles,
            bootstrap_admin,
        };

        // storage
        let persistent = match get("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
            None => false,
        };
        let database_url = get("DATABASE_URL");
        if persistent && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        let db_max_connections: u32 = match get("WARDEN_DB_MAX_CONNECTIONS") {
            Some(v) => parse_num("WARDEN_DB_MAX_CONNECTIONS", &v)?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };
        let storage = StorageConfig {
            persistent,
            database_url,
            db_max_connections: db_max_connections.max(1),
            redis_url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
        };

        Ok(Self {
            environment,
            log_format,
            server,
            token,
            cookie,
            auth,
            storage,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    const KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let cfg = load(&[("WARDEN_SIGNING_KEY", KEY)]).unwrap();
        assert_eq!(cfg.server.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
        assert_eq!(cfg.server.request_timeout, Duration::from_millis(15_000));
        assert_eq!(cfg.server.cors_allowed_origins, None);
        assert_eq!(cfg.token.timeout, chrono::Duration::seconds(3_600));
        assert_eq!(cfg.token.max_refresh, chrono::Duration::seconds(86_400));
        assert!(!cfg.cookie.enabled);
        assert!(cfg.cookie.http_only);
        assert_eq!(cfg.cookie.name, "auth_token");
        assert_eq!(cfg.auth.lockout_threshold, 5);
        assert_eq!(cfg.auth.bcrypt_cost, 12);
        assert_eq!(cfg.auth.super_admin_roles, vec!["super_admin".to_string()]);
        assert_eq!(cfg.auth.skip_paths.len(), 3);
        assert!(cfg.auth.bootstrap_admin.is_none());
        assert!(!cfg.storage.persistent);
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn signing_key_is_required_and_must_be_base64() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("WARDEN_SIGNING_KEY"));
        assert!(matches!(
            load(&[("WARDEN_SIGNING_KEY", "not base64!!")]).unwrap_err(),
            ConfigError::Token(TokenConfigError::KeyNotBase64(_))
        ));
    }

    #[test]
    fn refresh_window_must_cover_timeout() {
        let err = load(&[
            ("WARDEN_SIGNING_KEY", KEY),
            ("WARDEN_TOKEN_TIMEOUT_SECS", "600"),
            ("WARDEN_TOKEN_MAX_REFRESH_SECS", "60"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Token(TokenConfigError::RefreshShorterThanTimeout { .. })
        ));
    }

    #[test]
    fn production_requires_http_only_cookie() {
        let err = load(&[
            ("WARDEN_SIGNING_KEY", KEY),
            ("WARDEN_ENV", "production"),
            ("WARDEN_COOKIE_HTTP_ONLY", "false"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "WARDEN_COOKIE_HTTP_ONLY", .. }));

        let ok = load(&[
            ("WARDEN_SIGNING_KEY", KEY),
            ("WARDEN_ENV", "development"),
            ("WARDEN_COOKIE_HTTP_ONLY", "false"),
        ]);
        assert!(ok.is_ok());
    }

    #[test]
    fn same_site_accepts_known_values_only() {
        let cfg = load(&[("WARDEN_SIGNING_KEY", KEY), ("WARDEN_COOKIE_SAME_SITE", "strict")]).unwrap();
        assert_eq!(cfg.cookie.same_site, SameSite::Strict);
        assert_eq!(SameSite::Default.attribute(), None);

        let err = load(&[("WARDEN_SIGNING_KEY", KEY), ("WARDEN_COOKIE_SAME_SITE", "sometimes")]);
        assert!(err.is_err());
    }

    #[test]
    fn bounds_on_lockout_and_bcrypt_cost() {
        assert!(load(&[("WARDEN_SIGNING_KEY", KEY), ("WARDEN_LOCKOUT_THRESHOLD", "0")]).is_err());
        assert!(load(&[("WARDEN_SIGNING_KEY", KEY), ("WARDEN_BCRYPT_COST", "3")]).is_err());
        assert!(load(&[("WARDEN_SIGNING_KEY", KEY), ("WARDEN_BCRYPT_COST", "32")]).is_err());
        assert!(load(&[("WARDEN_SIGNING_KEY", KEY), ("WARDEN_BCRYPT_COST", "4")]).is_ok());
    }

    #[test]
    fn lists_are_comma_separated_and_star_means_any_origin() {
        let cfg = load(&[
            ("WARDEN_SIGNING_KEY", KEY),
            ("WARDEN_CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("WARDEN_SUPER_ADMIN_ROLES", "root, admin"),
            ("WARDEN_SKIP_PATHS", "/health,/public/*"),
        ])
        .unwrap();
        assert_eq!(
            cfg.server.cors_allowed_origins,
            Some(vec!["https://a.example".to_string(), "https://b.example".to_string()])
        );
        assert_eq!(cfg.auth.primary_super_admin_role(), "root");
        assert_eq!(cfg.auth.skip_paths, vec!["/health".to_string(), "/public/*".to_string()]);

        let any = load(&[("WARDEN_SIGNING_KEY", KEY), ("WARDEN_CORS_ALLOWED_ORIGINS", "*")]).unwrap();
        assert_eq!(any.server.cors_allowed_origins, None);
    }

    #[test]
    fn persistent_mode_needs_database_url() {
        let err = load(&[("WARDEN_SIGNING_KEY", KEY), ("USE_PERSISTENT_STORES", "true")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn bootstrap_admin_needs_both_halves() {
        let cfg = load(&[
            ("WARDEN_SIGNING_KEY", KEY),
            ("WARDEN_BOOTSTRAP_ADMIN_USERNAME", "admin"),
            ("WARDEN_BOOTSTRAP_ADMIN_PASSWORD", "Admin1234"),
        ])
        .unwrap();
        assert_eq!(cfg.auth.bootstrap_admin.unwrap().username, "admin");

        let err = load(&[("WARDEN_SIGNING_KEY", KEY), ("WARDEN_BOOTSTRAP_ADMIN_USERNAME", "admin")]);
        assert!(err.is_err());
    }
}
