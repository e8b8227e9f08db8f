//! Backend wiring: stores, token cache and the identity service.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use warden_auth::{CredentialStore, PolicyStore, TokenCache};
use warden_identity::{IdentityService, IdentitySettings};
use warden_infra::{Config, InMemoryCredentialStore, InMemoryPolicyStore, InMemoryTokenCache};

#[cfg(feature = "redis")]
use warden_infra::{PostgresCredentialStore, PostgresPolicyStore, RedisTokenCache, db};

/// Which storage the process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    InMemory,
    Persistent,
}

/// Everything handlers need, shared by `Arc`.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub identity: Arc<IdentityService>,
    pub config: Arc<Config>,
    pub backend: Backend,
}

fn settings(config: &Config) -> IdentitySettings {
    IdentitySettings {
        token: config.token.clone(),
        lockout_threshold: config.auth.lockout_threshold,
        bcrypt_cost: config.auth.bcrypt_cost,
        super_admin_roles: config.auth.super_admin_roles.clone(),
    }
}

fn assemble(
    config: Arc<Config>,
    credentials: Arc<dyn CredentialStore>,
    policies: Arc<dyn PolicyStore>,
    cache: Arc<dyn TokenCache>,
    backend: Backend,
) -> anyhow::Result<AppServices> {
    let identity = IdentityService::new(credentials, policies, cache, &settings(&config))
        .context("invalid token settings")?;
    Ok(AppServices {
        identity: Arc::new(identity),
        config,
        backend,
    })
}

/// Build services for `config`, choosing backends by `USE_PERSISTENT_STORES`.
pub async fn build_services(config: Arc<Config>) -> anyhow::Result<AppServices> {
    if config.storage.persistent {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services(config).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
            return build_in_memory_services(config);
        }
    }

    build_in_memory_services(config)
}

pub fn build_in_memory_services(config: Arc<Config>) -> anyhow::Result<AppServices> {
    tracing::info!("using in-memory stores");
    assemble(
        config,
        Arc::new(InMemoryCredentialStore::new()),
        Arc::new(InMemoryPolicyStore::new()),
        Arc::new(InMemoryTokenCache::new()),
        Backend::InMemory,
    )
}

#[cfg(feature = "redis")]
async fn build_persistent_services(config: Arc<Config>) -> anyhow::Result<AppServices> {
    let database_url = config
        .storage
        .database_url
        .clone()
        .context("DATABASE_URL is required for persistent stores")?;
    let pool = db::connect(&database_url, config.storage.db_max_connections)
        .await
        .context("failed to connect to Postgres")?;
    db::migrate(&pool).await.context("failed to apply identity schema")?;
    let cache = RedisTokenCache::connect(&config.storage.redis_url)
        .await
        .context("failed to connect to Redis")?;
    tracing::info!("using Postgres stores and Redis token cache");

    assemble(
        config,
        Arc::new(PostgresCredentialStore::new(pool.clone())),
        Arc::new(PostgresPolicyStore::new(pool)),
        Arc::new(cache),
        Backend::Persistent,
    )
}

/// Create the configured bootstrap administrator, if any.
pub async fn bootstrap(services: &AppServices) -> anyhow::Result<()> {
    let Some(admin) = &services.config.auth.bootstrap_admin else {
        return Ok(());
    };
    services
        .identity
        .bootstrap_admin(&admin.username, &admin.password)
        .await
        .context("failed to bootstrap administrator")?;
    Ok(())
}
