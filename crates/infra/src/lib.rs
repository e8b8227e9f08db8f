//! Infrastructure layer: storage backends, token cache backends and config.

pub mod config;
pub mod credential_store;
pub mod db;
pub mod policy_store;
pub mod token_cache;


pub use config::{Config, ConfigError};
pub use credential_store::{InMemoryCredentialStore, PostgresCredentialStore};
pub use policy_store::{InMemoryPolicyStore, PostgresPolicyStore};
pub use token_cache::InMemoryTokenCache;
#[cfg(feature = "redis")]
pub use token_cache::RedisTokenCache;
