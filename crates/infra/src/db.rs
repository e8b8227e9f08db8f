//! Postgres pool construction and schema bootstrap.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};

use warden_auth::StoreError;

const SCHEMA: &str = include_str!("../migrations/0001_identity.sql");

/// Open a pool against `database_url`.
#[instrument(skip(database_url), err)]
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Create the identity tables if missing. Idempotent.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("identity schema ready");
    Ok(())
}

/// Translate a driver error into a store error.
///
/// | Postgres code | StoreError |
/// |---|---|
/// | `23505` unique violation | `AlreadyExists(what)` |
/// | `23503` foreign key violation | `NotFound(what)` |
/// | anything else | `Backend` |
pub(crate) fn map_sqlx_error(operation: &str, what: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => StoreError::AlreadyExists(what.to_string()),
            Some("23503") => StoreError::NotFound(what.to_string()),
            _ => StoreError::Backend(format!("database error in {operation}: {}", db_err.message())),
        },
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

/// Whether a driver error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_become_backend_errors() {
        let err = map_sqlx_error("load", "user", sqlx::Error::PoolClosed);
        assert_eq!(err, StoreError::Backend("connection pool closed in load".into()));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn schema_declares_every_table() {
        for table in [
            "user_profiles",
            "user_memberships",
            "role_definitions",
            "user_role_assignments",
            "menus",
            "menu_versions",
            "policy_rules",
        ] {
            assert!(SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")), "{table}");
        }
    }
}
