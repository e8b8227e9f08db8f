//! Postgres-backed credential store.
//!
//! Every lookup filters `deleted_at IS NULL`. Optimistic concurrency on
//! profiles uses a `WHERE version = $expected` guard; a zero-row update is
//! resolved into `UserNotFound` or `VersionConflict` by re-reading the row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use warden_auth::{CredentialStore, Page, StoreError, StoreResult, UserMembership, UserProfile, UserStatus};
use warden_core::time::{from_millis, to_millis};
use warden_core::{DepartmentId, MembershipId, OrganizationId, UserId};

use crate::db::map_sqlx_error;

const USER_COLUMNS: &str = "id, username, password_hash, email, phone, status, login_attempts, \
    must_change_password, account_expires_at, last_login_at, is_system_user, version, \
    created_at, updated_at, deleted_at";

const MEMBERSHIP_COLUMNS: &str =
    "id, user_id, organization_id, department_id, is_primary, created_at, deleted_at";

fn user_from_row(row: &PgRow) -> StoreResult<UserProfile> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_user", "user", e);
    let status: String = row.try_get("status").map_err(decode)?;
    Ok(UserProfile {
        id: UserId::from_uuid(row.try_get("id").map_err(decode)?),
        username: row.try_get("username").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        phone: row.try_get("phone").map_err(decode)?,
        status: UserStatus::parse(&status)
            .ok_or_else(|| StoreError::Backend(format!("unknown user status '{status}'")))?,
        login_attempts: row.try_get::<i32, _>("login_attempts").map_err(decode)?.max(0) as u32,
        must_change_password: row.try_get("must_change_password").map_err(decode)?,
        account_expires_at: row
            .try_get::<Option<i64>, _>("account_expires_at")
            .map_err(decode)?
            .map(from_millis),
        last_login_at: row
            .try_get::<Option<i64>, _>("last_login_at")
            .map_err(decode)?
            .map(from_millis),
        is_system_user: row.try_get("is_system_user").map_err(decode)?,
        version: row.try_get::<i64, _>("version").map_err(decode)?.max(0) as u64,
        created_at: from_millis(row.try_get("created_at").map_err(decode)?),
        updated_at: from_millis(row.try_get("updated_at").map_err(decode)?),
        deleted_at: row
            .try_get::<Option<i64>, _>("deleted_at")
            .map_err(decode)?
            .map(from_millis),
    })
}

fn membership_from_row(row: &PgRow) -> StoreResult<UserMembership> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_membership", "membership", e);
    Ok(UserMembership {
        id: MembershipId::from_uuid(row.try_get("id").map_err(decode)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode)?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id").map_err(decode)?),
        department_id: row
            .try_get::<Option<Uuid>, _>("department_id")
            .map_err(decode)?
            .map(DepartmentId::from_uuid),
        is_primary: row.try_get("is_primary").map_err(decode)?,
        created_at: from_millis(row.try_get("created_at").map_err(decode)?),
        deleted_at: row
            .try_get::<Option<i64>, _>("deleted_at")
            .map_err(decode)?
            .map(from_millis),
    })
}

/// Postgres credential store. `Send + Sync`; all access goes through the pool.
#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn current_version(&self, user_id: UserId) -> StoreResult<Option<u64>> {
        let row = sqlx::query(
            r#"SELECT version FROM user_profiles WHERE id = $1 AND deleted_at IS NULL"#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("current_version", "user", e))?;
        row.map(|r| {
            r.try_get::<i64, _>("version")
                .map(|v| v.max(0) as u64)
                .map_err(|e| map_sqlx_error("current_version", "user", e))
        })
        .transpose()
    }

    /// Run a single-row update and map "no row" to `UserNotFound`.
    async fn touch(&self, operation: &str, query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>) -> StoreResult<()> {
        let result = query
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, "user", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UserNotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self), err)]
    async fn get_by_username(&self, username: &str) -> StoreResult<Option<UserProfile>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM user_profiles WHERE username = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_by_username", "user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn get_by_id(&self, user_id: UserId) -> StoreResult<Option<UserProfile>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM user_profiles WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_by_id", "user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.id, username = %profile.username), err)]
    async fn create_user(&self, profile: UserProfile) -> StoreResult<UserProfile> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (
                id, username, password_hash, email, phone, status, login_attempts,
                must_change_password, account_expires_at, last_login_at, is_system_user,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(profile.id.as_uuid())
        .bind(&profile.username)
        .bind(&profile.password_hash)
        .bind(&profile.email)
        .bind(&profile.phone)
        .bind(profile.status.as_str())
        .bind(profile.login_attempts as i32)
        .bind(profile.must_change_password)
        .bind(profile.account_expires_at.map(to_millis))
        .bind(profile.last_login_at.map(to_millis))
        .bind(profile.is_system_user)
        .bind(profile.version as i64)
        .bind(to_millis(profile.created_at))
        .bind(to_millis(profile.updated_at))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", &format!("user '{}'", profile.username), e))?;
        Ok(profile)
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.id), err)]
    async fn update_user(&self, profile: &UserProfile, expected_version: u64) -> StoreResult<UserProfile> {
        let sql = format!(
            r#"
            UPDATE user_profiles
            SET username = $3, email = $4, phone = $5, status = $6, account_expires_at = $7,
                is_system_user = $8, updated_at = $9, version = version + 1
            WHERE id = $1 AND version = $2 AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(profile.id.as_uuid())
            .bind(expected_version as i64)
            .bind(&profile.username)
            .bind(&profile.email)
            .bind(&profile.phone)
            .bind(profile.status.as_str())
            .bind(profile.account_expires_at.map(to_millis))
            .bind(profile.is_system_user)
            .bind(to_millis(profile.updated_at))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_user", &format!("user '{}'", profile.username), e))?;

        match row {
            Some(row) => user_from_row(&row),
            None => match self.current_version(profile.id).await? {
                None => Err(StoreError::UserNotFound),
                Some(actual) => Err(StoreError::VersionConflict {
                    expected: expected_version,
                    actual,
                }),
            },
        }
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self, page: Page) -> StoreResult<(Vec<UserProfile>, usize)> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM user_profiles WHERE deleted_at IS NULL \
             ORDER BY created_at ASC, username ASC OFFSET $1 LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(page.offset as i64)
            .bind(page.limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", "user", e))?;
        let users = rows.iter().map(user_from_row).collect::<StoreResult<Vec<_>>>()?;

        let total: i64 = sqlx::query(r#"SELECT COUNT(*) AS total FROM user_profiles WHERE deleted_at IS NULL"#)
            .fetch_one(&*self.pool)
            .await
            .and_then(|r| r.try_get("total"))
            .map_err(|e| map_sqlx_error("count_users", "user", e))?;

        Ok((users, total.max(0) as usize))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn soft_delete_user(&self, user_id: UserId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", "user", e))?;

        let result = sqlx::query(
            r#"UPDATE user_profiles SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL"#,
        )
        .bind(user_id.as_uuid())
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("soft_delete_user", "user", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UserNotFound);
        }

        sqlx::query(r#"UPDATE user_memberships SET deleted_at = $2 WHERE user_id = $1 AND deleted_at IS NULL"#)
            .bind(user_id.as_uuid())
            .bind(to_millis(now))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("soft_delete_memberships", "membership", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", "user", e))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn increment_login_attempts(&self, user_id: UserId) -> StoreResult<u32> {
        let row = sqlx::query(
            r#"
            UPDATE user_profiles SET login_attempts = login_attempts + 1
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING login_attempts
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increment_login_attempts", "user", e))?
        .ok_or(StoreError::UserNotFound)?;
        let attempts: i32 = row
            .try_get("login_attempts")
            .map_err(|e| map_sqlx_error("increment_login_attempts", "user", e))?;
        Ok(attempts.max(0) as u32)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn reset_login_attempts(&self, user_id: UserId, last_login_at: Option<DateTime<Utc>>) -> StoreResult<()> {
        self.touch(
            "reset_login_attempts",
            sqlx::query(
                r#"
                UPDATE user_profiles
                SET login_attempts = 0, last_login_at = COALESCE($2, last_login_at)
                WHERE id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(*user_id.as_uuid())
            .bind(last_login_at.map(to_millis)),
        )
        .await
    }

    #[instrument(skip(self), fields(user_id = %user_id, status = %status), err)]
    async fn set_status(&self, user_id: UserId, status: UserStatus) -> StoreResult<()> {
        self.touch(
            "set_status",
            sqlx::query(r#"UPDATE user_profiles SET status = $2 WHERE id = $1 AND deleted_at IS NULL"#)
                .bind(*user_id.as_uuid())
                .bind(status.as_str()),
        )
        .await
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn set_must_change_password(&self, user_id: UserId, must_change: bool) -> StoreResult<()> {
        self.touch(
            "set_must_change_password",
            sqlx::query(
                r#"UPDATE user_profiles SET must_change_password = $2 WHERE id = $1 AND deleted_at IS NULL"#,
            )
            .bind(*user_id.as_uuid())
            .bind(must_change),
        )
        .await
    }

    #[instrument(skip(self, password_hash), fields(user_id = %user_id), err)]
    async fn update_password_hash(&self, user_id: UserId, password_hash: &str, must_change: bool) -> StoreResult<()> {
        self.touch(
            "update_password_hash",
            sqlx::query(
                r#"
                UPDATE user_profiles SET password_hash = $2, must_change_password = $3
                WHERE id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(*user_id.as_uuid())
            .bind(password_hash.to_string())
            .bind(must_change),
        )
        .await
    }

    #[instrument(skip(self, membership), fields(user_id = %membership.user_id, primary = membership.is_primary), err)]
    async fn add_membership(&self, membership: UserMembership) -> StoreResult<UserMembership> {
        if self.current_version(membership.user_id).await?.is_none() {
            return Err(StoreError::UserNotFound);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", "membership", e))?;

        let duplicate = sqlx::query(
            r#"
            SELECT 1 FROM user_memberships
            WHERE user_id = $1 AND organization_id = $2
              AND department_id IS NOT DISTINCT FROM $3 AND deleted_at IS NULL
            "#,
        )
        .bind(membership.user_id.as_uuid())
        .bind(membership.organization_id.as_uuid())
        .bind(membership.department_id.map(|d| *d.as_uuid()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("add_membership", "membership", e))?;
        if duplicate.is_some() {
            return Err(StoreError::AlreadyExists("membership".to_string()));
        }

        if membership.is_primary {
            sqlx::query(
                r#"UPDATE user_memberships SET is_primary = FALSE WHERE user_id = $1 AND deleted_at IS NULL"#,
            )
            .bind(membership.user_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("demote_primary", "membership", e))?;
        }

        sqlx::query(
            r#"
            INSERT INTO user_memberships (id, user_id, organization_id, department_id, is_primary, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(membership.id.as_uuid())
        .bind(membership.user_id.as_uuid())
        .bind(membership.organization_id.as_uuid())
        .bind(membership.department_id.map(|d| *d.as_uuid()))
        .bind(membership.is_primary)
        .bind(to_millis(membership.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("add_membership", "membership", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", "membership", e))?;
        Ok(membership)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list_memberships(&self, user_id: UserId) -> StoreResult<Vec<UserMembership>> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_memberships \
             WHERE user_id = $1 AND deleted_at IS NULL ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_memberships", "membership", e))?;
        rows.iter().map(membership_from_row).collect()
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn primary_membership(&self, user_id: UserId) -> StoreResult<Option<UserMembership>> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_memberships \
             WHERE user_id = $1 AND is_primary AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("primary_membership", "membership", e))?;
        row.as_ref().map(membership_from_row).transpose()
    }
}
