//! Postgres-backed policy store.
//!
//! Mirrored rule writes (`p` for role permissions, `g` for assignments, `p2`
//! for menu grants) run in the same transaction as the row they mirror.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use warden_auth::{
    MenuGrant, MenuNode, MenuVersion, Permission, PolicyRule, PolicyStore, PolicyType, RoleDefinition,
    RoleStatus, StoreError, StoreResult, UserRoleAssignment,
};
use warden_core::time::{from_millis, to_millis};
use warden_core::{AssignmentId, MenuRowId, RoleId, UserId};

use crate::db::{is_unique_violation, map_sqlx_error};

const ROLE_COLUMNS: &str =
    "id, name, description, status, permissions, is_system_role, created_at, updated_at, deleted_at";

const ASSIGNMENT_COLUMNS: &str =
    "id, user_id, role_id, created_by, updated_by, created_at, updated_at, deleted_at";

const MENU_COLUMNS: &str = "row_id, id, parent_id, name, path, icon, component, sort, version, created_at";

fn role_from_row(row: &PgRow) -> StoreResult<RoleDefinition> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_role", "role", e);
    let status: String = row.try_get("status").map_err(decode)?;
    let Json(permissions): Json<Vec<Permission>> = row.try_get("permissions").map_err(decode)?;
    Ok(RoleDefinition {
        id: RoleId::from_uuid(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        status: RoleStatus::parse(&status)
            .ok_or_else(|| StoreError::Backend(format!("unknown role status '{status}'")))?,
        permissions,
        is_system_role: row.try_get("is_system_role").map_err(decode)?,
        created_at: from_millis(row.try_get("created_at").map_err(decode)?),
        updated_at: from_millis(row.try_get("updated_at").map_err(decode)?),
        deleted_at: row
            .try_get::<Option<i64>, _>("deleted_at")
            .map_err(decode)?
            .map(from_millis),
    })
}

fn assignment_from_row(row: &PgRow) -> StoreResult<UserRoleAssignment> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_assignment", "role assignment", e);
    Ok(UserRoleAssignment {
        id: AssignmentId::from_uuid(row.try_get("id").map_err(decode)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode)?),
        role_id: RoleId::from_uuid(row.try_get("role_id").map_err(decode)?),
        created_by: row
            .try_get::<Option<Uuid>, _>("created_by")
            .map_err(decode)?
            .map(UserId::from_uuid),
        updated_by: row
            .try_get::<Option<Uuid>, _>("updated_by")
            .map_err(decode)?
            .map(UserId::from_uuid),
        created_at: from_millis(row.try_get("created_at").map_err(decode)?),
        updated_at: from_millis(row.try_get("updated_at").map_err(decode)?),
        deleted_at: row
            .try_get::<Option<i64>, _>("deleted_at")
            .map_err(decode)?
            .map(from_millis),
    })
}

fn menu_from_row(row: &PgRow) -> StoreResult<MenuNode> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_menu", "menu", e);
    Ok(MenuNode {
        row_id: MenuRowId::from_uuid(row.try_get("row_id").map_err(decode)?),
        id: row.try_get("id").map_err(decode)?,
        parent_id: row.try_get("parent_id").map_err(decode)?,
        name: row.try_get("name").map_err(decode)?,
        path: row.try_get("path").map_err(decode)?,
        icon: row.try_get("icon").map_err(decode)?,
        component: row.try_get("component").map_err(decode)?,
        sort: row.try_get("sort").map_err(decode)?,
        version: row.try_get("version").map_err(decode)?,
        created_at: from_millis(row.try_get("created_at").map_err(decode)?),
    })
}

fn version_from_row(row: &PgRow) -> StoreResult<MenuVersion> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_menu_version", "menu version", e);
    Ok(MenuVersion {
        version: row.try_get("version").map_err(decode)?,
        node_count: row.try_get::<i32, _>("node_count").map_err(decode)?.max(0) as usize,
        created_at: from_millis(row.try_get("created_at").map_err(decode)?),
    })
}

fn rule_from_row(row: &PgRow) -> StoreResult<PolicyRule> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_rule", "policy rule", e);
    let mut columns = Vec::with_capacity(7);
    for name in ["ptype", "v0", "v1", "v2", "v3", "v4", "v5"] {
        columns.push(row.try_get::<String, _>(name).map_err(decode)?);
    }
    rule_from_columns(&columns)
}

fn rule_from_columns(columns: &[String]) -> StoreResult<PolicyRule> {
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
    PolicyRule::from_columns(&columns)
        .ok_or_else(|| StoreError::Backend(format!("undecodable policy rule {columns:?}")))
}

async fn insert_rule(tx: &mut Transaction<'_, Postgres>, rule: &PolicyRule) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO policy_rules (ptype, v0, v1, v2, v3, v4, v5)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(&rule.ptype)
    .bind(&rule.v0)
    .bind(&rule.v1)
    .bind(&rule.v2)
    .bind(&rule.v3)
    .bind(&rule.v4)
    .bind(&rule.v5)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_rule", "policy rule", e))?;
    Ok(())
}

async fn mirror_permissions(tx: &mut Transaction<'_, Postgres>, role: &RoleDefinition) -> StoreResult<()> {
    sqlx::query(r#"DELETE FROM policy_rules WHERE ptype = $1 AND v0 = $2"#)
        .bind(PolicyType::Permission.as_str())
        .bind(role.id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("purge_permission_rules", "policy rule", e))?;
    for p in &role.permissions {
        insert_rule(tx, &PolicyRule::permission(role.id, &p.resource, &p.action)).await?;
    }
    Ok(())
}

async fn ensure_live_role(tx: &mut Transaction<'_, Postgres>, role_id: RoleId) -> StoreResult<()> {
    sqlx::query(r#"SELECT id FROM role_definitions WHERE id = $1 AND deleted_at IS NULL"#)
        .bind(role_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_role", "role", e))?
        .ok_or(StoreError::RoleNotFound)?;
    Ok(())
}

async fn revoke_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    role_id: RoleId,
    operator: Option<UserId>,
    now: DateTime<Utc>,
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE user_role_assignments
        SET deleted_at = $3, updated_at = $3, updated_by = $4
        WHERE user_id = $1 AND role_id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(user_id.as_uuid())
    .bind(role_id.as_uuid())
    .bind(to_millis(now))
    .bind(operator.map(|o| *o.as_uuid()))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("revoke_role", "role assignment", e))?;
    if result.rows_affected() == 0 {
        return Ok(false);
    }
    sqlx::query(r#"DELETE FROM policy_rules WHERE ptype = $1 AND v0 = $2 AND v1 = $3"#)
        .bind(PolicyType::Grouping.as_str())
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("delete_grouping_rule", "policy rule", e))?;
    Ok(true)
}

async fn assign_in_tx(tx: &mut Transaction<'_, Postgres>, assignment: &UserRoleAssignment) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO user_role_assignments (id, user_id, role_id, created_by, updated_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(assignment.id.as_uuid())
    .bind(assignment.user_id.as_uuid())
    .bind(assignment.role_id.as_uuid())
    .bind(assignment.created_by.map(|o| *o.as_uuid()))
    .bind(assignment.updated_by.map(|o| *o.as_uuid()))
    .bind(to_millis(assignment.created_at))
    .bind(to_millis(assignment.updated_at))
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::AssignmentExists
        } else {
            map_sqlx_error("assign_role", "role assignment", e)
        }
    })?;
    insert_rule(
        tx,
        &PolicyRule::grouping(&assignment.user_id.to_string(), assignment.role_id),
    )
    .await
}

/// Postgres policy store. `Send + Sync`; all access goes through the pool.
#[derive(Debug, Clone)]
pub struct PostgresPolicyStore {
    pool: Arc<PgPool>,
}

impl PostgresPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", "transaction", e))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> StoreResult<()> {
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", "transaction", e))
    }

    async fn live_role_assignments(&self, role_id: RoleId) -> StoreResult<Vec<UserRoleAssignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM user_role_assignments \
             WHERE role_id = $1 AND deleted_at IS NULL ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(role_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_role_assignments", "role assignment", e))?;
        rows.iter().map(assignment_from_row).collect()
    }
}

#[async_trait]
impl PolicyStore for PostgresPolicyStore {
    #[instrument(skip(self, role), fields(role_id = %role.id, name = %role.name), err)]
    async fn create_role(&self, role: RoleDefinition) -> StoreResult<RoleDefinition> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO role_definitions (
                id, name, description, status, permissions, is_system_role, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.status.as_str())
        .bind(Json(&role.permissions))
        .bind(role.is_system_role)
        .bind(to_millis(role.created_at))
        .bind(to_millis(role.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_role", &format!("role '{}'", role.name), e))?;
        mirror_permissions(&mut tx, &role).await?;
        Self::commit(tx).await?;
        Ok(role)
    }

    #[instrument(skip(self), fields(role_id = %role_id), err)]
    async fn get_role(&self, role_id: RoleId) -> StoreResult<Option<RoleDefinition>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM role_definitions WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(role_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", "role", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_role_by_name(&self, name: &str) -> StoreResult<Option<RoleDefinition>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM role_definitions WHERE name = $1 AND deleted_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role_by_name", "role", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self) -> StoreResult<Vec<RoleDefinition>> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM role_definitions WHERE deleted_at IS NULL ORDER BY created_at ASC, name ASC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", "role", e))?;
        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn update_role(&self, role: &RoleDefinition) -> StoreResult<RoleDefinition> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE role_definitions
            SET name = $2, description = $3, status = $4, permissions = $5, updated_at = $6
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.status.as_str())
        .bind(Json(&role.permissions))
        .bind(to_millis(role.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_role", &format!("role '{}'", role.name), e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RoleNotFound);
        }
        mirror_permissions(&mut tx, role).await?;
        Self::commit(tx).await?;
        Ok(role.clone())
    }

    #[instrument(skip(self), fields(role_id = %role_id), err)]
    async fn delete_role(&self, role_id: RoleId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        ensure_live_role(&mut tx, role_id).await?;

        let in_use: i64 = sqlx::query(
            r#"SELECT COUNT(*) AS n FROM user_role_assignments WHERE role_id = $1 AND deleted_at IS NULL"#,
        )
        .bind(role_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .and_then(|r| r.try_get("n"))
        .map_err(|e| map_sqlx_error("count_assignments", "role assignment", e))?;
        if in_use > 0 {
            return Err(StoreError::RoleInUse(in_use as usize));
        }

        sqlx::query(r#"UPDATE role_definitions SET deleted_at = $2, updated_at = $2 WHERE id = $1"#)
            .bind(role_id.as_uuid())
            .bind(to_millis(now))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", "role", e))?;

        sqlx::query(
            r#"
            DELETE FROM policy_rules
            WHERE (ptype IN ($1, $2) AND v0 = $4) OR (ptype = $3 AND v1 = $4)
            "#,
        )
        .bind(PolicyType::Permission.as_str())
        .bind(PolicyType::MenuPermission.as_str())
        .bind(PolicyType::Grouping.as_str())
        .bind(role_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("purge_role_rules", "policy rule", e))?;

        Self::commit(tx).await
    }

    #[instrument(skip(self, assignment), fields(user_id = %assignment.user_id, role_id = %assignment.role_id), err)]
    async fn assign_role(&self, assignment: UserRoleAssignment) -> StoreResult<UserRoleAssignment> {
        let mut tx = self.begin().await?;
        ensure_live_role(&mut tx, assignment.role_id).await?;
        assign_in_tx(&mut tx, &assignment).await?;
        Self::commit(tx).await?;
        Ok(assignment)
    }

    #[instrument(skip(self), fields(user_id = %user_id, role_id = %role_id), err)]
    async fn revoke_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        operator: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        if !revoke_in_tx(&mut tx, user_id, role_id, operator, now).await? {
            return Err(StoreError::NotFound("role assignment".to_string()));
        }
        Self::commit(tx).await
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list_user_assignments(&self, user_id: UserId) -> StoreResult<Vec<UserRoleAssignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM user_role_assignments \
             WHERE user_id = $1 AND deleted_at IS NULL ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_user_assignments", "role assignment", e))?;
        rows.iter().map(assignment_from_row).collect()
    }

    #[instrument(skip(self), fields(role_id = %role_id), err)]
    async fn list_role_assignments(&self, role_id: RoleId) -> StoreResult<Vec<UserRoleAssignment>> {
        self.live_role_assignments(role_id).await
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list_active_role_ids_with_status(
        &self,
        user_id: UserId,
        status: RoleStatus,
    ) -> StoreResult<Vec<RoleId>> {
        let rows = sqlx::query(
            r#"
            SELECT a.role_id
            FROM user_role_assignments a
            JOIN role_definitions r ON r.id = a.role_id
            WHERE a.user_id = $1 AND a.deleted_at IS NULL
              AND r.deleted_at IS NULL AND r.status = $2
            ORDER BY a.created_at ASC, a.id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(status.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_active_role_ids", "role", e))?;
        rows.iter()
            .map(|r| {
                r.try_get::<Uuid, _>("role_id")
                    .map(RoleId::from_uuid)
                    .map_err(|e| map_sqlx_error("list_active_role_ids", "role", e))
            })
            .collect()
    }

    #[instrument(skip(self, user_ids), fields(role_id = %role_id, users = user_ids.len()), err)]
    async fn replace_role_users(
        &self,
        role_id: RoleId,
        user_ids: &[UserId],
        operator: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<UserRoleAssignment>> {
        let mut tx = self.begin().await?;
        ensure_live_role(&mut tx, role_id).await?;

        let current: Vec<UserId> = sqlx::query(
            r#"SELECT user_id FROM user_role_assignments WHERE role_id = $1 AND deleted_at IS NULL"#,
        )
        .bind(role_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("replace_role_users", "role assignment", e))?
        .iter()
        .map(|r| r.try_get::<Uuid, _>("user_id").map(UserId::from_uuid))
        .collect::<Result<_, _>>()
        .map_err(|e| map_sqlx_error("replace_role_users", "role assignment", e))?;

        let wanted: HashSet<UserId> = user_ids.iter().copied().collect();
        for user_id in current.iter().filter(|u| !wanted.contains(u)) {
            revoke_in_tx(&mut tx, *user_id, role_id, operator, now).await?;
        }

        let mut added = HashSet::new();
        for user_id in user_ids {
            if current.contains(user_id) || !added.insert(*user_id) {
                continue;
            }
            assign_in_tx(&mut tx, &UserRoleAssignment::new(*user_id, role_id, operator, now)).await?;
        }

        Self::commit(tx).await?;
        debug!(added = added.len(), "role users replaced");
        self.live_role_assignments(role_id).await
    }

    #[instrument(skip(self, grants), fields(role_id = %role_id, grants = grants.len()), err)]
    async fn configure_role_menus(&self, role_id: RoleId, grants: &[MenuGrant]) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        ensure_live_role(&mut tx, role_id).await?;

        sqlx::query(r#"DELETE FROM policy_rules WHERE ptype = $1 AND v0 = $2"#)
            .bind(PolicyType::MenuPermission.as_str())
            .bind(role_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("purge_menu_rules", "policy rule", e))?;

        for grant in grants {
            insert_rule(&mut tx, &PolicyRule::menu_permission(role_id, &grant.menu_id, grant.level)).await?;
        }
        Self::commit(tx).await
    }

    #[instrument(skip(self), fields(role_id = %role_id), err)]
    async fn menu_grants_for_role(&self, role_id: RoleId) -> StoreResult<Vec<MenuGrant>> {
        let rows = sqlx::query(
            r#"SELECT ptype, v0, v1, v2, v3, v4, v5 FROM policy_rules WHERE ptype = $1 AND v0 = $2 ORDER BY v1"#,
        )
        .bind(PolicyType::MenuPermission.as_str())
        .bind(role_id.to_string())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("menu_grants_for_role", "policy rule", e))?;

        let mut grants = Vec::with_capacity(rows.len());
        for row in &rows {
            let rule = rule_from_row(row)?;
            if let Some((menu_id, level)) = rule.as_menu_permission() {
                grants.push(MenuGrant {
                    menu_id: menu_id.to_string(),
                    level,
                });
            }
        }
        Ok(grants)
    }

    #[instrument(skip(self, nodes), fields(nodes = nodes.len()), err)]
    async fn insert_menu_version(&self, version: &str, nodes: Vec<MenuNode>) -> StoreResult<MenuVersion> {
        let summary = MenuVersion {
            version: version.to_string(),
            node_count: nodes.len(),
            created_at: nodes.first().map(|n| n.created_at).unwrap_or_else(Utc::now),
        };

        let mut tx = self.begin().await?;
        sqlx::query(r#"INSERT INTO menu_versions (version, node_count, created_at) VALUES ($1, $2, $3)"#)
            .bind(&summary.version)
            .bind(i32::try_from(summary.node_count).unwrap_or(i32::MAX))
            .bind(to_millis(summary.created_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_menu_version", &format!("menu version '{version}'"), e))?;

        for node in &nodes {
            sqlx::query(
                r#"
                INSERT INTO menus (row_id, id, parent_id, name, path, icon, component, sort, version, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(node.row_id.as_uuid())
            .bind(&node.id)
            .bind(&node.parent_id)
            .bind(&node.name)
            .bind(&node.path)
            .bind(&node.icon)
            .bind(&node.component)
            .bind(node.sort)
            .bind(version)
            .bind(to_millis(node.created_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_menu", &format!("menu '{}'", node.id), e))?;
        }

        Self::commit(tx).await?;
        Ok(summary)
    }

    #[instrument(skip(self), err)]
    async fn latest_menu_version(&self) -> StoreResult<Option<MenuVersion>> {
        let row = sqlx::query(
            r#"SELECT version, node_count, created_at FROM menu_versions ORDER BY created_at DESC, version DESC LIMIT 1"#,
        )
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_menu_version", "menu version", e))?;
        row.as_ref().map(version_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_menus(&self, version: &str) -> StoreResult<Vec<MenuNode>> {
        let sql = format!(
            "SELECT {MENU_COLUMNS} FROM menus WHERE version = $1 \
             ORDER BY parent_id ASC NULLS FIRST, sort ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(version)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_menus", "menu", e))?;
        rows.iter().map(menu_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_menu_versions(&self) -> StoreResult<Vec<MenuVersion>> {
        let rows = sqlx::query(
            r#"SELECT version, node_count, created_at FROM menu_versions ORDER BY created_at DESC, version DESC"#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_menu_versions", "menu version", e))?;
        rows.iter().map(version_from_row).collect()
    }

    #[instrument(skip(self), fields(ptype = ptype.as_str()), err)]
    async fn list_rules(&self, ptype: PolicyType) -> StoreResult<Vec<PolicyRule>> {
        let rows = sqlx::query(
            r#"SELECT ptype, v0, v1, v2, v3, v4, v5 FROM policy_rules WHERE ptype = $1 ORDER BY v0, v1, v2"#,
        )
        .bind(ptype.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_rules", "policy rule", e))?;
        rows.iter().map(rule_from_row).collect()
    }
}
