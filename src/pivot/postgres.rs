//! PostgreSQL-backed pivot store
//!
//! Each replace runs in one transaction: an advisory lock on the key, the
//! delete, then the insert. The advisory lock serializes concurrent syncs for
//! the same key; syncs for different keys never wait on each other.
//!
//! User pivot timestamps come from the application clock so they compare
//! directly with login times recorded by the service.

use crate::error::{StorageError, StorageResult};
use crate::pivot::store::{DirectGrantStore, PivotStore};
use crate::pivot::types::{
    AgentGroupPivot, DirectGrant, GroupId, GroupMetadata, UserGroupPivot, dedupe,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::{debug, instrument};

const SCHEMA: &str = include_str!("../../migrations/0001_rbac_pivot.sql");

/// Pivot store over the `rbac_user_pivot`, `rbac_agent_pivot` and
/// `rbac_direct_grant` tables
#[derive(Clone)]
pub struct PostgresPivotStore {
    pool: Arc<PgPool>,
}

impl PostgresPivotStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::from_sqlx("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the pivot tables if they do not exist
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| StorageError::from_sqlx("migrate", e))?;
        Ok(())
    }

    async fn begin(&self, operation: &str) -> StorageResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| StorageError::from_sqlx(operation, e))
    }
}

/// Serialize writers of one key for the rest of the transaction
async fn lock_key(
    tx: &mut Transaction<'static, Postgres>,
    table: &str,
    key: &str,
    operation: &str,
) -> StorageResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2))")
        .bind(table)
        .bind(key)
        .execute(&mut **tx)
        .await
        .map_err(|e| StorageError::from_sqlx(operation, e))?;
    Ok(())
}

async fn commit(tx: Transaction<'static, Postgres>, operation: &str) -> StorageResult<()> {
    tx.commit()
        .await
        .map_err(|e| StorageError::from_sqlx(operation, e))
}

async fn rollback(tx: Transaction<'static, Postgres>, operation: &str) -> StorageResult<()> {
    tx.rollback()
        .await
        .map_err(|e| StorageError::from_sqlx(operation, e))
}

fn user_from_row(row: &PgRow) -> StorageResult<UserGroupPivot> {
    let corrupt = |e: sqlx::Error| StorageError::Corrupt {
        table: "rbac_user_pivot".to_string(),
        message: e.to_string(),
    };
    Ok(UserGroupPivot {
        email: row.try_get::<String, _>("email").map_err(corrupt)?,
        groups: row.try_get::<Vec<String>, _>("ad_groups").map_err(corrupt)?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(corrupt)?,
    })
}

async fn insert_user_row(
    tx: &mut Transaction<'static, Postgres>,
    email: &str,
    group_ids: &[GroupId],
    operation: &str,
) -> StorageResult<UserGroupPivot> {
    let row = sqlx::query(
        r#"
        INSERT INTO rbac_user_pivot (email, ad_groups, updated_at)
        VALUES ($1, $2, $3)
        RETURNING email, ad_groups, updated_at
        "#,
    )
    .bind(email)
    .bind(group_ids)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| StorageError::from_sqlx(operation, e))?;

    user_from_row(&row)
}

fn agent_from_row(row: &PgRow) -> StorageResult<AgentGroupPivot> {
    let corrupt = |e: sqlx::Error| StorageError::Corrupt {
        table: "rbac_agent_pivot".to_string(),
        message: e.to_string(),
    };
    let Json(metadata) = row
        .try_get::<Json<Vec<GroupMetadata>>, _>("ad_groups_metadata")
        .map_err(corrupt)?;
    Ok(AgentGroupPivot {
        agent_name: row.try_get::<String, _>("agent_name").map_err(corrupt)?,
        groups: row.try_get::<Vec<String>, _>("ad_groups").map_err(corrupt)?,
        metadata,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(corrupt)?,
    })
}

#[async_trait]
impl PivotStore for PostgresPivotStore {
    #[instrument(skip(self, group_ids), fields(groups = group_ids.len()))]
    async fn sync_user_groups(
        &self,
        email: &str,
        group_ids: Vec<GroupId>,
    ) -> StorageResult<UserGroupPivot> {
        const OP: &str = "sync_user_groups";
        let mut tx = self.begin(OP).await?;
        lock_key(&mut tx, "rbac_user_pivot", email, OP).await?;

        // Dropping `tx` on an early return rolls the transaction back
        sqlx::query("DELETE FROM rbac_user_pivot WHERE email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::from_sqlx(OP, e))?;

        let pivot = insert_user_row(&mut tx, email, &group_ids, OP).await?;
        commit(tx, OP).await?;

        debug!(email, groups = pivot.groups.len(), "Synced user pivot");
        Ok(pivot)
    }

    #[instrument(skip(self, group_ids), fields(groups = group_ids.len()))]
    async fn repair_user_groups(
        &self,
        email: &str,
        group_ids: Vec<GroupId>,
        observed_at: DateTime<Utc>,
    ) -> StorageResult<Option<UserGroupPivot>> {
        const OP: &str = "repair_user_groups";
        let mut tx = self.begin(OP).await?;
        lock_key(&mut tx, "rbac_user_pivot", email, OP).await?;

        let current: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT updated_at FROM rbac_user_pivot WHERE email = $1")
                .bind(email)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| StorageError::from_sqlx(OP, e))?;

        if current.is_some_and(|updated_at| updated_at >= observed_at) {
            rollback(tx, OP).await?;
            debug!(email, "User pivot written since observation, not repairing");
            return Ok(None);
        }

        sqlx::query("DELETE FROM rbac_user_pivot WHERE email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::from_sqlx(OP, e))?;

        let pivot = insert_user_row(&mut tx, email, &group_ids, OP).await?;
        commit(tx, OP).await?;

        debug!(email, groups = pivot.groups.len(), "Repaired user pivot");
        Ok(Some(pivot))
    }

    #[instrument(skip(self))]
    async fn get_user_groups(&self, email: &str) -> StorageResult<Vec<GroupId>> {
        let row = sqlx::query("SELECT ad_groups FROM rbac_user_pivot WHERE email = $1")
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| StorageError::from_sqlx("get_user_groups", e))?;

        match row {
            Some(row) => {
                let groups: Vec<String> =
                    row.try_get("ad_groups")
                        .map_err(|e| StorageError::Corrupt {
                            table: "rbac_user_pivot".to_string(),
                            message: e.to_string(),
                        })?;
                Ok(dedupe(&groups))
            }
            None => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self, group_ids, metadata), fields(groups = group_ids.len()))]
    async fn assign_agent_groups(
        &self,
        agent_name: &str,
        group_ids: Vec<GroupId>,
        metadata: Vec<GroupMetadata>,
    ) -> StorageResult<AgentGroupPivot> {
        const OP: &str = "assign_agent_groups";
        let mut tx = self.begin(OP).await?;
        lock_key(&mut tx, "rbac_agent_pivot", agent_name, OP).await?;

        // Statements inside the transaction run in order, so the delete is
        // visible to the insert and the unique constraint on agent_name holds
        sqlx::query("DELETE FROM rbac_agent_pivot WHERE agent_name = $1")
            .bind(agent_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::from_sqlx(OP, e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO rbac_agent_pivot (agent_name, ad_groups, ad_groups_metadata, updated_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING agent_name, ad_groups, ad_groups_metadata, updated_at
            "#,
        )
        .bind(agent_name)
        .bind(&group_ids)
        .bind(Json(&metadata))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StorageError::from_sqlx(OP, e))?;

        let pivot = agent_from_row(&row)?;
        commit(tx, OP).await?;

        debug!(agent_name, groups = pivot.groups.len(), "Assigned agent pivot");
        Ok(pivot)
    }

    #[instrument(skip(self))]
    async fn get_agent_groups(&self, agent_name: &str) -> StorageResult<Vec<GroupId>> {
        Ok(self
            .get_agent_pivot(agent_name)
            .await?
            .map(|p| p.unique_groups())
            .unwrap_or_default())
    }

    async fn get_agent_pivot(&self, agent_name: &str) -> StorageResult<Option<AgentGroupPivot>> {
        let row = sqlx::query(
            r#"
            SELECT agent_name, ad_groups, ad_groups_metadata, updated_at
            FROM rbac_agent_pivot
            WHERE agent_name = $1
            "#,
        )
        .bind(agent_name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("get_agent_pivot", e))?;

        row.as_ref().map(agent_from_row).transpose()
    }

    async fn list_all_user_pivots(&self) -> StorageResult<Vec<UserGroupPivot>> {
        let rows = sqlx::query(
            "SELECT email, ad_groups, updated_at FROM rbac_user_pivot ORDER BY email",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("list_all_user_pivots", e))?;

        rows.iter().map(user_from_row).collect()
    }

    async fn list_all_agent_pivots(&self) -> StorageResult<Vec<AgentGroupPivot>> {
        let rows = sqlx::query(
            r#"
            SELECT agent_name, ad_groups, ad_groups_metadata, updated_at
            FROM rbac_agent_pivot
            ORDER BY agent_name
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("list_all_agent_pivots", e))?;

        rows.iter().map(agent_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn rename_agent(&self, old_name: &str, new_name: &str) -> StorageResult<bool> {
        const OP: &str = "rename_agent";
        let mut tx = self.begin(OP).await?;

        // Fixed lock order, so opposite renames cannot deadlock
        let (first, second) = if old_name <= new_name {
            (old_name, new_name)
        } else {
            (new_name, old_name)
        };
        lock_key(&mut tx, "rbac_agent_pivot", first, OP).await?;
        if second != first {
            lock_key(&mut tx, "rbac_agent_pivot", second, OP).await?;
        }

        let moved_pivot = sqlx::query(
            "UPDATE rbac_agent_pivot SET agent_name = $2, updated_at = NOW() WHERE agent_name = $1",
        )
        .bind(old_name)
        .bind(new_name)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::from_sqlx(OP, e))?
        .rows_affected();

        // A user already granted the new name keeps that grant
        let dropped = sqlx::query(
            r#"
            DELETE FROM rbac_direct_grant g
            WHERE g.agent_name = $1
              AND $1 <> $2
              AND EXISTS (
                SELECT 1 FROM rbac_direct_grant n
                WHERE n.email = g.email AND n.agent_name = $2
              )
            "#,
        )
        .bind(old_name)
        .bind(new_name)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::from_sqlx(OP, e))?
        .rows_affected();

        let moved_grants =
            sqlx::query("UPDATE rbac_direct_grant SET agent_name = $2 WHERE agent_name = $1")
                .bind(old_name)
                .bind(new_name)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::from_sqlx(OP, e))?
                .rows_affected();

        if moved_pivot + dropped + moved_grants == 0 {
            rollback(tx, OP).await?;
            return Ok(false);
        }

        commit(tx, OP).await?;
        debug!(moved_pivot, moved_grants, "Renamed agent");
        Ok(true)
    }
}

#[async_trait]
impl DirectGrantStore for PostgresPivotStore {
    async fn grant_direct_access(
        &self,
        email: &str,
        agent_name: &str,
    ) -> StorageResult<DirectGrant> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let row = sqlx::query(
            r#"
            INSERT INTO rbac_direct_grant (email, agent_name, granted_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (email, agent_name)
            DO UPDATE SET email = EXCLUDED.email
            RETURNING email, agent_name, granted_at
            "#,
        )
        .bind(email)
        .bind(agent_name)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("grant_direct_access", e))?;

        let corrupt = |e: sqlx::Error| StorageError::Corrupt {
            table: "rbac_direct_grant".to_string(),
            message: e.to_string(),
        };
        Ok(DirectGrant {
            email: row.try_get("email").map_err(corrupt)?,
            agent_name: row.try_get("agent_name").map_err(corrupt)?,
            granted_at: row.try_get("granted_at").map_err(corrupt)?,
        })
    }

    async fn revoke_direct_access(&self, email: &str, agent_name: &str) -> StorageResult<bool> {
        let result =
            sqlx::query("DELETE FROM rbac_direct_grant WHERE email = $1 AND agent_name = $2")
                .bind(email)
                .bind(agent_name)
                .execute(&*self.pool)
                .await
                .map_err(|e| StorageError::from_sqlx("revoke_direct_access", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn direct_grants(&self, email: &str) -> StorageResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT agent_name FROM rbac_direct_grant WHERE email = $1 ORDER BY agent_name",
        )
        .bind(email)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("direct_grants", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("agent_name")
                    .map_err(|e| StorageError::Corrupt {
                        table: "rbac_direct_grant".to_string(),
                        message: e.to_string(),
                    })
            })
            .collect()
    }
}
