//! SQL implementation of the group repository

use chrono::{DateTime, Utc};
use fleetyard_core::hierarchy;
use fleetyard_core::{FleetError, FleetResult, Group, GroupInput};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbError;

#[derive(Debug, FromRow)]
struct GroupRow {
    group_id: i64,
    name: String,
    parent_group_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            group_id: row.group_id,
            name: row.name,
            parent_group_id: row.parent_group_id,
            created_at: row.created_at,
        }
    }
}

const SELECT_GROUP: &str = "SELECT group_id, name, parent_group_id, created_at FROM groups";

/// Every group, read through an open connection or transaction
async fn fetch_all(conn: &mut SqliteConnection) -> FleetResult<Vec<Group>> {
    let rows: Vec<GroupRow> = sqlx::query_as(&format!("{SELECT_GROUP} ORDER BY group_id"))
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::from)?;
    Ok(rows.into_iter().map(Group::from).collect())
}

pub(crate) async fn exists(conn: &mut SqliteConnection, id: i64) -> FleetResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM groups WHERE group_id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::from)?;
    Ok(count > 0)
}

#[derive(Clone)]
pub struct GroupRepository {
    pool: SqlitePool,
}

impl GroupRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> FleetResult<Vec<Group>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        fetch_all(&mut conn).await
    }

    pub async fn get(&self, id: i64) -> FleetResult<Group> {
        let row: Option<GroupRow> = sqlx::query_as(&format!("{SELECT_GROUP} WHERE group_id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        row.map(Group::from)
            .ok_or_else(|| FleetError::not_found("group", id))
    }

    pub async fn create(&self, input: GroupInput) -> FleetResult<Group> {
        let input = input.validate()?;
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        if let Some(parent) = input.parent_group_id {
            if !exists(&mut tx, parent).await? {
                return Err(FleetError::validation(format!(
                    "parent group {parent} does not exist"
                )));
            }
        }

        let row: GroupRow = sqlx::query_as(
            "INSERT INTO groups (name, parent_group_id, created_at) VALUES (?, ?, ?) \
             RETURNING group_id, name, parent_group_id, created_at",
        )
        .bind(&input.name)
        .bind(input.parent_group_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from)?;

        tx.commit().await.map_err(DbError::from)?;
        debug!(group = row.group_id, "Inserted group");
        Ok(row.into())
    }

    /// Replace name and parent; the new parent may not be the group itself
    /// or anything below it
    pub async fn update(&self, id: i64, input: GroupInput) -> FleetResult<Group> {
        let input = input.validate()?;
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let groups = fetch_all(&mut tx).await?;
        if !groups.iter().any(|g| g.group_id == id) {
            return Err(FleetError::not_found("group", id));
        }
        hierarchy::ensure_valid_parent(&groups, id, input.parent_group_id)?;

        let row: Option<GroupRow> = sqlx::query_as(
            "UPDATE groups SET name = ?, parent_group_id = ? WHERE group_id = ? \
             RETURNING group_id, name, parent_group_id, created_at",
        )
        .bind(&input.name)
        .bind(input.parent_group_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::from)?;

        let row = row.ok_or_else(|| FleetError::internal(format!("update of group {id} affected no rows")))?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(row.into())
    }

    /// Child groups and member devices are detached, not deleted
    pub async fn delete(&self, id: i64) -> FleetResult<()> {
        let result = sqlx::query("DELETE FROM groups WHERE group_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Err(FleetError::not_found("group", id));
        }
        Ok(())
    }

    /// Groups that may be chosen as the new parent of `id`
    pub async fn parent_candidates(&self, id: i64) -> FleetResult<Vec<Group>> {
        let groups = self.list().await?;
        if !groups.iter().any(|g| g.group_id == id) {
            return Err(FleetError::not_found("group", id));
        }
        Ok(hierarchy::parent_candidates(&groups, id))
    }
}
