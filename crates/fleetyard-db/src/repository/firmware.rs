//! SQL implementation of the firmware repository

use chrono::{DateTime, Utc};
use fleetyard_core::{Firmware, FirmwareInput, FleetError, FleetResult};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbError;
use crate::repository::device_type;

#[derive(Debug, FromRow)]
pub(crate) struct FirmwareRow {
    firmware_id: i64,
    device_type_id: i64,
    name: String,
    version: String,
    created_at: DateTime<Utc>,
}

impl From<FirmwareRow> for Firmware {
    fn from(row: FirmwareRow) -> Self {
        Firmware {
            firmware_id: row.firmware_id,
            device_type_id: row.device_type_id,
            name: row.name,
            version: row.version,
            created_at: row.created_at,
        }
    }
}

const SELECT_FIRMWARE: &str =
    "SELECT firmware_id, device_type_id, name, version, created_at FROM firmware";

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: i64) -> FleetResult<Option<Firmware>> {
    let row: Option<FirmwareRow> = sqlx::query_as(&format!("{SELECT_FIRMWARE} WHERE firmware_id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::from)?;
    Ok(row.map(Firmware::from))
}

async fn count_installs(conn: &mut SqliteConnection, id: i64) -> FleetResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices WHERE firmware_id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::from)?;
    Ok(count)
}

async fn count_history(conn: &mut SqliteConnection, id: i64) -> FleetResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM device_firmware_history WHERE firmware_id = ?")
            .bind(id)
            .fetch_one(&mut *conn)
            .await
            .map_err(DbError::from)?;
    Ok(count)
}

async fn require_device_type(conn: &mut SqliteConnection, device_type_id: i64) -> FleetResult<()> {
    if !device_type::exists(conn, device_type_id).await? {
        return Err(FleetError::validation(format!(
            "device type {device_type_id} does not exist"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct FirmwareRepository {
    pool: SqlitePool,
}

impl FirmwareRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> FleetResult<Vec<Firmware>> {
        let rows: Vec<FirmwareRow> = sqlx::query_as(&format!("{SELECT_FIRMWARE} ORDER BY firmware_id"))
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(rows.into_iter().map(Firmware::from).collect())
    }

    pub async fn get(&self, id: i64) -> FleetResult<Firmware> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        fetch(&mut conn, id)
            .await?
            .ok_or_else(|| FleetError::not_found("firmware", id))
    }

    pub async fn create(&self, input: FirmwareInput) -> FleetResult<Firmware> {
        let input = input.validate()?;
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        require_device_type(&mut tx, input.device_type_id).await?;

        let row: FirmwareRow = sqlx::query_as(
            "INSERT INTO firmware (device_type_id, name, version, created_at) VALUES (?, ?, ?, ?) \
             RETURNING firmware_id, device_type_id, name, version, created_at",
        )
        .bind(input.device_type_id)
        .bind(&input.name)
        .bind(&input.version)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from)?;

        tx.commit().await.map_err(DbError::from)?;
        debug!(firmware = row.firmware_id, version = %row.version, "Inserted firmware");
        Ok(row.into())
    }

    /// Replace name, version and device type
    ///
    /// Firmware that is installed, or recorded in any install history, keeps
    /// its device type.
    pub async fn update(&self, id: i64, input: FirmwareInput) -> FleetResult<Firmware> {
        let input = input.validate()?;
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let existing = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| FleetError::not_found("firmware", id))?;

        if existing.device_type_id != input.device_type_id {
            require_device_type(&mut tx, input.device_type_id).await?;
            let installs = count_installs(&mut tx, id).await?;
            if installs > 0 {
                return Err(FleetError::conflict(format!(
                    "firmware {id} is installed on {installs} device(s) and cannot change device type"
                )));
            }
            let recorded = count_history(&mut tx, id).await?;
            if recorded > 0 {
                return Err(FleetError::conflict(format!(
                    "firmware {id} appears in {recorded} install record(s) and cannot change device type"
                )));
            }
        }

        let row: Option<FirmwareRow> = sqlx::query_as(
            "UPDATE firmware SET device_type_id = ?, name = ?, version = ? WHERE firmware_id = ? \
             RETURNING firmware_id, device_type_id, name, version, created_at",
        )
        .bind(input.device_type_id)
        .bind(&input.name)
        .bind(&input.version)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::from)?;

        let row = row.ok_or_else(|| {
            FleetError::internal(format!("update of firmware {id} affected no rows"))
        })?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(row.into())
    }

    /// Firmware still installed on a device, or recorded in any device's
    /// history, cannot be deleted
    pub async fn delete(&self, id: i64) -> FleetResult<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let installs = count_installs(&mut tx, id).await?;
        if installs > 0 {
            return Err(FleetError::conflict(format!(
                "firmware {id} is installed on {installs} device(s)"
            )));
        }
        let recorded = count_history(&mut tx, id).await?;
        if recorded > 0 {
            return Err(FleetError::conflict(format!(
                "firmware {id} appears in {recorded} install record(s)"
            )));
        }

        let result = sqlx::query("DELETE FROM firmware WHERE firmware_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Err(FleetError::not_found("firmware", id));
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}
