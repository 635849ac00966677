//! SQL implementation of the device type repository

use chrono::{DateTime, Utc};
use fleetyard_core::firmware::sort_newest_first;
use fleetyard_core::rules;
use fleetyard_core::{DeviceType, DeviceTypeInput, DeviceWithFirmware, FleetError, FleetResult, Firmware};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbError;
use crate::repository::device::DeviceWithFirmwareRow;
use crate::repository::firmware::FirmwareRow;

#[derive(Debug, FromRow)]
struct DeviceTypeRow {
    device_type_id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<DeviceTypeRow> for DeviceType {
    fn from(row: DeviceTypeRow) -> Self {
        DeviceType {
            device_type_id: row.device_type_id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

const SELECT_DEVICE_TYPE: &str =
    "SELECT device_type_id, name, description, created_at FROM device_types";

pub(crate) async fn exists(conn: &mut SqliteConnection, id: i64) -> FleetResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM device_types WHERE device_type_id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::from)?;
    Ok(count > 0)
}

async fn count_devices(conn: &mut SqliteConnection, id: i64) -> FleetResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices WHERE device_type_id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::from)?;
    Ok(count)
}

#[derive(Clone)]
pub struct DeviceTypeRepository {
    pool: SqlitePool,
}

impl DeviceTypeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All device types, ordered by name
    pub async fn list(&self) -> FleetResult<Vec<DeviceType>> {
        let rows: Vec<DeviceTypeRow> =
            sqlx::query_as(&format!("{SELECT_DEVICE_TYPE} ORDER BY name, device_type_id"))
                .fetch_all(&self.pool)
                .await
                .map_err(DbError::from)?;
        Ok(rows.into_iter().map(DeviceType::from).collect())
    }

    pub async fn get(&self, id: i64) -> FleetResult<DeviceType> {
        let row: Option<DeviceTypeRow> =
            sqlx::query_as(&format!("{SELECT_DEVICE_TYPE} WHERE device_type_id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DbError::from)?;
        row.map(DeviceType::from)
            .ok_or_else(|| FleetError::not_found("device type", id))
    }

    pub async fn create(&self, input: DeviceTypeInput) -> FleetResult<DeviceType> {
        let input = input.validate()?;
        let row: DeviceTypeRow = sqlx::query_as(
            "INSERT INTO device_types (name, description, created_at) VALUES (?, ?, ?) \
             RETURNING device_type_id, name, description, created_at",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from)?;

        debug!(device_type = row.device_type_id, "Inserted device type");
        Ok(row.into())
    }

    pub async fn update(&self, id: i64, input: DeviceTypeInput) -> FleetResult<DeviceType> {
        let input = input.validate()?;
        let row: Option<DeviceTypeRow> = sqlx::query_as(
            "UPDATE device_types SET name = ?, description = ? WHERE device_type_id = ? \
             RETURNING device_type_id, name, description, created_at",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        row.map(DeviceType::from)
            .ok_or_else(|| FleetError::not_found("device type", id))
    }

    /// Delete a device type no device references
    ///
    /// The count and the delete share one transaction, and the schema's
    /// restrictive foreign key backs the check. Firmware built for the type
    /// is removed with it.
    pub async fn delete(&self, id: i64) -> FleetResult<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let device_count = count_devices(&mut tx, id).await?;
        rules::ensure_device_type_unused(id, device_count)?;

        let result = sqlx::query("DELETE FROM device_types WHERE device_type_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Err(FleetError::not_found("device type", id));
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    pub async fn device_count(&self, id: i64) -> FleetResult<i64> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        count_devices(&mut conn, id).await
    }

    /// Devices of a type, ordered by name, each with its firmware version
    pub async fn devices(&self, id: i64) -> FleetResult<Vec<DeviceWithFirmware>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        if !exists(&mut conn, id).await? {
            return Err(FleetError::not_found("device type", id));
        }

        let rows: Vec<DeviceWithFirmwareRow> = sqlx::query_as(
            "SELECT d.device_id, d.name, d.serial_number, d.device_type_id, d.firmware_id, \
                    d.group_id, d.added_at, f.version AS firmware_version \
             FROM devices d \
             LEFT JOIN firmware f ON d.firmware_id = f.firmware_id \
             WHERE d.device_type_id = ? \
             ORDER BY d.name, d.device_id",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::from)?;

        Ok(rows.into_iter().map(DeviceWithFirmware::from).collect())
    }

    /// Firmware built for a type, newest version first
    pub async fn firmware(&self, id: i64) -> FleetResult<Vec<Firmware>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        if !exists(&mut conn, id).await? {
            return Err(FleetError::not_found("device type", id));
        }

        let rows: Vec<FirmwareRow> = sqlx::query_as(
            "SELECT firmware_id, device_type_id, name, version, created_at \
             FROM firmware WHERE device_type_id = ?",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::from)?;

        let mut firmware: Vec<Firmware> = rows.into_iter().map(Firmware::from).collect();
        sort_newest_first(&mut firmware);
        Ok(firmware)
    }
}
