//! SQL implementation of the device repository and its install history

use chrono::{DateTime, Utc};
use fleetyard_core::rules;
use fleetyard_core::{
    Device, DeviceFirmwareHistory, DeviceWithFirmware, FleetError, FleetResult, NewDevice,
};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::DbError;
use crate::repository::{device_type, firmware, group};

#[derive(Debug, FromRow)]
struct DeviceRow {
    device_id: i64,
    name: String,
    serial_number: String,
    device_type_id: i64,
    firmware_id: Option<i64>,
    group_id: Option<i64>,
    added_at: DateTime<Utc>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            device_id: row.device_id,
            name: row.name,
            serial_number: row.serial_number,
            device_type_id: row.device_type_id,
            firmware_id: row.firmware_id,
            group_id: row.group_id,
            added_at: row.added_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct DeviceWithFirmwareRow {
    #[sqlx(flatten)]
    device: DeviceRow,
    firmware_version: Option<String>,
}

impl From<DeviceWithFirmwareRow> for DeviceWithFirmware {
    fn from(row: DeviceWithFirmwareRow) -> Self {
        DeviceWithFirmware {
            device: row.device.into(),
            firmware_version: row.firmware_version,
        }
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    device_firmware_history_id: i64,
    device_id: i64,
    firmware_id: i64,
    installed_at: DateTime<Utc>,
}

impl From<HistoryRow> for DeviceFirmwareHistory {
    fn from(row: HistoryRow) -> Self {
        DeviceFirmwareHistory {
            device_firmware_history_id: row.device_firmware_history_id,
            device_id: row.device_id,
            firmware_id: row.firmware_id,
            installed_at: row.installed_at,
        }
    }
}

const DEVICE_COLUMNS: &str =
    "device_id, name, serial_number, device_type_id, firmware_id, group_id, added_at";

async fn fetch(conn: &mut SqliteConnection, id: i64) -> FleetResult<Option<Device>> {
    let row: Option<DeviceRow> =
        sqlx::query_as(&format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(DbError::from)?;
    Ok(row.map(Device::from))
}

/// Whether a device other than `except` already carries `serial_number`
async fn serial_taken(
    conn: &mut SqliteConnection,
    serial_number: &str,
    except: Option<i64>,
) -> FleetResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM devices WHERE serial_number = ?1 AND (?2 IS NULL OR device_id != ?2)",
    )
    .bind(serial_number)
    .bind(except)
    .fetch_one(&mut *conn)
    .await
    .map_err(DbError::from)?;
    Ok(count > 0)
}

/// The device type must exist, the firmware must exist and belong to that
/// type, and the group must exist
async fn check_references(
    conn: &mut SqliteConnection,
    device_type_id: i64,
    firmware_id: Option<i64>,
    group_id: Option<i64>,
) -> FleetResult<()> {
    if !device_type::exists(conn, device_type_id).await? {
        return Err(FleetError::validation(format!(
            "device type {device_type_id} does not exist"
        )));
    }

    if let Some(firmware_id) = firmware_id {
        let firmware = firmware::fetch(conn, firmware_id).await?.ok_or_else(|| {
            FleetError::validation(format!("firmware {firmware_id} does not exist"))
        })?;
        rules::ensure_firmware_matches_type(&firmware, device_type_id)?;
    }

    if let Some(group_id) = group_id {
        if !group::exists(conn, group_id).await? {
            return Err(FleetError::validation(format!(
                "group {group_id} does not exist"
            )));
        }
    }

    Ok(())
}

/// History rows of a device naming firmware built for a type other than `device_type_id`
async fn count_foreign_history(
    conn: &mut SqliteConnection,
    device_id: i64,
    device_type_id: i64,
) -> FleetResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM device_firmware_history h \
         JOIN firmware f ON h.firmware_id = f.firmware_id \
         WHERE h.device_id = ? AND f.device_type_id != ?",
    )
    .bind(device_id)
    .bind(device_type_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(DbError::from)?;
    Ok(count)
}

async fn record_install(
    conn: &mut SqliteConnection,
    device_id: i64,
    firmware_id: i64,
) -> FleetResult<DeviceFirmwareHistory> {
    let row: HistoryRow = sqlx::query_as(
        "INSERT INTO device_firmware_history (device_id, firmware_id, installed_at) \
         VALUES (?, ?, ?) \
         RETURNING device_firmware_history_id, device_id, firmware_id, installed_at",
    )
    .bind(device_id)
    .bind(firmware_id)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(DbError::from)?;

    debug!(device = device_id, firmware = firmware_id, "Recorded firmware install");
    Ok(row.into())
}

#[derive(Clone)]
pub struct DeviceRepository {
    pool: SqlitePool,
}

impl DeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> FleetResult<Vec<Device>> {
        let rows: Vec<DeviceRow> =
            sqlx::query_as(&format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY device_id"))
                .fetch_all(&self.pool)
                .await
                .map_err(DbError::from)?;
        Ok(rows.into_iter().map(Device::from).collect())
    }

    pub async fn get(&self, id: i64) -> FleetResult<Device> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        fetch(&mut conn, id)
            .await?
            .ok_or_else(|| FleetError::not_found("device", id))
    }

    /// Insert a device; a supplied firmware id is logged as its first install
    pub async fn create(&self, input: NewDevice) -> FleetResult<Device> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let taken = serial_taken(&mut tx, &input.serial_number, None).await?;
        rules::ensure_serial_available(&input.serial_number, taken)?;
        check_references(&mut tx, input.device_type_id, input.firmware_id, input.group_id).await?;

        let row: DeviceRow = sqlx::query_as(&format!(
            "INSERT INTO devices (name, serial_number, device_type_id, firmware_id, group_id, added_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(&input.serial_number)
        .bind(input.device_type_id)
        .bind(input.firmware_id)
        .bind(input.group_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from)?;

        if let Some(firmware_id) = row.firmware_id {
            record_install(&mut tx, row.device_id, firmware_id).await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        info!(device = row.device_id, serial = %row.serial_number, "Added device");
        Ok(row.into())
    }

    /// Full update. An omitted firmware id keeps the installed firmware; a
    /// different one is logged to history. The device type can only change
    /// while no recorded install names firmware of another type.
    pub async fn update(&self, id: i64, input: NewDevice) -> FleetResult<Device> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let existing = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| FleetError::not_found("device", id))?;

        if existing.serial_number != input.serial_number {
            let taken = serial_taken(&mut tx, &input.serial_number, Some(id)).await?;
            rules::ensure_serial_available(&input.serial_number, taken)?;
        }

        if existing.device_type_id != input.device_type_id {
            let foreign = count_foreign_history(&mut tx, id, input.device_type_id).await?;
            rules::ensure_type_change_allowed(id, input.device_type_id, foreign)?;
        }

        let firmware_id = input.firmware_id.or(existing.firmware_id);
        check_references(&mut tx, input.device_type_id, firmware_id, input.group_id).await?;

        let row: Option<DeviceRow> = sqlx::query_as(&format!(
            "UPDATE devices SET name = ?, serial_number = ?, device_type_id = ?, \
             firmware_id = ?, group_id = ? WHERE device_id = ? RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(&input.serial_number)
        .bind(input.device_type_id)
        .bind(firmware_id)
        .bind(input.group_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::from)?;
        let row = row
            .ok_or_else(|| FleetError::internal(format!("update of device {id} affected no rows")))?;

        if let Some(installed) = rules::firmware_to_log(existing.firmware_id, input.firmware_id) {
            record_install(&mut tx, id, installed).await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(row.into())
    }

    /// Removes the device together with its install history
    pub async fn delete(&self, id: i64) -> FleetResult<()> {
        let result = sqlx::query("DELETE FROM devices WHERE device_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Err(FleetError::not_found("device", id));
        }
        Ok(())
    }

    /// Set the device's firmware and append one history row, atomically
    ///
    /// Re-assigning the firmware already installed still appends a row: the
    /// history records install events, not changes.
    pub async fn assign_firmware(&self, device_id: i64, firmware_id: i64) -> FleetResult<Device> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let existing = fetch(&mut tx, device_id)
            .await?
            .ok_or_else(|| FleetError::not_found("device", device_id))?;
        let firmware = firmware::fetch(&mut tx, firmware_id).await?.ok_or_else(|| {
            FleetError::validation(format!("firmware {firmware_id} does not exist"))
        })?;
        rules::ensure_firmware_matches_type(&firmware, existing.device_type_id)?;

        let row: Option<DeviceRow> = sqlx::query_as(&format!(
            "UPDATE devices SET firmware_id = ? WHERE device_id = ? RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(firmware_id)
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::from)?;
        let row = row.ok_or_else(|| {
            FleetError::internal(format!("firmware update of device {device_id} affected no rows"))
        })?;

        record_install(&mut tx, device_id, firmware_id).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            device = device_id,
            firmware = firmware_id,
            version = %firmware.version,
            "Assigned firmware"
        );
        Ok(row.into())
    }

    /// Install events for a device in insertion order
    pub async fn firmware_history(&self, device_id: i64) -> FleetResult<Vec<DeviceFirmwareHistory>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        if fetch(&mut conn, device_id).await?.is_none() {
            return Err(FleetError::not_found("device", device_id));
        }

        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT device_firmware_history_id, device_id, firmware_id, installed_at \
             FROM device_firmware_history WHERE device_id = ? \
             ORDER BY device_firmware_history_id",
        )
        .bind(device_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::from)?;
        Ok(rows.into_iter().map(DeviceFirmwareHistory::from).collect())
    }

    /// Whether a device other than `except` already uses `serial_number`
    pub async fn serial_in_use(&self, serial_number: &str, except: Option<i64>) -> FleetResult<bool> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        serial_taken(&mut conn, serial_number, except).await
    }
}
