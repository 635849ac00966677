//! Fleetyard DB - SQLite persistence for groups, device types, firmware and devices
//!
//! Referential rules that the schema can enforce (unique serial numbers,
//! restrictive deletes) are enforced there; the remaining checks run inside
//! the transaction of the write they guard.

pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, run_migrations, DbConfig};
pub use error::DbError;
pub use repository::{DeviceRepository, DeviceTypeRepository, FirmwareRepository, GroupRepository};

use fleetyard_core::{FleetResult, Snapshot};
use sqlx::SqlitePool;
use tracing::debug;

/// All repositories over one connection pool
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    pub groups: GroupRepository,
    pub device_types: DeviceTypeRepository,
    pub firmware: FirmwareRepository,
    pub devices: DeviceRepository,
}

impl Store {
    /// Connect and bring the schema up to date
    pub async fn open(config: &DbConfig) -> Result<Self, DbError> {
        let pool = connect(config).await?;
        run_migrations(&pool).await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            groups: GroupRepository::new(pool.clone()),
            device_types: DeviceTypeRepository::new(pool.clone()),
            firmware: FirmwareRepository::new(pool.clone()),
            devices: DeviceRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read every entity for one request's view
    pub async fn snapshot(&self) -> FleetResult<Snapshot> {
        let snapshot = Snapshot {
            groups: self.groups.list().await?,
            device_types: self.device_types.list().await?,
            firmware: self.firmware.list().await?,
            devices: self.devices.list().await?,
        };
        debug!(
            groups = snapshot.groups.len(),
            devices = snapshot.devices.len(),
            "Loaded snapshot"
        );
        Ok(snapshot)
    }
}
