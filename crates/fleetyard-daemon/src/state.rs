//! Application state shared by the request handlers

use anyhow::Result;
use fleetyard_db::Store;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Handles shared across requests; holds no view data between them
pub struct AppState {
    pub store: Store,
    pub config: Config,
}

impl AppState {
    /// Open the store named by the configuration and migrate it
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let store = Store::open(&config.to_db_config()).await?;
        info!(url = %config.database.url, "Store ready");
        Ok(Self::with_store(store, config))
    }

    pub fn with_store(store: Store, config: Config) -> Arc<Self> {
        Arc::new(Self { store, config })
    }
}
