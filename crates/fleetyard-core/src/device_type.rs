//! Device categories; firmware is versioned per type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FleetResult;
use crate::rules::require_text;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceType {
    pub device_type_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create/update payload for a device type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTypeInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl DeviceTypeInput {
    pub fn new(name: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            name: name.into(),
            description: description.map(str::to_string),
        }
    }

    /// Trims the name; an all-whitespace description is stored as absent
    pub fn validate(mut self) -> FleetResult<Self> {
        self.name = require_text("device type name", &self.name)?;
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Ok(self)
    }
}
