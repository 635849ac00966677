//! Device records and their firmware-install history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult};
use crate::rules::require_text;

/// A physical unit with a unique serial number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: i64,
    pub name: String,
    /// Unique across all devices
    pub serial_number: String,
    pub device_type_id: i64,
    /// Must belong to `device_type_id`
    pub firmware_id: Option<i64>,
    pub group_id: Option<i64>,
    pub added_at: DateTime<Utc>,
}

/// A device annotated with the version of its installed firmware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceWithFirmware {
    #[serde(flatten)]
    pub device: Device,
    pub firmware_version: Option<String>,
}

/// One firmware installation event; rows are append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFirmwareHistory {
    pub device_firmware_history_id: i64,
    pub device_id: i64,
    pub firmware_id: i64,
    pub installed_at: DateTime<Utc>,
}

/// Create/update payload for a device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub device_type_id: i64,
    #[serde(default)]
    pub firmware_id: Option<i64>,
    #[serde(default)]
    pub group_id: Option<i64>,
}

/// A [`DeviceInput`] that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub name: String,
    pub serial_number: String,
    pub device_type_id: i64,
    pub firmware_id: Option<i64>,
    pub group_id: Option<i64>,
}

impl DeviceInput {
    /// Serial number is required; name and serial are trimmed
    pub fn validate(self) -> FleetResult<NewDevice> {
        let name = require_text("device name", &self.name)?;
        let serial_number = self
            .serial_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FleetError::validation("serial number is required"))?
            .to_string();

        Ok(NewDevice {
            name,
            serial_number,
            device_type_id: self.device_type_id,
            firmware_id: self.firmware_id,
            group_id: self.group_id,
        })
    }
}

impl NewDevice {
    pub fn new(name: &str, serial_number: &str, device_type_id: i64) -> Self {
        Self {
            name: name.to_string(),
            serial_number: serial_number.to_string(),
            device_type_id,
            firmware_id: None,
            group_id: None,
        }
    }

    pub fn with_firmware(mut self, firmware_id: i64) -> Self {
        self.firmware_id = Some(firmware_id);
        self
    }

    pub fn in_group(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self
    }
}
