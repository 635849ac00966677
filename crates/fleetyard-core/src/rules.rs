//! Referential rules between devices, device types and firmware
//!
//! These are pure decisions; the store runs them inside the transaction that
//! performs the matching write.

use crate::error::{FleetError, FleetResult};
use crate::firmware::Firmware;

/// Trimmed, non-empty text or a validation error naming the field
pub(crate) fn require_text(field: &str, value: &str) -> FleetResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FleetError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// A device type can only be deleted once no device references it
pub fn ensure_device_type_unused(device_type_id: i64, device_count: i64) -> FleetResult<()> {
    if device_count > 0 {
        return Err(FleetError::conflict(format!(
            "cannot delete device type {device_type_id}: {device_count} device(s) still assigned to it"
        )));
    }
    Ok(())
}

/// A device may only run firmware built for its own device type
pub fn ensure_firmware_matches_type(firmware: &Firmware, device_type_id: i64) -> FleetResult<()> {
    if firmware.device_type_id != device_type_id {
        return Err(FleetError::validation(format!(
            "firmware {} belongs to device type {}, not {}",
            firmware.firmware_id, firmware.device_type_id, device_type_id
        )));
    }
    Ok(())
}

/// Firmware id to record in history when a device is fully updated
///
/// Only a supplied id that differs from the current one is an install event.
/// The dedicated assign path always records, even for the same id.
pub fn firmware_to_log(current: Option<i64>, requested: Option<i64>) -> Option<i64> {
    match requested {
        Some(id) if current != Some(id) => Some(id),
        _ => None,
    }
}

/// Every install recorded for a device names firmware of the device's current
/// type, so a device with installs of another type cannot be moved
pub fn ensure_type_change_allowed(
    device_id: i64,
    device_type_id: i64,
    foreign_history_rows: i64,
) -> FleetResult<()> {
    if foreign_history_rows > 0 {
        return Err(FleetError::conflict(format!(
            "device {device_id} has {foreign_history_rows} firmware install(s) recorded for \
             another device type and cannot move to device type {device_type_id}"
        )));
    }
    Ok(())
}

/// Serial numbers are unique across all devices
pub fn ensure_serial_available(serial_number: &str, in_use_by_other: bool) -> FleetResult<()> {
    if in_use_by_other {
        return Err(FleetError::conflict(format!(
            "a device with serial number {serial_number} already exists"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn firmware(id: i64, device_type_id: i64) -> Firmware {
        Firmware {
            firmware_id: id,
            device_type_id,
            name: "app".to_string(),
            version: "1.0.0".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_device_type_guard() {
        assert!(ensure_device_type_unused(1, 0).is_ok());
        assert!(matches!(
            ensure_device_type_unused(1, 3),
            Err(FleetError::Conflict(_))
        ));
    }

    #[test]
    fn test_firmware_type_match() {
        assert!(ensure_firmware_matches_type(&firmware(5, 2), 2).is_ok());
        assert!(matches!(
            ensure_firmware_matches_type(&firmware(5, 2), 3),
            Err(FleetError::Validation(_))
        ));
    }

    #[test]
    fn test_firmware_to_log() {
        assert_eq!(firmware_to_log(None, Some(4)), Some(4));
        assert_eq!(firmware_to_log(Some(3), Some(4)), Some(4));
        assert_eq!(firmware_to_log(Some(4), Some(4)), None);
        assert_eq!(firmware_to_log(Some(4), None), None);
        assert_eq!(firmware_to_log(None, None), None);
    }

    #[test]
    fn test_type_change_guard() {
        assert!(ensure_type_change_allowed(1, 2, 0).is_ok());
        assert!(matches!(
            ensure_type_change_allowed(1, 2, 1),
            Err(FleetError::Conflict(_))
        ));
    }

    #[test]
    fn test_serial_guard() {
        assert!(ensure_serial_available("SN-1", false).is_ok());
        assert!(matches!(
            ensure_serial_available("SN-1", true),
            Err(FleetError::Conflict(_))
        ));
    }

    #[test]
    fn test_require_text() {
        assert_eq!(require_text("name", "  x ").unwrap(), "x");
        assert_eq!(
            require_text("name", "").unwrap_err(),
            FleetError::validation("name is required")
        );
    }
}
