//! Integration tests for the device repository: serial numbers, firmware
//! assignment and install history.

use chrono::Utc;
use fleetyard_core::{DeviceTypeInput, Firmware, FirmwareInput, FleetError, NewDevice};
use fleetyard_db::{DbConfig, Store};

/// Helper: in-memory store with one device type and two firmware builds for it.
async fn setup() -> (Store, i64, Firmware, Firmware) {
    let store = Store::open(&DbConfig::in_memory()).await.unwrap();
    let device_type = store
        .device_types
        .create(DeviceTypeInput::new("Camera", None))
        .await
        .unwrap();
    let type_id = device_type.device_type_id;
    let v1 = store
        .firmware
        .create(FirmwareInput::new(type_id, "cam-fw", "1.0.0"))
        .await
        .unwrap();
    let v2 = store
        .firmware
        .create(FirmwareInput::new(type_id, "cam-fw", "1.1.0"))
        .await
        .unwrap();
    (store, type_id, v1, v2)
}

#[tokio::test]
async fn create_and_get_device() {
    let (store, type_id, v1, _) = setup().await;

    let device = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id).with_firmware(v1.firmware_id))
        .await
        .unwrap();

    let fetched = store.devices.get(device.device_id).await.unwrap();
    assert_eq!(fetched.name, "cam-1");
    assert_eq!(fetched.serial_number, "SN-001");
    assert_eq!(fetched.firmware_id, Some(v1.firmware_id));
    assert_eq!(fetched.added_at, device.added_at);
}

#[tokio::test]
async fn create_with_firmware_logs_initial_install() {
    let (store, type_id, v1, _) = setup().await;

    let with_fw = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id).with_firmware(v1.firmware_id))
        .await
        .unwrap();
    let without_fw = store
        .devices
        .create(NewDevice::new("cam-2", "SN-002", type_id))
        .await
        .unwrap();

    let history = store.devices.firmware_history(with_fw.device_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].firmware_id, v1.firmware_id);

    assert!(store
        .devices
        .firmware_history(without_fw.device_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn duplicate_serial_on_create_is_conflict() {
    let (store, type_id, _, _) = setup().await;
    store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id))
        .await
        .unwrap();

    let err = store
        .devices
        .create(NewDevice::new("cam-2", "SN-001", type_id))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)));
    assert_eq!(store.devices.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn serial_update_checks_other_devices_only() {
    let (store, type_id, _, _) = setup().await;
    let first = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id))
        .await
        .unwrap();
    let second = store
        .devices
        .create(NewDevice::new("cam-2", "SN-002", type_id))
        .await
        .unwrap();

    let err = store
        .devices
        .update(second.device_id, NewDevice::new("cam-2", "SN-001", type_id))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)));

    let renamed = store
        .devices
        .update(first.device_id, NewDevice::new("cam-1b", "SN-001", type_id))
        .await
        .unwrap();
    assert_eq!(renamed.name, "cam-1b");
    assert_eq!(renamed.serial_number, "SN-001");

    assert!(store.devices.serial_in_use("SN-001", None).await.unwrap());
    assert!(!store
        .devices
        .serial_in_use("SN-001", Some(first.device_id))
        .await
        .unwrap());
    assert!(!store.devices.serial_in_use("SN-999", None).await.unwrap());
}

#[tokio::test]
async fn assign_firmware_appends_one_history_row() {
    let (store, type_id, v1, v2) = setup().await;
    let device = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id).with_firmware(v1.firmware_id))
        .await
        .unwrap();

    let before = Utc::now();
    let updated = store
        .devices
        .assign_firmware(device.device_id, v2.firmware_id)
        .await
        .unwrap();
    assert_eq!(updated.firmware_id, Some(v2.firmware_id));

    let history = store.devices.firmware_history(device.device_id).await.unwrap();
    assert_eq!(history.len(), 2);
    let last = &history[1];
    assert_eq!(last.device_id, device.device_id);
    assert_eq!(last.firmware_id, v2.firmware_id);
    assert!(last.installed_at >= before);
}

#[tokio::test]
async fn reassigning_same_firmware_logs_again() {
    let (store, type_id, v1, _) = setup().await;
    let device = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id))
        .await
        .unwrap();

    store
        .devices
        .assign_firmware(device.device_id, v1.firmware_id)
        .await
        .unwrap();
    store
        .devices
        .assign_firmware(device.device_id, v1.firmware_id)
        .await
        .unwrap();

    let history = store.devices.firmware_history(device.device_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.firmware_id == v1.firmware_id));
    assert!(history[0].device_firmware_history_id < history[1].device_firmware_history_id);
}

#[tokio::test]
async fn firmware_of_another_type_is_rejected() {
    let (store, type_id, _, _) = setup().await;
    let sensor = store
        .device_types
        .create(DeviceTypeInput::new("Sensor", None))
        .await
        .unwrap();
    let sensor_fw = store
        .firmware
        .create(FirmwareInput::new(sensor.device_type_id, "sensor-fw", "0.3.0"))
        .await
        .unwrap();

    let err = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id).with_firmware(sensor_fw.firmware_id))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Validation(_)));

    let device = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id))
        .await
        .unwrap();
    let err = store
        .devices
        .assign_firmware(device.device_id, sensor_fw.firmware_id)
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Validation(_)));
    assert!(store
        .devices
        .firmware_history(device.device_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn assign_firmware_to_missing_device_is_not_found() {
    let (store, _, v1, _) = setup().await;
    let err = store
        .devices
        .assign_firmware(404, v1.firmware_id)
        .await
        .unwrap_err();
    assert_eq!(err, FleetError::not_found("device", 404));
}

#[tokio::test]
async fn update_logs_only_firmware_changes() {
    let (store, type_id, v1, v2) = setup().await;
    let device = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id).with_firmware(v1.firmware_id))
        .await
        .unwrap();

    // Same firmware, omitted firmware: no new rows
    store
        .devices
        .update(
            device.device_id,
            NewDevice::new("cam-1", "SN-001", type_id).with_firmware(v1.firmware_id),
        )
        .await
        .unwrap();
    let kept = store
        .devices
        .update(device.device_id, NewDevice::new("cam-1", "SN-001", type_id))
        .await
        .unwrap();
    assert_eq!(kept.firmware_id, Some(v1.firmware_id));
    assert_eq!(
        store.devices.firmware_history(device.device_id).await.unwrap().len(),
        1
    );

    store
        .devices
        .update(
            device.device_id,
            NewDevice::new("cam-1", "SN-001", type_id).with_firmware(v2.firmware_id),
        )
        .await
        .unwrap();
    let history = store.devices.firmware_history(device.device_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].firmware_id, v2.firmware_id);
}

#[tokio::test]
async fn devices_by_type_carry_firmware_version() {
    let (store, type_id, _, v2) = setup().await;
    store
        .devices
        .create(NewDevice::new("zeta", "SN-002", type_id))
        .await
        .unwrap();
    store
        .devices
        .create(NewDevice::new("alpha", "SN-001", type_id).with_firmware(v2.firmware_id))
        .await
        .unwrap();

    let devices = store.device_types.devices(type_id).await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].device.name, "alpha");
    assert_eq!(devices[0].firmware_version.as_deref(), Some("1.1.0"));
    assert_eq!(devices[1].device.name, "zeta");
    assert_eq!(devices[1].firmware_version, None);

    assert!(matches!(
        store.device_types.devices(999).await,
        Err(FleetError::NotFound { .. })
    ));
}

#[tokio::test]
async fn deleting_device_removes_its_history() {
    let (store, type_id, v1, _) = setup().await;
    let device = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id).with_firmware(v1.firmware_id))
        .await
        .unwrap();

    store.devices.delete(device.device_id).await.unwrap();

    assert!(matches!(
        store.devices.get(device.device_id).await,
        Err(FleetError::NotFound { .. })
    ));
    assert!(matches!(
        store.devices.firmware_history(device.device_id).await,
        Err(FleetError::NotFound { .. })
    ));
    // History no longer pins the firmware
    store.firmware.delete(v1.firmware_id).await.unwrap();
}

#[tokio::test]
async fn firmware_kept_only_by_history_cannot_be_deleted() {
    let (store, type_id, v1, v2) = setup().await;
    let device = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id).with_firmware(v1.firmware_id))
        .await
        .unwrap();
    store
        .devices
        .assign_firmware(device.device_id, v2.firmware_id)
        .await
        .unwrap();

    let err = store.firmware.delete(v1.firmware_id).await.unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)), "got {err:?}");
    assert!(store.firmware.get(v1.firmware_id).await.is_ok());
}

#[tokio::test]
async fn firmware_with_history_keeps_its_device_type() {
    let (store, type_id, v1, v2) = setup().await;
    let sensor = store
        .device_types
        .create(DeviceTypeInput::new("Sensor", None))
        .await
        .unwrap();
    let device = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", type_id).with_firmware(v1.firmware_id))
        .await
        .unwrap();
    store
        .devices
        .assign_firmware(device.device_id, v2.firmware_id)
        .await
        .unwrap();

    let err = store
        .firmware
        .update(
            v1.firmware_id,
            FirmwareInput::new(sensor.device_type_id, "cam-fw", "1.0.0"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)), "got {err:?}");

    // No device or history row holds the sensor type's firmware, so it still deletes
    store.device_types.delete(sensor.device_type_id).await.unwrap();
}

#[tokio::test]
async fn device_with_history_keeps_its_type_so_old_type_stays_deletable() {
    let (store, camera_id, camera_fw, _) = setup().await;
    let sensor = store
        .device_types
        .create(DeviceTypeInput::new("Sensor", None))
        .await
        .unwrap();
    let sensor_fw = store
        .firmware
        .create(FirmwareInput::new(sensor.device_type_id, "sensor-fw", "0.3.0"))
        .await
        .unwrap();
    let device = store
        .devices
        .create(NewDevice::new("cam-1", "SN-001", camera_id).with_firmware(camera_fw.firmware_id))
        .await
        .unwrap();

    let err = store
        .devices
        .update(
            device.device_id,
            NewDevice::new("cam-1", "SN-001", sensor.device_type_id)
                .with_firmware(sensor_fw.firmware_id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)), "got {err:?}");

    let unchanged = store.devices.get(device.device_id).await.unwrap();
    assert_eq!(unchanged.device_type_id, camera_id);
    assert_eq!(
        store.devices.firmware_history(device.device_id).await.unwrap().len(),
        1
    );

    // Once the device is gone, nothing references the camera type
    store.devices.delete(device.device_id).await.unwrap();
    assert_eq!(store.device_types.device_count(camera_id).await.unwrap(), 0);
    store.device_types.delete(camera_id).await.unwrap();
}

#[tokio::test]
async fn device_without_history_can_change_type() {
    let (store, camera_id, _, _) = setup().await;
    let sensor = store
        .device_types
        .create(DeviceTypeInput::new("Sensor", None))
        .await
        .unwrap();
    let sensor_fw = store
        .firmware
        .create(FirmwareInput::new(sensor.device_type_id, "sensor-fw", "0.3.0"))
        .await
        .unwrap();
    let device = store
        .devices
        .create(NewDevice::new("unit-1", "SN-001", camera_id))
        .await
        .unwrap();

    let moved = store
        .devices
        .update(
            device.device_id,
            NewDevice::new("unit-1", "SN-001", sensor.device_type_id)
                .with_firmware(sensor_fw.firmware_id),
        )
        .await
        .unwrap();
    assert_eq!(moved.device_type_id, sensor.device_type_id);

    assert_eq!(store.device_types.device_count(camera_id).await.unwrap(), 0);
    store.device_types.delete(camera_id).await.unwrap();
    assert!(matches!(
        store.device_types.get(camera_id).await,
        Err(FleetError::NotFound { .. })
    ));
}
