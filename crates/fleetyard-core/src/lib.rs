//! Fleetyard Core - Entity types, hierarchy and firmware-assignment rules
//!
//! This crate provides the foundational types for the Fleetyard system:
//! - Groups, device types, firmware, devices and firmware-install history
//! - Group hierarchy building and cycle-safe parent selection
//! - Referential rules between devices, their type and their firmware
//! - Request-scoped view state for the browser UI

pub mod device;
pub mod device_type;
pub mod error;
pub mod firmware;
pub mod group;
pub mod hierarchy;
pub mod rules;
pub mod view;

pub use device::{Device, DeviceFirmwareHistory, DeviceInput, DeviceWithFirmware, NewDevice};
pub use device_type::{DeviceType, DeviceTypeInput};
pub use error::{FleetError, FleetResult};
pub use firmware::{Firmware, FirmwareInput};
pub use group::{Group, GroupInput};
pub use hierarchy::GroupNode;
pub use view::{DeviceCard, Overview, SelectOption, Snapshot};
