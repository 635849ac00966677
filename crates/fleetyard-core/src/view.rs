//! Request-scoped view state for the browser UI
//!
//! A [`Snapshot`] is loaded once per request and handed to the rendering
//! functions below. Nothing here is cached between requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::device::Device;
use crate::device_type::DeviceType;
use crate::firmware::{sort_newest_first, Firmware};
use crate::group::Group;
use crate::hierarchy::{build_forest, parent_candidates, GroupNode};

const UNKNOWN: &str = "Unknown";

/// Everything the UI renders, as read at one point in time
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub groups: Vec<Group>,
    pub device_types: Vec<DeviceType>,
    pub firmware: Vec<Firmware>,
    pub devices: Vec<Device>,
}

/// One `<option>` of a form selector; `value` is `None` for the empty choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: Option<i64>,
    pub label: String,
}

/// A device with its references resolved to display names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCard {
    pub device_id: i64,
    pub name: String,
    pub serial_number: String,
    pub device_type: String,
    pub firmware: String,
    pub group: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Payload of the overview page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub groups: Vec<GroupNode>,
    pub devices: Vec<DeviceCard>,
}

impl Snapshot {
    pub fn group_tree(&self) -> Vec<GroupNode> {
        build_forest(&self.groups)
    }

    pub fn device_cards(&self) -> Vec<DeviceCard> {
        let types: HashMap<i64, &DeviceType> = self
            .device_types
            .iter()
            .map(|t| (t.device_type_id, t))
            .collect();
        let firmware: HashMap<i64, &Firmware> =
            self.firmware.iter().map(|f| (f.firmware_id, f)).collect();
        let groups: HashMap<i64, &Group> = self.groups.iter().map(|g| (g.group_id, g)).collect();

        self.devices
            .iter()
            .map(|device| DeviceCard {
                device_id: device.device_id,
                name: device.name.clone(),
                serial_number: device.serial_number.clone(),
                device_type: types
                    .get(&device.device_type_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                firmware: device
                    .firmware_id
                    .and_then(|id| firmware.get(&id))
                    .map(|f| f.label())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                group: device.group_id.map(|id| {
                    groups
                        .get(&id)
                        .map(|g| g.name.clone())
                        .unwrap_or_else(|| UNKNOWN.to_string())
                }),
                added_at: device.added_at,
            })
            .collect()
    }

    /// Firmware a device of the given type may be assigned, newest first
    pub fn firmware_options(&self, device_type_id: i64) -> Vec<SelectOption> {
        let mut candidates: Vec<Firmware> = self
            .firmware
            .iter()
            .filter(|f| f.device_type_id == device_type_id)
            .cloned()
            .collect();
        sort_newest_first(&mut candidates);
        candidates
            .iter()
            .map(|f| SelectOption {
                value: Some(f.firmware_id),
                label: f.label(),
            })
            .collect()
    }

    /// Parent choices for a group form; `editing` is excluded with its subtree
    pub fn group_options(&self, editing: Option<i64>) -> Vec<SelectOption> {
        let groups = match editing {
            Some(id) => parent_candidates(&self.groups, id),
            None => {
                let mut all = self.groups.clone();
                all.sort_by(|a, b| a.name.cmp(&b.name).then(a.group_id.cmp(&b.group_id)));
                all
            }
        };

        std::iter::once(SelectOption {
            value: None,
            label: "None".to_string(),
        })
        .chain(groups.into_iter().map(|g| SelectOption {
            value: Some(g.group_id),
            label: g.name,
        }))
        .collect()
    }

    pub fn overview(&self) -> Overview {
        Overview {
            groups: self.group_tree(),
            devices: self.device_cards(),
        }
    }
}
