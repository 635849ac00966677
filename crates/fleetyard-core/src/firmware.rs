//! Firmware images and version ordering
//!
//! This module provides types for:
//! - Firmware records, each belonging to exactly one device type
//! - Version ordering using semver (primary) with creation-date fallback,
//!   used when offering firmware choices for a device type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::FleetResult;
use crate::rules::require_text;

/// A named, versioned firmware image for one device type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firmware {
    pub firmware_id: i64,
    pub device_type_id: i64,
    pub name: String,
    /// Free-form version string; uniqueness is not enforced
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl Firmware {
    /// Label used by selectors and device cards, e.g. "sensor-app (1.2.0)"
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.version)
    }
}

/// Create/update payload for firmware
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareInput {
    #[serde(default)]
    pub device_type_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl FirmwareInput {
    pub fn new(device_type_id: i64, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            device_type_id,
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn validate(mut self) -> FleetResult<Self> {
        self.name = require_text("firmware name", &self.name)?;
        self.version = require_text("firmware version", &self.version)?;
        Ok(self)
    }
}

/// Sort firmware newest first
///
/// Versions that parse as semver come first, ordered by semver descending.
/// The rest follow, ordered by creation time descending.
pub fn sort_newest_first(firmware: &mut [Firmware]) {
    firmware.sort_by(newest_first);
}

/// The newest firmware in the slice, by the same ordering as [`sort_newest_first`]
pub fn latest(firmware: &[Firmware]) -> Option<&Firmware> {
    firmware.iter().min_by(|a, b| newest_first(a, b))
}

fn newest_first(a: &Firmware, b: &Firmware) -> Ordering {
    match (parse_version(&a.version), parse_version(&b.version)) {
        (Some(va), Some(vb)) => vb.cmp(&va).then_with(|| b.created_at.cmp(&a.created_at)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.created_at.cmp(&a.created_at),
    }
}

fn parse_version(version: &str) -> Option<semver::Version> {
    semver::Version::parse(clean_version_string(version)).ok()
}

/// Strip surrounding whitespace and a leading `v`/`V`
///
/// Pre-release and build suffixes ("-rc1", "+abc123") are valid semver and kept.
fn clean_version_string(version: &str) -> &str {
    let v = version.trim();
    v.strip_prefix('v')
        .or_else(|| v.strip_prefix('V'))
        .unwrap_or(v)
}
