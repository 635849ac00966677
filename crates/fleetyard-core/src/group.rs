//! Hierarchical organizational units devices can belong to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FleetResult;
use crate::rules::require_text;

/// A device group; `parent_group_id` links it into the group tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: i64,
    pub name: String,
    pub parent_group_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Create/update payload for a group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_group_id: Option<i64>,
}

impl GroupInput {
    pub fn new(name: impl Into<String>, parent_group_id: Option<i64>) -> Self {
        Self {
            name: name.into(),
            parent_group_id,
        }
    }

    /// Trims the name and rejects blank ones
    pub fn validate(mut self) -> FleetResult<Self> {
        self.name = require_text("group name", &self.name)?;
        Ok(self)
    }
}
