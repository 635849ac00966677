//! Error taxonomy shared by the store and the request handlers

use thiserror::Error;

/// Every failure is terminal for the request that produced it; nothing retries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FleetError {
    /// The addressed entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Duplicate serial number, or a delete blocked by dependent rows
    #[error("{0}")]
    Conflict(String),

    /// Missing or inconsistent input
    #[error("{0}")]
    Validation(String),

    /// A write that should have succeeded did not
    #[error("internal error: {0}")]
    Internal(String),
}

impl FleetError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type FleetResult<T> = Result<T, FleetError>;
