//! Database-specific error types and conversions

use fleetyard_core::FleetError;
use sqlx::error::DatabaseError;

/// Database-layer error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Extended result code SQLite reports when an `ON DELETE RESTRICT` action fires
const SQLITE_CONSTRAINT_TRIGGER: &str = "1811";

/// Foreign-key failures, including RESTRICT actions, which sqlx does not
/// classify as foreign-key violations
fn is_reference_violation(db_err: &dyn DatabaseError) -> bool {
    db_err.is_foreign_key_violation()
        || db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_TRIGGER)
        || db_err.message().contains("FOREIGN KEY constraint failed")
}

impl From<DbError> for FleetError {
    fn from(err: DbError) -> Self {
        if let DbError::Sqlx(sqlx::Error::Database(db_err)) = &err {
            if db_err.is_unique_violation() {
                return FleetError::conflict(format!("duplicate value: {}", db_err.message()));
            }
            if is_reference_violation(db_err.as_ref()) {
                return FleetError::conflict(
                    "operation violates a reference between records".to_string(),
                );
            }
        }
        FleetError::internal(err.to_string())
    }
}
