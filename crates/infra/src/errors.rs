//! Conversions from infrastructure errors into domain errors.

use locus_domain::LocusError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and
/// can be converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub LocusError);

impl From<InfraError> for LocusError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        let mapped = match value {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match err.code {
                    ErrorCode::DatabaseBusy => LocusError::Database("database is busy".into()),
                    ErrorCode::DatabaseLocked => LocusError::Database("database is locked".into()),
                    ErrorCode::ConstraintViolation => {
                        LocusError::Database(format!("constraint violation: {message}"))
                    }
                    _ => LocusError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => LocusError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                LocusError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                LocusError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidQuery => LocusError::Database("invalid SQL query".into()),
            other => LocusError::Database(other.to_string()),
        };
        InfraError(mapped)
    }
}

/// Shorthand used by the database modules.
pub(crate) fn map_sql_error(err: SqlError) -> LocusError {
    LocusError::from(InfraError::from(err))
}
