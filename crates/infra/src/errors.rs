//! Conversions from storage-layer errors into domain errors.
//!
//! Classification drives pass control flow: busy/locked become
//! [`NoctuaError::Contention`] (retried with backoff), an unopenable or
//! corrupt database becomes [`NoctuaError::Unavailable`] (aborts the whole
//! pass), everything else is a plain `Database` error charged to the user
//! being processed.

use noctua_domain::NoctuaError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub NoctuaError);

impl From<InfraError> for NoctuaError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<NoctuaError> for InfraError {
    fn from(value: NoctuaError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoNoctuaError {
    fn into_noctua(self) -> NoctuaError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → NoctuaError */
/* -------------------------------------------------------------------------- */

impl IntoNoctuaError for SqlError {
    fn into_noctua(self) -> NoctuaError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        NoctuaError::Contention("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        NoctuaError::Contention("database is locked".into())
                    }
                    (ErrorCode::CannotOpen, _) => {
                        NoctuaError::Unavailable(format!("cannot open database: {message}"))
                    }
                    (ErrorCode::NotADatabase, _) => {
                        NoctuaError::Unavailable(format!("file is not a database: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        NoctuaError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        NoctuaError::Database("foreign key constraint violation".into())
                    }
                    _ => NoctuaError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => NoctuaError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                NoctuaError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                NoctuaError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => NoctuaError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidParameterName(parameter_name) => {
                NoctuaError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => {
                NoctuaError::Unavailable(format!("invalid database path: {}", path.display()))
            }
            RE::InvalidQuery => NoctuaError::Database("invalid SQL query".into()),
            other => NoctuaError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_noctua())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → NoctuaError */
/* -------------------------------------------------------------------------- */

impl IntoNoctuaError for r2d2::Error {
    fn into_noctua(self) -> NoctuaError {
        // The pool reports one opaque error for both checkout timeouts and
        // connection setup failures; treat it as contention and let the
        // bounded retry (or the boot health check) surface persistent cases.
        NoctuaError::Contention(format!("connection pool error: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_noctua())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use rusqlite::ffi::{Error as FfiError, ErrorCode};

    use super::*;

    fn sqlite_failure(code: ErrorCode, extended: i32, message: &str) -> SqlError {
        SqlError::SqliteFailure(
            FfiError { code, extended_code: extended },
            Some(message.to_string()),
        )
    }

    #[test]
    fn busy_and_locked_map_to_contention() {
        for err in [
            sqlite_failure(ErrorCode::DatabaseBusy, 5, "database is locked"),
            sqlite_failure(ErrorCode::DatabaseLocked, 6, "database table is locked"),
        ] {
            let mapped: NoctuaError = InfraError::from(err).into();
            assert!(mapped.is_transient(), "expected transient, got {mapped:?}");
        }
    }

    #[test]
    fn cannot_open_maps_to_unavailable() {
        let err = sqlite_failure(ErrorCode::CannotOpen, 14, "unable to open database file");
        let mapped: NoctuaError = InfraError::from(err).into();
        assert!(mapped.is_fatal(), "expected fatal, got {mapped:?}");
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let mapped: NoctuaError = InfraError::from(SqlError::QueryReturnedNoRows).into();
        assert!(matches!(mapped, NoctuaError::NotFound(_)));
    }

    #[test]
    fn constraint_violations_are_not_transient() {
        let err = sqlite_failure(ErrorCode::ConstraintViolation, 2067, "UNIQUE constraint failed");
        let mapped: NoctuaError = InfraError::from(err).into();
        assert!(!mapped.is_transient());
        assert!(matches!(mapped, NoctuaError::Database(msg) if msg.contains("unique")));
    }
}
