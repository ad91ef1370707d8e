//! Conversions from external infrastructure errors into domain errors.

use pelagic_domain::PelagicError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub PelagicError);

impl From<InfraError> for PelagicError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<PelagicError> for InfraError {
    fn from(value: PelagicError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoPelagicError {
    fn into_pelagic(self) -> PelagicError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → PelagicError */
/* -------------------------------------------------------------------------- */

impl IntoPelagicError for SqlError {
    fn into_pelagic(self) -> PelagicError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        fn looks_like_wrong_key(message: &str) -> bool {
            let lower = message.to_ascii_lowercase();
            lower.contains("not a database") || lower.contains("encrypted")
        }

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => PelagicError::StoreIo("database is busy".into()),
                    (ErrorCode::DatabaseLocked, _) => {
                        PelagicError::StoreIo("database is locked".into())
                    }
                    (ErrorCode::DiskFull, _) => PelagicError::StoreIo("disk is full".into()),
                    (ErrorCode::ConstraintViolation, 1555 | 2067) => {
                        PelagicError::StoreIo("unique constraint violation".into())
                    }
                    (_, _) if looks_like_wrong_key(&message) => PelagicError::StoreIo(
                        "SQLCipher key rejected or database not encrypted".into(),
                    ),
                    _ => PelagicError::StoreIo(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => PelagicError::StoreIo("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                PelagicError::Decode(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                PelagicError::Decode(format!("invalid column type for {name}: {ty}"))
            }
            RE::Utf8Error(_) => PelagicError::Decode("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidPath(path) => PelagicError::StoreIo(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => PelagicError::StoreIo("invalid SQL query".into()),
            other => PelagicError::StoreIo(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        Self(value.into_pelagic())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → PelagicError */
/* -------------------------------------------------------------------------- */

impl IntoPelagicError for r2d2::Error {
    fn into_pelagic(self) -> PelagicError {
        let message = self.to_string();
        let lower = message.to_ascii_lowercase();
        if lower.contains("not a database") || lower.contains("encrypted") {
            return PelagicError::StoreIo(
                "SQLCipher key rejected or database not encrypted".into(),
            );
        }
        PelagicError::StoreIo(format!("connection pool error: {message}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        Self(value.into_pelagic())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → PelagicError */
/* -------------------------------------------------------------------------- */

impl IntoPelagicError for HttpError {
    fn into_pelagic(self) -> PelagicError {
        if self.is_timeout() {
            return PelagicError::network("HTTP request timed out");
        }

        if self.is_connect() {
            return PelagicError::network("HTTP connection failure");
        }

        if self.is_builder() {
            return PelagicError::InvalidInput(format!("invalid HTTP request: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
            return PelagicError::status(code, message);
        }

        if self.is_decode() || self.is_body() {
            return PelagicError::network(format!("failed to read response body: {self}"));
        }

        PelagicError::network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_pelagic())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
