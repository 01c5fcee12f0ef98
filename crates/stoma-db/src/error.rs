//! Error types surfaced by the care plan store.

use std::io::ErrorKind;

use sqlx::error::DatabaseError;
use sqlx::mysql::MySqlDatabaseError;

use crate::models::{FrequencyParseError, PlanStatusParseError};

/// `ER_DBACCESS_DENIED_ERROR`: the user may not touch this database.
const ER_DBACCESS_DENIED: u16 = 1044;
/// `ER_ACCESS_DENIED_ERROR`: wrong user name or password.
const ER_ACCESS_DENIED: u16 = 1045;
/// `ER_BAD_DB_ERROR`: unknown database.
const ER_BAD_DB: u16 = 1049;
/// `ER_DATA_TOO_LONG`: a value does not fit its column (strict mode).
const ER_DATA_TOO_LONG: u16 = 1406;

/// Why a connection to the database server could not be established.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("access denied: {0}")]
    AuthDenied(String),

    #[error("connection refused: {0}")]
    Refused(String),

    #[error("connection timed out")]
    TimedOut,

    #[error("connection failed: {0}")]
    Other(String),
}

impl ConnectionError {
    /// Classify a driver error as a connection failure.
    ///
    /// Returns `None` for errors raised on an established connection
    /// (constraint violations, syntax errors and the like).
    pub fn classify(err: &sqlx::Error) -> Option<Self> {
        match err {
            sqlx::Error::Io(io) => Some(match io.kind() {
                ErrorKind::ConnectionRefused => Self::Refused(io.to_string()),
                ErrorKind::TimedOut => Self::TimedOut,
                _ => Self::Other(io.to_string()),
            }),
            sqlx::Error::PoolTimedOut => Some(Self::TimedOut),
            sqlx::Error::Tls(tls) => Some(Self::Other(tls.to_string())),
            sqlx::Error::Database(db) => match mysql_error_number(&**db) {
                Some(ER_ACCESS_DENIED | ER_DBACCESS_DENIED) => {
                    Some(Self::AuthDenied(db.message().to_owned()))
                }
                _ => None,
            },
            _ => None,
        }
    }
}

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Malformed input to a create or replace operation.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("database does not exist: {0}")]
    SchemaMissing(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match mysql_error_number(&**db) {
                Some(ER_BAD_DB) => return Self::SchemaMissing(db.message().to_owned()),
                Some(ER_DATA_TOO_LONG) => return Self::Validation(db.message().to_owned()),
                _ => {}
            }
        }
        match ConnectionError::classify(&err) {
            Some(conn) => Self::Connection(conn),
            None => Self::Database(err),
        }
    }
}

impl From<FrequencyParseError> for StoreError {
    fn from(err: FrequencyParseError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<PlanStatusParseError> for StoreError {
    fn from(err: PlanStatusParseError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// MySQL server error number, when the error came from a MySQL server.
pub fn mysql_error_number(err: &dyn DatabaseError) -> Option<u16> {
    err.try_downcast_ref::<MySqlDatabaseError>()
        .map(MySqlDatabaseError::number)
}
