//! Error types for database manager operations.
//!
//! Engine errors are classified when they cross into this crate: lock
//! timeouts become [`Error::Busy`], constraint violations become
//! [`Error::Constraint`], and everything else stays [`Error::Sqlite`] with
//! the original engine message intact.

use std::path::PathBuf;

use databased_core::ValidationError;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur while managing or querying a database.
#[derive(Debug, Error)]
pub enum Error {
    /// The database file could not be opened or created.
    #[error("failed to open database at '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A lock could not be acquired within the configured timeout.
    #[error("database is busy: {0}")]
    Busy(#[source] rusqlite::Error),

    /// A uniqueness, foreign-key, not-null, or check constraint was violated.
    #[error("constraint violation: {0}")]
    Constraint(#[source] rusqlite::Error),

    /// Any other engine-reported failure (malformed SQL, type mismatch, ...).
    #[error("database error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    /// `commit()` was called with no open connection.
    #[error("not connected: commit requires an open connection")]
    NotConnected,

    /// The caller broke an operation's contract.
    #[error("invalid request: {0}")]
    Misuse(String),

    /// A table or column name cannot be used as an identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] ValidationError),

    /// File-system failure around the database file or a dump file.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for constraint violations.
    pub fn is_constraint(&self) -> bool {
        matches!(self, Error::Constraint(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Error::Busy(err),
            Some(ErrorCode::ConstraintViolation) => Error::Constraint(err),
            _ => Error::Sqlite(err),
        }
    }
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
