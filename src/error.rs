//! # Errors
//!
//! This module defines the errors surfaced by the status manager and its
//! store. Each variant corresponds to one error kind a caller can act on;
//! the message carries the detail.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status manager errors.
#[derive(Error, Debug, Deserialize, Serialize)]
#[serde(tag = "error", content = "error_description", rename_all = "camelCase")]
pub enum Error {
    /// The request is malformed: invalid configuration, a compact-JWT
    /// credential where an object is required, an unknown status purpose,
    /// an illegal re-activation of a revoked credential, or a malformed
    /// credential id.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The referenced record does not exist: unknown credential id or a
    /// missing config row.
    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent writer beat this transaction to a record or unique key.
    /// Retried automatically by [`crate::store::execute_transaction`].
    #[error("write conflict: {0}")]
    WriteConflict(String),

    /// The database engine invalidated the transaction mid-flight (for
    /// example "NoSuchTransaction" or "CursorNotFound"). Transient; retried
    /// automatically.
    #[error("invalid database transaction: {0}")]
    InvalidDatabaseTransaction(String),

    /// No status list index remains available for allocation. Surfaced by
    /// store backends that shard index pools; retried so a roll-over can be
    /// observed.
    #[error("status list capacity reached: {0}")]
    StatusListCapacity(String),

    /// The database contents failed the integrity check.
    #[error("invalid database state: {0}")]
    InvalidDatabaseState(String),

    /// The configured DID seed could not be decoded or is shorter than 32
    /// bytes.
    #[error("invalid DID seed: {0}")]
    InvalidDidSeed(String),

    /// The database rejected the configured credentials.
    #[error("invalid database credentials: {0}")]
    InvalidCredentials(String),

    /// The configured database does not exist.
    #[error("missing database: {0}")]
    MissingDatabase(String),

    /// A required table does not exist in the database.
    #[error("missing database table: {0}")]
    MissingDatabaseTable(String),

    /// An unexpected error raised by a collaborator (signer, codec, store
    /// engine).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a transaction that failed with this error should be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WriteConflict(_) | Self::InvalidDatabaseTransaction(_) | Self::StatusListCapacity(_)
        )
    }
}

/// Shorthand for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Construct an `Error::BadRequest` from a format string.
#[macro_export]
macro_rules! invalid {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::BadRequest(format!($fmt, $($arg)*))
    };
    ($err:expr $(,)?) => {
        $crate::Error::BadRequest(format!($err))
    };
}

/// Construct an `Error::Internal` from a format string or an existing error
/// value.
#[macro_export]
macro_rules! server {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Internal(format!($fmt, $($arg)*))
    };
    ($err:expr $(,)?) => {
        $crate::Error::Internal(format!($err))
    };
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn retryable() {
        assert!(Error::WriteConflict("id exists".into()).is_retryable());
        assert!(Error::InvalidDatabaseTransaction("NoSuchTransaction".into()).is_retryable());
        assert!(Error::StatusListCapacity("2 indices remain".into()).is_retryable());
        assert!(!invalid!("no purposes requested").is_retryable());
        assert!(!server!("signer unavailable").is_retryable());
    }

    #[test]
    fn serialize_kind() {
        let err = Error::NotFound("credential abc".into());
        let ser = serde_json::to_value(&err).expect("should serialize");
        assert_eq!(ser, json!({"error": "notFound", "error_description": "credential abc"}));
    }
}
