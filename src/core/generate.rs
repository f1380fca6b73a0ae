//! # Identifier Generation
//!
//! Random identifiers used by the status manager.

use rand::Rng;
use rand::distr::Alphanumeric;
use uuid::Uuid;

/// Length of a generated status credential id.
const STATUS_CREDENTIAL_ID_LENGTH: usize = 20;

/// Generate a status credential id: 20 characters drawn uniformly from
/// `[A-Za-z0-9]`.
///
/// Collisions are astronomically unlikely, but the store's unique-key
/// constraint still guards the insert.
#[must_use]
pub fn status_credential_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(STATUS_CREDENTIAL_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Generate a credential id for a credential submitted without one.
#[must_use]
pub fn credential_id() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

/// Generate a record id.
#[must_use]
pub fn record_id() -> String {
    Uuid::new_v4().to_string()
}
