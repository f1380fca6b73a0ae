//! # Records
//!
//! The durable record types persisted by the status manager: one table per
//! type, JSON documents on the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::Kind;
use crate::w3c::{StatusPurpose, VerifiableCredential};

/// One row per bitstring status list.
///
/// Created at bootstrap (one per supported purpose) and on roll-over;
/// mutated whenever one of its bits flips; never deleted.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCredentialRecord {
    /// Opaque 20-character alphanumeric token, unique.
    pub id: String,

    /// The purpose encoded by the list's bits.
    pub purpose: StatusPurpose,

    /// The status list credential itself.
    pub credential: Kind<VerifiableCredential>,
}

/// Coordinates of one credential in one purpose's status list.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    /// The status credential holding this credential's bit.
    pub status_credential_id: String,

    /// The credential's position in the bitstring. Positions start at 1;
    /// index 0 is reserved.
    pub status_list_index: usize,

    /// Whether the credential is currently valid for this purpose.
    pub valid: bool,
}

/// One row per issued credential.
///
/// Created on first allocation for the credential id; mutated when status
/// flips; never deleted.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserCredentialRecord {
    /// The credential id: a URL, UUID, or DID.
    pub id: String,

    /// The issuer DID.
    pub issuer: String,

    /// The subject DID, when the credential names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Allocated coordinates, by purpose.
    pub status_info: BTreeMap<StatusPurpose, StatusInfo>,
}

/// Append-only audit row: one per status-affecting operation and purpose.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Event id (UUID).
    pub id: String,

    /// When the event was committed.
    pub timestamp: DateTime<Utc>,

    /// The credential the event concerns.
    pub credential_id: String,

    /// The purpose whose status changed.
    pub status_purpose: StatusPurpose,

    /// The credential's validity for the purpose after this event.
    pub valid: bool,
}

/// Index from a credential id to its latest event.
///
/// Created with the first event for a credential; replaced on every
/// subsequent event.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEventRecord {
    /// The credential id, unique.
    pub credential_id: String,

    /// The most recently committed event for the credential.
    pub event_id: String,
}

/// Allocation state for one purpose's current status list.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PurposeInfo {
    /// The status credential currently receiving allocations.
    pub latest_status_credential_id: String,

    /// Positions handed out from the current list, in `[0..list size]`.
    pub latest_credentials_issued_counter: usize,

    /// How many status credentials have been created for the purpose,
    /// at least 1.
    pub status_credentials_counter: usize,
}

/// The singleton configuration row.
///
/// Created once at bootstrap; mutated by the allocator on every new
/// issuance.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRecord {
    /// Record id (UUID).
    pub id: String,

    /// URL prefix under which status credentials are served. Immutable for
    /// the lifetime of a deployment.
    pub status_credential_site_origin: String,

    /// Per-purpose allocation state.
    pub status_credential_info: BTreeMap<StatusPurpose, PurposeInfo>,

    /// Total credentials issued; equals the number of user credential rows.
    pub credentials_issued_counter: usize,
}
