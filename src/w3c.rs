//! # W3C Verifiable Credentials
//!
//! The subset of the W3C Verifiable Credentials data model the status
//! manager reads and writes: the credential envelope, the
//! `BitstringStatusListEntry` status object, and the embedded proof.
//!
//! See <https://www.w3.org/TR/vc-data-model-2.0> and
//! [Bitstring Status List v1.0](https://www.w3.org/TR/vc-bitstring-status-list/).

use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{Kind, OneMany};

/// The base context for Verifiable Credentials v2.
pub const CREDENTIALS_CONTEXT_V2: &str = "https://www.w3.org/ns/credentials/v2";

/// `VerifiableCredential` represents a naive implementation of the W3C
/// Verifiable Credential data model.
/// See <https://www.w3.org/TR/vc-data-model>.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifiableCredential {
    /// The @context property is used to map property URIs into short-form
    /// aliases. It is an ordered set where the first item is the base
    /// credentials context.
    #[serde(rename = "@context")]
    pub context: Vec<Kind<Value>>,

    /// The id property, if present, MUST be a single URL, which MAY be
    /// dereferenceable. For example,
    /// "`https://credentials.example.edu/3732`".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The type property is used to determine whether or not a provided
    /// verifiable credential is appropriate for the intended use-case. An
    /// unordered set of terms or URIs.
    #[serde(rename = "type")]
    pub type_: OneMany<String>,

    /// A URI or object with an id property identifying the credential
    /// issuer.
    pub issuer: Kind<Issuer>,

    /// A set of objects containing claims about credential subjects(s).
    pub credential_subject: OneMany<CredentialSubject>,

    /// An XMLSCHEMA11-2 (RFC3339) date-time the credential becomes valid.
    /// e.g. 2010-01-01T19:23:24Z.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,

    /// An XMLSCHEMA11-2 (RFC3339) date-time the credential ceases to be
    /// valid. e.g. 2010-06-30T19:23:24Z.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,

    /// Used to determine the status of the credential, such as whether it is
    /// suspended or revoked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<OneMany<CredentialStatus>>,

    /// One or more cryptographic proofs that can be used to detect tampering
    /// and verify authorship of a credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<OneMany<Proof>>,
}

impl VerifiableCredential {
    /// Returns a new [`VerifiableCredential`] configured with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The issuer id, regardless of whether the issuer is expressed as a
    /// URI or an object.
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        match &self.issuer {
            Kind::String(id) => id,
            Kind::Object(issuer) => &issuer.id,
        }
    }
}

/// Issuer identifies the issuer of the credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Issuer {
    /// The issuer URI. If dereferenced, it should result in a
    /// machine-readable document that can be used to verify the credential.
    pub id: String,

    /// Issuer-specific fields that may be used to express additional
    /// information about the issuer.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `CredentialSubject` holds claims about the subject(s) referenced by the
/// credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialSubject {
    /// A URI that uniquely identifies the subject of the claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Claims about the subject.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl CredentialSubject {
    /// Returns `true` when neither an id nor any claim is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.claims.is_empty()
    }
}

/// `CredentialStatus` is the `BitstringStatusListEntry` embedded in an
/// issued credential, pointing a verifier at one bit of one status list.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    /// The entry URL: `{statusListCredential}#{statusListIndex}`.
    pub id: String,

    /// Always `BitstringStatusListEntry`.
    #[serde(rename = "type")]
    pub type_: String,

    /// The purpose of the status declaration stored in the bitstring.
    pub status_purpose: StatusPurpose,

    /// A URL to a verifiable credential whose `type` includes
    /// `BitstringStatusListCredential`.
    pub status_list_credential: String,

    /// The position of the status flag in the bitstring, expressed as a
    /// decimal string.
    pub status_list_index: String,
}

/// `StatusPurpose` defines the purpose of the issuer's credential status
/// information.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "camelCase")]
pub enum StatusPurpose {
    /// Used to permanently cancel the validity of a verifiable credential.
    #[default]
    Revocation,

    /// Used to temporarily suspend the validity of a verifiable credential.
    Suspension,
}

impl Display for StatusPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revocation => write!(f, "revocation"),
            Self::Suspension => write!(f, "suspension"),
        }
    }
}

impl FromStr for StatusPurpose {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revocation" => Ok(Self::Revocation),
            "suspension" => Ok(Self::Suspension),
            _ => Err(crate::invalid!("unsupported status purpose: {s}")),
        }
    }
}

/// An embedded Data Integrity proof.
///
/// Only the fields produced by the crate's signing adapter are modelled.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Proof {
    /// The proof suite, e.g. `Ed25519Signature2020`.
    #[serde(rename = "type")]
    pub type_: String,

    /// When the proof was created.
    pub created: Option<DateTime<Utc>>,

    /// The DID URL of the verification method used to produce the proof.
    pub verification_method: String,

    /// The relationship between the verification method and the issuer,
    /// here always `assertionMethod`.
    pub proof_purpose: String,

    /// The multibase-encoded signature.
    pub proof_value: String,
}
