//! # Bitstring Status List
//!
//! The bitstring codec backing status credentials, and the factory that
//! composes a status list credential around an encoded list. Follows the
//! specification [Bitstring Status List v1.0](https://www.w3.org/TR/vc-bitstring-status-list/).

use std::io::{Read, Write};

use anyhow::anyhow;
use base64ct::{Base64UrlUnpadded, Encoding};
use bitvec::order::Msb0;
use bitvec::vec::BitVec;
use chrono::Utc;
use serde_json::{Map, Value};

use crate::core::{Kind, OneMany};
use crate::w3c::{
    CREDENTIALS_CONTEXT_V2, CredentialSubject, StatusPurpose, VerifiableCredential,
};

/// A status list: one bit per issued credential, bit `0` at the left-most
/// position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusList {
    bits: BitVec<u8, Msb0>,
}

impl StatusList {
    /// Create a list of `len` bits, all unset.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, len),
        }
    }

    /// The number of positions in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns `true` if the list has no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Set the status bit at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range of the list.
    pub fn set_status(&mut self, index: usize, value: bool) -> anyhow::Result<()> {
        if index >= self.bits.len() {
            return Err(anyhow!("status index {index} out of range"));
        }
        self.bits.set(index, value);
        Ok(())
    }

    /// Read the status bit at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range of the list.
    pub fn get_status(&self, index: usize) -> anyhow::Result<bool> {
        self.bits
            .get(index)
            .map(|bit| *bit)
            .ok_or_else(|| anyhow!("status index {index} out of range"))
    }

    /// Generate the compressed, encoded representation of the list.
    ///
    /// The bitstring bytes are GZIP-compressed and base64url-encoded without
    /// padding. The first index is located at the left-most bit.
    ///
    /// # Errors
    ///
    /// Returns an error if there is a compression problem.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut gz_encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz_encoder.write_all(self.bits.as_raw_slice())?;
        let compressed = gz_encoder.finish()?;

        Ok(Base64UrlUnpadded::encode_string(&compressed))
    }

    /// Decode a list previously produced by [`StatusList::encode`].
    ///
    /// The decoded length is a whole number of bytes, so it may exceed the
    /// originally requested length by up to 7 unset positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not unpadded base64url or not a
    /// GZIP stream.
    pub fn decode(encoded: &str) -> anyhow::Result<Self> {
        let compressed = Base64UrlUnpadded::decode_vec(encoded)
            .map_err(|e| anyhow!("issue decoding base64url: {e}"))?;

        let mut gz_decoder = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut bytes = Vec::new();
        gz_decoder.read_to_end(&mut bytes)?;

        Ok(Self {
            bits: BitVec::from_vec(bytes),
        })
    }
}

/// Generates a bitstring status list credential wrapping the provided list.
///
/// The credential is suitable for publishing on an endpoint for verifiers to
/// check, once the caller has signed it.
///
/// # Errors
///
/// Returns an error if the list cannot be encoded.
pub fn credential(
    issuer_did: &str, credential_id: &str, purpose: StatusPurpose, status_list: &StatusList,
) -> anyhow::Result<VerifiableCredential> {
    let mut claims = Map::new();
    claims.insert("type".to_string(), Value::String("BitstringStatusList".to_string()));
    claims.insert("statusPurpose".to_string(), Value::String(purpose.to_string()));
    claims.insert("encodedList".to_string(), Value::String(status_list.encode()?));

    Ok(VerifiableCredential {
        context: vec![Kind::String(CREDENTIALS_CONTEXT_V2.to_string())],
        id: Some(credential_id.to_string()),
        type_: OneMany::Many(vec![
            "VerifiableCredential".to_string(),
            "BitstringStatusListCredential".to_string(),
        ]),
        issuer: Kind::String(issuer_did.to_string()),
        credential_subject: OneMany::One(CredentialSubject {
            id: Some(format!("{credential_id}#list")),
            claims,
        }),
        valid_from: Some(Utc::now()),
        ..VerifiableCredential::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_read_round_trip() {
        let mut list = StatusList::new(16);
        list.set_status(1, true).expect("should set");
        list.set_status(9, true).expect("should set");

        let encoded = list.encode().expect("should encode");
        let decoded = StatusList::decode(&encoded).expect("should decode");

        assert!(decoded.get_status(1).expect("in range"));
        assert!(decoded.get_status(9).expect("in range"));
        assert!(!decoded.get_status(0).expect("in range"));
        assert!(!decoded.get_status(15).expect("in range"));
    }

    #[test]
    fn index_out_of_range() {
        let mut list = StatusList::new(8);
        assert!(list.set_status(8, true).is_err());
        assert!(list.get_status(8).is_err());
    }

    #[test]
    fn factory_shape() {
        let list = StatusList::new(8);
        let vc = credential(
            "did:example:issuer",
            "https://credentials.example.edu/status/Uz42qSDS0A48IDllq7s8",
            StatusPurpose::Suspension,
            &list,
        )
        .expect("should compose");

        let OneMany::Many(types) = &vc.type_ else {
            panic!("type should be an array");
        };
        assert!(types.iter().any(|t| t == "BitstringStatusListCredential"));

        let subject = vc.credential_subject.as_one().expect("one subject");
        assert_eq!(
            subject.id.as_deref(),
            Some("https://credentials.example.edu/status/Uz42qSDS0A48IDllq7s8#list")
        );
        assert_eq!(subject.claims["type"], "BitstringStatusList");
        assert_eq!(subject.claims["statusPurpose"], "suspension");

        let encoded = subject.claims["encodedList"].as_str().expect("encoded list");
        assert_eq!(StatusList::decode(encoded).expect("should decode"), list);
        assert!(vc.valid_from.is_some());
    }
}
