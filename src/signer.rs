//! # Signing
//!
//! Signing material and the narrow seam through which credentials are
//! signed. DID resolution and full Linked-Data proof suites are external
//! concerns; the manager only needs an issuer DID, a verification method,
//! and raw signatures.

use std::fmt;

use chrono::Utc;
use ed25519_dalek::{Signer as _, SigningKey};
use multibase::Base;
use serde::{Deserialize, Serialize};

use crate::core::OneMany;
use crate::w3c::{Proof, VerifiableCredential};
use crate::{Error, Result, invalid};

/// Multicodec prefix for an Ed25519 public key.
const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

/// Supported DID methods for the issuer identity.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DidMethod {
    /// `did:key` — the DID is derived from the public key alone.
    #[default]
    Key,

    /// `did:web` — the DID is derived from a URL the issuer controls.
    Web,
}

/// A signer for credentials produced by the status manager.
///
/// Implemented by [`Keyring`]; deployments with external key custody can
/// provide their own implementation.
pub trait CredentialSigner: Send + Sync {
    /// The DID of the issuer controlling the signing key.
    fn controller(&self) -> &str;

    /// The DID URL of the verification method.
    fn verification_method(&self) -> &str;

    /// Sign the message, returning the raw signature bytes.
    fn try_sign(&self, msg: &[u8]) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;
}

/// Ed25519 signing material derived from a DID seed.
#[derive(Clone)]
pub struct Keyring {
    signing_key: SigningKey,
    did: String,
    verification_method: String,
}

impl Keyring {
    /// Derive signing material from a DID method and seed.
    ///
    /// The seed is multibase-decoded when it carries a multibase prefix,
    /// otherwise its raw bytes are used. The first 32 bytes feed the Ed25519
    /// key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDidSeed` if fewer than 32 seed bytes are available,
    /// and `BadRequest` if `did_web_url` is missing for the `web` method.
    pub fn new(method: DidMethod, seed: &str, did_web_url: Option<&str>) -> Result<Self> {
        let seed_bytes = decode_seed(seed)?;
        let key_bytes: [u8; 32] = seed_bytes[..32]
            .try_into()
            .map_err(|_| Error::InvalidDidSeed("seed must be at least 32 bytes".to_string()))?;
        let signing_key = SigningKey::from_bytes(&key_bytes);

        let mut multicodec = ED25519_CODEC.to_vec();
        multicodec.extend_from_slice(&signing_key.verifying_key().to_bytes());
        let key_id = multibase::encode(Base::Base58Btc, &multicodec);

        let did = match method {
            DidMethod::Key => format!("did:key:{key_id}"),
            DidMethod::Web => {
                let Some(url) = did_web_url else {
                    return Err(invalid!("`didWebUrl` is required for the web DID method"));
                };
                web_did(url)
            }
        };
        let verification_method = format!("{did}#{key_id}");

        Ok(Self {
            signing_key,
            did,
            verification_method,
        })
    }
}

impl CredentialSigner for Keyring {
    fn controller(&self) -> &str {
        &self.did
    }

    fn verification_method(&self) -> &str {
        &self.verification_method
    }

    async fn try_sign(&self, msg: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(self.signing_key.sign(msg).to_bytes().to_vec())
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring").field("did", &self.did).finish_non_exhaustive()
    }
}

/// Sign the credential in place, replacing any existing proof.
///
/// # Errors
///
/// Returns an error if the credential cannot be serialized or the signer
/// fails.
pub async fn sign(
    credential: &mut VerifiableCredential, signer: &impl CredentialSigner,
) -> anyhow::Result<()> {
    credential.proof = None;
    let payload = serde_json::to_vec(&credential)?;
    let signature = signer.try_sign(&payload).await?;

    credential.proof = Some(OneMany::One(Proof {
        type_: "Ed25519Signature2020".to_string(),
        created: Some(Utc::now()),
        verification_method: signer.verification_method().to_string(),
        proof_purpose: "assertionMethod".to_string(),
        proof_value: multibase::encode(Base::Base58Btc, &signature),
    }));

    Ok(())
}

fn decode_seed(seed: &str) -> Result<Vec<u8>> {
    let bytes = multibase::decode(seed).map_or_else(|_| seed.as_bytes().to_vec(), |(_, b)| b);
    if bytes.len() < 32 {
        return Err(Error::InvalidDidSeed("seed must decode to at least 32 bytes".to_string()));
    }
    Ok(bytes)
}

fn web_did(url: &str) -> String {
    let trimmed = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
        .trim_end_matches('/');
    format!("did:web:{}", trimmed.replace(':', "%3A").replace('/', ":"))
}

#[cfg(test)]
mod tests {
    use crate::core::Kind;
    use crate::w3c::CredentialSubject;

    use super::*;

    const SEED: &str = "DsnrHBHFQP0ab59dQELh3uEwy7i5ArcOTwxkwRO2hM87CBRGWBEChPO7AjmwkAZ2";

    #[test]
    fn key_did_derivation() {
        let keyring = Keyring::new(DidMethod::Key, SEED, None).expect("should derive");
        assert!(keyring.controller().starts_with("did:key:z6Mk"));
        assert!(keyring.verification_method().starts_with(keyring.controller()));
        assert!(keyring.verification_method().contains('#'));
    }

    #[test]
    fn web_did_derivation() {
        let keyring = Keyring::new(DidMethod::Web, SEED, Some("https://example.edu/issuers/14"))
            .expect("should derive");
        assert_eq!(keyring.controller(), "did:web:example.edu:issuers:14");
    }

    #[test]
    fn web_requires_url() {
        let Err(Error::BadRequest(_)) = Keyring::new(DidMethod::Web, SEED, None) else {
            panic!("should require didWebUrl");
        };
    }

    #[test]
    fn short_seed_rejected() {
        let Err(Error::InvalidDidSeed(_)) = Keyring::new(DidMethod::Key, "too-short", None) else {
            panic!("should reject short seed");
        };
    }

    #[tokio::test]
    async fn sign_attaches_proof() {
        let keyring = Keyring::new(DidMethod::Key, SEED, None).expect("should derive");

        let mut vc = VerifiableCredential {
            id: Some("https://credentials.example.edu/3732".to_string()),
            issuer: Kind::String(keyring.controller().to_string()),
            credential_subject: OneMany::One(CredentialSubject {
                id: Some("did:example:abcdef".to_string()),
                ..CredentialSubject::default()
            }),
            ..VerifiableCredential::default()
        };
        sign(&mut vc, &keyring).await.expect("should sign");

        let Some(OneMany::One(proof)) = &vc.proof else {
            panic!("should have a single proof");
        };
        assert_eq!(proof.type_, "Ed25519Signature2020");
        assert_eq!(proof.proof_purpose, "assertionMethod");
        assert_eq!(proof.verification_method, keyring.verification_method());
        assert!(proof.proof_value.starts_with('z'));
    }
}
