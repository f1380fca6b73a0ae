//! Shared test fixtures.
#![allow(dead_code)]

use credibil_status::bitstring::StatusList;
use credibil_status::w3c::VerifiableCredential;
use credibil_status::{Kind, Options};

/// The site origin used across scenarios.
pub const ORIGIN: &str = "https://credentials.example.edu/status";

/// Issuer DID seed used across scenarios.
pub const DID_SEED: &str = "DsnrHBHFQP0ab59dQELh3uEwy7i5ArcOTwxkwRO2hM87CBRGWBEChPO7AjmwkAZ2";

/// Bootstrap options against an isolated in-memory database.
pub fn options(tag: &str) -> Options {
    Options {
        status_credential_site_origin: ORIGIN.to_string(),
        did_seed: DID_SEED.to_string(),
        database_url: Some(format!("mem://{tag}")),
        ..Options::default()
    }
}

/// A minimal well-formed credential with the given id.
pub fn sample_credential(id: &str) -> Kind<VerifiableCredential> {
    let credential = serde_json::from_value(serde_json::json!({
        "@context": ["https://www.w3.org/ns/credentials/v2"],
        "id": id,
        "type": ["VerifiableCredential", "EmployeeIDCredential"],
        "issuer": "did:example:issuer",
        "credentialSubject": {"id": "did:example:abcdef"}
    }))
    .expect("should deserialize");

    Kind::Object(credential)
}

/// Decode the bitstring carried by a status credential.
pub fn decode_list(status_credential: &VerifiableCredential) -> StatusList {
    let subject = status_credential.credential_subject.as_one().expect("should have one subject");
    let encoded = subject.claims["encodedList"].as_str().expect("should have an encoded list");
    StatusList::decode(encoded).expect("should decode")
}
