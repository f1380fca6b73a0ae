//! An issuer-side credential status manager for W3C Verifiable Credentials
//! implementing the [Bitstring Status List](https://www.w3.org/TR/vc-bitstring-status-list/)
//! mechanism.
//!
//! For each credential an issuer mints, the manager allocates a unique
//! `(statusListCredential, statusListIndex)` coordinate into a
//! bitstring-backed status credential, embeds the `credentialStatus` object
//! into the credential, and later flips bits in the bitstring to revoke or
//! suspend the credential. A relying party dereferences the
//! `statusListCredential` URL, decodes the bitstring, and reads the bit at
//! `statusListIndex`.
//!
//! # Example
//!
//! ```no_run
//! use credibil_status::{Kind, Options, create_status_manager};
//!
//! # async fn example() -> credibil_status::Result<()> {
//! let manager = create_status_manager(Options {
//!     status_credential_site_origin: "https://credentials.example.edu/status".to_string(),
//!     did_seed: "DsnrHBHFQP0ab59dQELh3uEwy7i5ArcOTwxkwRO2hM87CBRGWBEChPO7AjmwkAZ2".to_string(),
//!     ..Options::default()
//! })
//! .await?;
//!
//! let credential = serde_json::from_str(r#"{
//!     "@context": ["https://www.w3.org/ns/credentials/v2"],
//!     "id": "https://credentials.example.edu/3732",
//!     "type": ["VerifiableCredential"],
//!     "issuer": "did:example:issuer",
//!     "credentialSubject": {"id": "did:example:abcdef"}
//! }"#)
//! .map_err(|e| credibil_status::Error::BadRequest(e.to_string()))?;
//!
//! let credential = manager.allocate_revocation_status(Kind::Object(credential)).await?;
//! manager.revoke_credential("https://credentials.example.edu/3732").await?;
//! # Ok(())
//! # }
//! ```

pub mod bitstring;
pub mod config;
pub mod core;
mod error;
pub mod manager;
pub mod records;
pub mod signer;
pub mod store;
pub mod w3c;

pub use crate::config::Options;
pub use crate::core::{Kind, OneMany};
pub use crate::error::{Error, Result};
pub use crate::manager::{DatabaseState, StatusManager, UpdateRequest, create_status_manager};
pub use crate::w3c::StatusPurpose;
