//! # Configuration
//!
//! Bootstrap options and the constants governing list sizing, identifier
//! shapes, and the concurrency/retry envelope.

use std::time::Duration;

use serde::Deserialize;

use crate::Result;
use crate::invalid;
use crate::signer::DidMethod;
use crate::store::mem::ConnectOptions;
use crate::w3c::StatusPurpose;

/// Number of positions in a status list.
pub const LIST_SIZE: usize = 100_000;

/// Maximum accepted length of a caller-supplied credential id.
pub const MAX_CREDENTIAL_ID_LENGTH: usize = 64;

/// Default bound on concurrently in-flight transactions.
pub const CONCURRENCY_LIMIT: usize = 200;

/// Deadline for a transaction, including its retries.
pub const MAX_TRANSACTION_TIME: Duration = Duration::from_secs(30 * 60);

/// Upper bound (exclusive) of the uniform random retry backoff, in
/// milliseconds.
pub const RETRY_BACKOFF_MS: u64 = 1000;

/// How long a cached database client remains usable.
pub const CLIENT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Status manager bootstrap options.
///
/// Field names mirror the wire configuration, so a deployment can
/// deserialize its config file straight into this type.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// URL prefix under which status credentials are served. Required;
    /// immutable once persisted.
    pub status_credential_site_origin: String,

    /// Table holding status credential records.
    pub status_credential_table_name: String,

    /// Table holding user credential records.
    pub user_credential_table_name: String,

    /// Table holding audit events.
    pub event_table_name: String,

    /// Table indexing credentials to their latest event.
    pub credential_event_table_name: String,

    /// Table holding the singleton config record.
    pub config_table_name: String,

    /// Database name.
    pub database_name: String,

    /// Database connection URL. Takes precedence over host/port addressing.
    pub database_url: Option<String>,

    /// Database host, used when `database_url` is not set.
    pub database_host: Option<String>,

    /// Database port, used when `database_url` is not set.
    pub database_port: Option<u16>,

    /// Database username.
    pub database_username: Option<String>,

    /// Database password.
    pub database_password: Option<String>,

    /// DID method for the issuer identity.
    pub did_method: DidMethod,

    /// Seed the issuer's signing key is derived from: multibase-encoded, or
    /// at least 32 raw bytes.
    pub did_seed: String,

    /// URL backing the issuer DID. Required when `did_method` is `web`.
    pub did_web_url: Option<String>,

    /// Whether status credentials are signed. Defaults to true.
    pub sign_status_credential: bool,

    /// Whether issued credentials are signed when status is attached.
    /// Defaults to false.
    pub sign_user_credential: bool,

    /// The status purposes this deployment allocates.
    pub status_purposes: Vec<StatusPurpose>,

    /// Number of positions per status list. The default suits production;
    /// tests shrink it to exercise roll-over.
    pub list_size: usize,

    /// Bound on concurrently in-flight transactions.
    pub concurrency_limit: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            status_credential_site_origin: String::new(),
            status_credential_table_name: "StatusCredential".to_string(),
            user_credential_table_name: "UserCredential".to_string(),
            event_table_name: "Event".to_string(),
            credential_event_table_name: "CredentialEvent".to_string(),
            config_table_name: "Config".to_string(),
            database_name: "credentialStatus".to_string(),
            database_url: None,
            database_host: None,
            database_port: None,
            database_username: None,
            database_password: None,
            did_method: DidMethod::Key,
            did_seed: String::new(),
            did_web_url: None,
            sign_status_credential: true,
            sign_user_credential: false,
            status_purposes: vec![StatusPurpose::Revocation, StatusPurpose::Suspension],
            list_size: LIST_SIZE,
            concurrency_limit: CONCURRENCY_LIMIT,
        }
    }
}

impl Options {
    /// Check the options are usable before connecting anything.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` describing the first offending option.
    pub fn validate(&self) -> Result<()> {
        if !self.status_credential_site_origin.starts_with("http://")
            && !self.status_credential_site_origin.starts_with("https://")
        {
            return Err(invalid!("`statusCredentialSiteOrigin` must be an http(s) URL"));
        }
        if self.status_purposes.is_empty() {
            return Err(invalid!("at least one status purpose must be configured"));
        }
        if self.list_size == 0 {
            return Err(invalid!("`listSize` must be at least 1"));
        }
        if self.concurrency_limit == 0 {
            return Err(invalid!("`concurrencyLimit` must be at least 1"));
        }
        if self.did_method == DidMethod::Web && self.did_web_url.is_none() {
            return Err(invalid!("`didWebUrl` is required for the web DID method"));
        }
        Ok(())
    }

    /// The site origin without any trailing slash.
    #[must_use]
    pub fn site_origin(&self) -> &str {
        self.status_credential_site_origin.trim_end_matches('/')
    }

    /// Connection settings for the bundled in-memory store.
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            url: self.database_url.clone(),
            host: self.database_host.clone(),
            port: self.database_port,
            username: self.database_username.clone(),
            password: self.database_password.clone(),
            database: self.database_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::default();
        assert_eq!(options.status_credential_table_name, "StatusCredential");
        assert_eq!(options.database_name, "credentialStatus");
        assert_eq!(options.list_size, LIST_SIZE);
        assert!(options.sign_status_credential);
        assert!(!options.sign_user_credential);
    }

    #[test]
    fn origin_required() {
        let options = Options {
            did_seed: "a".repeat(32),
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn web_method_requires_url() {
        let options = Options {
            status_credential_site_origin: "https://credentials.example.edu/status".to_string(),
            did_method: DidMethod::Web,
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn deserializes_wire_names() {
        let options: Options = serde_json::from_value(serde_json::json!({
            "statusCredentialSiteOrigin": "https://credentials.example.edu/status",
            "didMethod": "key",
            "didSeed": "DsnrHBHFQP0ab59dQELh3uEwy7i5ArcOTwxkwRO2hM87CBRGWBEChPO7AjmwkAZ2",
            "statusPurposes": ["revocation"]
        }))
        .expect("should deserialize");

        assert_eq!(options.status_purposes, vec![StatusPurpose::Revocation]);
        assert_eq!(options.site_origin(), "https://credentials.example.edu/status");
        options.validate().expect("should validate");
    }
}
