//! # Integrity
//!
//! Decides whether the database contents are self-consistent. Run at
//! startup against a non-empty deployment, and available to callers and
//! tests at any time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Kind;
use crate::manager::{StatusManager, from_value};
use crate::records::{ConfigRecord, StatusCredentialRecord};
use crate::signer::CredentialSigner;
use crate::store::Store;
use crate::w3c::StatusPurpose;
use crate::{Error, Result};

/// Result of the database integrity check.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DatabaseState {
    /// Whether the database contents are self-consistent.
    pub valid: bool,

    /// What failed, when `valid` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<S: Store, G: CredentialSigner> StatusManager<S, G> {
    /// Check whether the database state is self-consistent.
    ///
    /// # Errors
    ///
    /// Returns store errors as-is; consistency failures are reported
    /// through the returned state, not as errors.
    pub async fn get_database_state(&self) -> Result<DatabaseState> {
        tracing::debug!("status_manager::get_database_state");

        match self.check_integrity().await {
            Ok(()) => Ok(DatabaseState {
                valid: true,
                error: None,
            }),
            Err(Error::InvalidDatabaseState(error)) => Ok(DatabaseState {
                valid: false,
                error: Some(error),
            }),
            Err(e) => Err(e),
        }
    }

    async fn check_integrity(&self) -> Result<()> {
        let opts = &self.options;
        let mut store = self.store.clone();

        let Some(config_value) = store.get_any(&opts.config_table_name).await? else {
            return Err(Error::InvalidDatabaseState("config record not found".to_string()));
        };
        let config: ConfigRecord = from_value(config_value)?;

        // the site origin is immutable for the lifetime of a deployment
        if config.status_credential_site_origin != opts.site_origin() {
            return Err(Error::InvalidDatabaseState(format!(
                "configured site origin `{}` does not match stored origin `{}`",
                opts.site_origin(),
                config.status_credential_site_origin
            )));
        }

        for (purpose, info) in &config.status_credential_info {
            let rows = store
                .get_all_by_field(
                    &opts.status_credential_table_name,
                    "purpose",
                    &purpose.to_string(),
                )
                .await?;

            if info.status_credentials_counter == 0 {
                return Err(Error::InvalidDatabaseState(format!(
                    "{purpose} status credential counter is zero"
                )));
            }
            if rows.len() > info.status_credentials_counter {
                return Err(Error::InvalidDatabaseState(format!(
                    "{purpose} has more status credentials than its counter allows"
                )));
            }
            if info.latest_credentials_issued_counter > opts.list_size {
                return Err(Error::InvalidDatabaseState(format!(
                    "{purpose} issued counter exceeds the list size"
                )));
            }

            let mut latest_found = false;
            for value in rows {
                let record: StatusCredentialRecord = from_value(value)?;
                verify_status_credential(&record, *purpose)?;
                latest_found |= record.id == info.latest_status_credential_id;
            }
            if !latest_found {
                return Err(Error::InvalidDatabaseState(format!(
                    "latest {purpose} status credential `{}` is missing",
                    info.latest_status_credential_id
                )));
            }
        }

        let users = store.get_all(&opts.user_credential_table_name).await?;
        if users.len() != config.credentials_issued_counter {
            return Err(Error::InvalidDatabaseState(format!(
                "{} user credentials but an issued counter of {}",
                users.len(),
                config.credentials_issued_counter
            )));
        }

        let capacity: usize = config
            .status_credential_info
            .values()
            .map(|info| {
                (info.status_credentials_counter - 1) * opts.list_size
                    + info.latest_credentials_issued_counter
            })
            .sum();
        if config.credentials_issued_counter > capacity {
            return Err(Error::InvalidDatabaseState(format!(
                "issued counter {} exceeds allocated capacity {capacity}",
                config.credentials_issued_counter
            )));
        }

        Ok(())
    }
}

fn verify_status_credential(record: &StatusCredentialRecord, purpose: StatusPurpose) -> Result<()> {
    if record.purpose != purpose {
        return Err(Error::InvalidDatabaseState(format!(
            "status credential `{}` is filed under the wrong purpose",
            record.id
        )));
    }

    let Kind::Object(credential) = &record.credential else {
        return Err(Error::InvalidDatabaseState(format!(
            "status credential `{}` is not a credential object",
            record.id
        )));
    };

    let has_type = match credential.type_.as_one() {
        Some(type_) => type_ == "BitstringStatusListCredential",
        None => credential
            .type_
            .as_many()
            .is_some_and(|types| types.iter().any(|t| t == "BitstringStatusListCredential")),
    };
    if !has_type {
        return Err(Error::InvalidDatabaseState(format!(
            "status credential `{}` is missing the BitstringStatusListCredential type",
            record.id
        )));
    }

    let Some(subject) = credential.credential_subject.as_one() else {
        return Err(Error::InvalidDatabaseState(format!(
            "status credential `{}` must have exactly one subject",
            record.id
        )));
    };
    if subject.claims.get("type").and_then(Value::as_str) != Some("BitstringStatusList") {
        return Err(Error::InvalidDatabaseState(format!(
            "status credential `{}` subject is not a BitstringStatusList",
            record.id
        )));
    }
    if subject.claims.get("statusPurpose").and_then(Value::as_str) != Some(&purpose.to_string()) {
        return Err(Error::InvalidDatabaseState(format!(
            "status credential `{}` subject carries the wrong purpose",
            record.id
        )));
    }
    if subject.claims.get("encodedList").and_then(Value::as_str).is_none() {
        return Err(Error::InvalidDatabaseState(format!(
            "status credential `{}` subject has no encoded list",
            record.id
        )));
    }

    Ok(())
}
