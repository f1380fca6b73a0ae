//! # Allocate
//!
//! The transactional allocator: attaches status list coordinates to a newly
//! issued credential, rolling the affected lists over when they reach
//! capacity.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::config::MAX_CREDENTIAL_ID_LENGTH;
use crate::core::{Kind, OneMany, generate};
use crate::manager::{
    StatusManager, read_config, read_user_credential, to_value, upsert_credential_event,
};
use crate::records::{EventRecord, StatusInfo, UserCredentialRecord};
use crate::signer::CredentialSigner;
use crate::store::{Records, Store, execute_transaction};
use crate::w3c::{StatusPurpose, VerifiableCredential};
use crate::{Result, invalid, server, signer};

impl<S: Store, G: CredentialSigner + 'static> StatusManager<S, G> {
    /// Attach status entries to a credential, allocating one status list
    /// position per requested purpose.
    ///
    /// A credential whose id is already allocated gets its existing
    /// coordinates back; nothing is written. Otherwise the next position of
    /// each purpose's current list is assigned, lists at capacity are rolled
    /// over to a fresh status credential, and the user credential, audit
    /// trail, and config counters are persisted atomically.
    ///
    /// Returns the credential with `credentialStatus` embedded: an object
    /// for a single purpose, an array for several.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for compact-JWT input, an empty purpose set, an
    /// unsupported purpose, a malformed credential id, or a credential
    /// missing its core properties.
    pub async fn allocate_status(
        &self, credential: Kind<VerifiableCredential>, purposes: &[StatusPurpose],
    ) -> Result<VerifiableCredential> {
        tracing::debug!("status_manager::allocate_status");

        let Kind::Object(mut credential) = credential else {
            return Err(invalid!("compact JWT credentials are not supported"));
        };
        if purposes.is_empty() {
            return Err(invalid!("at least one status purpose must be requested"));
        }

        // normalize: previously attached status or proof does not survive
        // re-issuance
        credential.credential_status = None;
        credential.proof = None;
        match &credential.id {
            None => credential.id = Some(generate::credential_id()),
            Some(id) => validate_credential_id(id)?,
        }
        verify_shape(&credential)?;

        let _permit =
            self.limiter.acquire().await.map_err(|_| server!("concurrency limiter closed"))?;

        let this = self.clone();
        let purposes = purposes.to_vec();
        execute_transaction(&self.store, move |txn| {
            let this = this.clone();
            let credential = credential.clone();
            let purposes = purposes.clone();
            Box::pin(async move { this.allocate_in_txn(txn, credential, &purposes).await })
        })
        .await
    }

    async fn allocate_in_txn(
        &self, txn: &mut S::Txn, mut credential: VerifiableCredential,
        purposes: &[StatusPurpose],
    ) -> Result<VerifiableCredential> {
        let opts = &self.options;
        let credential_id = credential.id.clone().unwrap_or_default();

        let mut config = read_config(txn, &opts.config_table_name).await?;

        // a credential seen before keeps its coordinates; no tables change
        if let Some(existing) =
            read_user_credential(txn, &opts.user_credential_table_name, &credential_id).await?
        {
            credential.credential_status = Some(self.compose_status_entries(&existing.status_info));
            if opts.sign_user_credential {
                signer::sign(&mut credential, &*self.signer)
                    .await
                    .map_err(|e| server!("issue signing credential: {e}"))?;
            }
            return Ok(credential);
        }

        // take the next position of each purpose's current list, rolling
        // over at capacity
        let mut rolled = Vec::new();
        let mut status_info = BTreeMap::new();
        for purpose in purposes {
            let Some(info) = config.status_credential_info.get_mut(purpose) else {
                return Err(invalid!("unsupported status purpose: {purpose}"));
            };

            if info.latest_credentials_issued_counter >= opts.list_size {
                info.latest_credentials_issued_counter = 0;
                info.latest_status_credential_id = generate::status_credential_id();
                info.status_credentials_counter += 1;
                rolled.push(*purpose);
            }

            // positions are 1-based; index 0 is reserved
            info.latest_credentials_issued_counter += 1;
            status_info.insert(*purpose, StatusInfo {
                status_credential_id: info.latest_status_credential_id.clone(),
                status_list_index: info.latest_credentials_issued_counter,
                valid: true,
            });
        }

        credential.credential_status = Some(self.compose_status_entries(&status_info));
        config.credentials_issued_counter += 1;

        if opts.sign_user_credential {
            signer::sign(&mut credential, &*self.signer)
                .await
                .map_err(|e| server!("issue signing credential: {e}"))?;
        }

        for purpose in rolled {
            let id = config.status_credential_info[&purpose].latest_status_credential_id.clone();
            let record = self.new_status_credential(&id, purpose).await?;
            txn.create(&opts.status_credential_table_name, to_value(&record)?).await?;
        }

        let user = UserCredentialRecord {
            id: credential_id.clone(),
            issuer: credential.issuer_id().to_string(),
            subject: subject_id(&credential),
            status_info,
        };
        txn.create(&opts.user_credential_table_name, to_value(&user)?).await?;

        for purpose in purposes {
            let event = EventRecord {
                id: generate::record_id(),
                timestamp: chrono::Utc::now(),
                credential_id: credential_id.clone(),
                status_purpose: *purpose,
                valid: true,
            };
            txn.create(&opts.event_table_name, to_value(&event)?).await?;
            upsert_credential_event(txn, &opts.credential_event_table_name, &credential_id, &event.id)
                .await?;
        }

        txn.update(&opts.config_table_name, "id", &config.id, to_value(&config)?).await?;

        Ok(credential)
    }
}

fn subject_id(credential: &VerifiableCredential) -> Option<String> {
    match &credential.credential_subject {
        OneMany::One(subject) => subject.id.clone(),
        OneMany::Many(subjects) => subjects.first().and_then(|subject| subject.id.clone()),
    }
}

fn validate_credential_id(id: &str) -> Result<()> {
    if id.len() > MAX_CREDENTIAL_ID_LENGTH {
        return Err(invalid!(
            "credential id must not exceed {MAX_CREDENTIAL_ID_LENGTH} characters"
        ));
    }

    let is_url = id.starts_with("http://") || id.starts_with("https://");
    let is_did = id.starts_with("did:");
    let is_uuid = id
        .strip_prefix("urn:uuid:")
        .map_or_else(|| Uuid::parse_str(id).is_ok(), |uuid| Uuid::parse_str(uuid).is_ok());
    if !(is_url || is_did || is_uuid) {
        return Err(invalid!("credential id must be a URL, UUID, or DID"));
    }

    Ok(())
}

fn verify_shape(credential: &VerifiableCredential) -> Result<()> {
    if credential.context.is_empty() {
        return Err(invalid!("credential is missing `@context`"));
    }
    match &credential.type_ {
        OneMany::One(type_) if type_.is_empty() => {
            return Err(invalid!("credential is missing `type`"));
        }
        OneMany::Many(types) if types.is_empty() => {
            return Err(invalid!("credential is missing `type`"));
        }
        _ => {}
    }
    if credential.issuer_id().is_empty() {
        return Err(invalid!("credential is missing `issuer`"));
    }
    let has_subject = match &credential.credential_subject {
        OneMany::One(subject) => !subject.is_empty(),
        OneMany::Many(subjects) => subjects.iter().any(|subject| !subject.is_empty()),
    };
    if !has_subject {
        return Err(invalid!("credential is missing `credentialSubject`"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_id_formats() {
        validate_credential_id("https://credentials.example.edu/3732").expect("url accepted");
        validate_credential_id("did:example:abcdef").expect("did accepted");
        validate_credential_id("urn:uuid:9f9ad18f-a9a0-4072-a7a8-37b4f23b26e7")
            .expect("urn uuid accepted");
        validate_credential_id("9f9ad18f-a9a0-4072-a7a8-37b4f23b26e7").expect("bare uuid accepted");

        assert!(validate_credential_id("not an identifier").is_err());
        assert!(validate_credential_id(&format!("https://example.edu/{}", "x".repeat(64))).is_err());
    }
}
