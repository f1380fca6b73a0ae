//! # Update
//!
//! The transactional updater: flips one credential's bit in one purpose's
//! status list, re-issues the status credential, and appends to the audit
//! trail.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bitstring::StatusList;
use crate::core::Kind;
use crate::manager::{
    StatusManager, read_status_credential, read_user_credential, to_value, upsert_credential_event,
};
use crate::records::{EventRecord, StatusCredentialRecord, StatusInfo};
use crate::signer::CredentialSigner;
use crate::store::{Records, Store, execute_transaction};
use crate::w3c::{StatusPurpose, VerifiableCredential};
use crate::{Error, Result, invalid, server};

/// A request to change one purpose's status of one credential.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    /// The credential to update.
    pub credential_id: String,

    /// The purpose whose bit is flipped.
    pub status_purpose: StatusPurpose,

    /// `true` sets the bit (revoke/suspend), `false` clears it.
    pub invalidate: bool,
}

impl<S: Store, G: CredentialSigner + 'static> StatusManager<S, G> {
    /// Flip a credential's status bit and re-issue the affected status
    /// credential.
    ///
    /// A request that matches the current state is a no-op and returns the
    /// status credential unchanged. A revoked credential cannot be
    /// re-activated for any purpose.
    ///
    /// Returns the (re-)issued status credential.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown credential id and `BadRequest`
    /// when the credential has no entry for the purpose or the update would
    /// re-activate a revoked credential.
    pub async fn update_status(&self, request: UpdateRequest) -> Result<VerifiableCredential> {
        tracing::debug!("status_manager::update_status");

        let _permit =
            self.limiter.acquire().await.map_err(|_| server!("concurrency limiter closed"))?;

        let this = self.clone();
        execute_transaction(&self.store, move |txn| {
            let this = this.clone();
            let request = request.clone();
            Box::pin(async move { this.update_in_txn(txn, request).await })
        })
        .await
    }

    async fn update_in_txn(
        &self, txn: &mut S::Txn, request: UpdateRequest,
    ) -> Result<VerifiableCredential> {
        let opts = &self.options;
        let UpdateRequest {
            credential_id,
            status_purpose,
            invalidate,
        } = request;

        let Some(mut user) =
            read_user_credential(txn, &opts.user_credential_table_name, &credential_id).await?
        else {
            return Err(Error::NotFound(format!("no credential with id `{credential_id}`")));
        };
        let Some(info) = user.status_info.get(&status_purpose).cloned() else {
            return Err(invalid!(
                "credential `{credential_id}` has no {status_purpose} status"
            ));
        };

        let Some(current) = read_status_credential(
            txn,
            &opts.status_credential_table_name,
            &info.status_credential_id,
        )
        .await?
        else {
            return Err(server!(
                "status credential `{}` is missing",
                info.status_credential_id
            ));
        };

        // already in the requested state: return the list unchanged
        if info.valid == !invalidate {
            return status_vc(current);
        }

        // a revoked credential stays revoked
        if let Some(revocation) = user.status_info.get(&StatusPurpose::Revocation) {
            if !revocation.valid
                && (status_purpose != StatusPurpose::Revocation || !invalidate)
            {
                return Err(invalid!("credential `{credential_id}` has been revoked"));
            }
        }

        let Kind::Object(status_credential) = &current.credential else {
            return Err(invalid!("compact JWT status credentials are not supported"));
        };
        let mut list = StatusList::decode(encoded_list(status_credential)?)
            .map_err(|e| server!("issue decoding status list: {e}"))?;
        list.set_status(info.status_list_index, invalidate)
            .map_err(|e| server!("issue setting status: {e}"))?;

        let record = self
            .status_credential_from_list(&info.status_credential_id, status_purpose, &list)
            .await?;
        txn.update(&opts.status_credential_table_name, "id", &record.id, to_value(&record)?)
            .await?;

        user.status_info.insert(status_purpose, StatusInfo {
            valid: !invalidate,
            ..info
        });
        txn.update(&opts.user_credential_table_name, "id", &credential_id, to_value(&user)?)
            .await?;

        let event = EventRecord {
            id: crate::core::generate::record_id(),
            timestamp: chrono::Utc::now(),
            credential_id: credential_id.clone(),
            status_purpose,
            valid: !invalidate,
        };
        txn.create(&opts.event_table_name, to_value(&event)?).await?;
        upsert_credential_event(txn, &opts.credential_event_table_name, &credential_id, &event.id)
            .await?;

        status_vc(record)
    }
}

fn status_vc(record: StatusCredentialRecord) -> Result<VerifiableCredential> {
    match record.credential {
        Kind::Object(credential) => Ok(credential),
        Kind::String(_) => Err(invalid!("compact JWT status credentials are not supported")),
    }
}

fn encoded_list(credential: &VerifiableCredential) -> Result<&str> {
    credential
        .credential_subject
        .as_one()
        .and_then(|subject| subject.claims.get("encodedList"))
        .and_then(Value::as_str)
        .ok_or_else(|| server!("status credential has no `encodedList`"))
}
