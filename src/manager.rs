//! # Status Manager
//!
//! The issuer-side entry point: bootstraps the deployment, allocates status
//! list coordinates for newly issued credentials, flips status bits, and
//! answers status queries. All mutations run inside store transactions
//! bounded by an in-process concurrency gate.

mod allocate;
mod integrity;
mod update;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;

pub use self::integrity::DatabaseState;
pub use self::update::UpdateRequest;
use crate::bitstring::StatusList;
use crate::config::Options;
use crate::core::{Kind, OneMany, generate};
use crate::records::{
    ConfigRecord, CredentialEventRecord, PurposeInfo, StatusCredentialRecord, StatusInfo,
    UserCredentialRecord,
};
use crate::signer::{CredentialSigner, Keyring};
use crate::store::mem::MemStore;
use crate::store::{Records, Store, execute_transaction};
use crate::w3c::{CredentialStatus, StatusPurpose, VerifiableCredential};
use crate::{Error, Result, bitstring, server, signer};

/// Create a status manager backed by the bundled in-memory store, deriving
/// signing material from the configured DID method and seed.
///
/// Bootstraps the database when it is empty; otherwise verifies its
/// integrity.
///
/// # Errors
///
/// Returns `BadRequest` for unusable options, `InvalidDidSeed` for an
/// undersized seed, `InvalidCredentials` when the database rejects the
/// configured credentials, and `InvalidDatabaseState` when an existing
/// deployment fails the integrity check.
pub async fn create_status_manager(options: Options) -> Result<StatusManager<MemStore, Keyring>> {
    options.validate()?;
    let store = MemStore::connect(&options.connect_options())?;
    let signer = Keyring::new(options.did_method, &options.did_seed, options.did_web_url.as_deref())?;
    StatusManager::create(options, store, signer).await
}

/// Issuer-side credential status manager.
///
/// Cheap to clone; clones share the same store handle, signer, and
/// concurrency gate.
pub struct StatusManager<S: Store, G: CredentialSigner> {
    store: S,
    signer: Arc<G>,
    options: Arc<Options>,
    limiter: Arc<Semaphore>,
}

impl<S: Store, G: CredentialSigner> Clone for StatusManager<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            signer: Arc::clone(&self.signer),
            options: Arc::clone(&self.options),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<S: Store, G: CredentialSigner + 'static> StatusManager<S, G> {
    /// Create a manager over an already-connected store and a signer.
    ///
    /// Bootstraps the database when it is empty; otherwise verifies its
    /// integrity.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for unusable options and `InvalidDatabaseState`
    /// when an existing deployment fails the integrity check.
    pub async fn create(options: Options, store: S, signer: G) -> Result<Self> {
        options.validate()?;

        let manager = Self {
            store,
            signer: Arc::new(signer),
            limiter: Arc::new(Semaphore::new(options.concurrency_limit)),
            options: Arc::new(options),
        };
        manager.bootstrap().await?;

        Ok(manager)
    }

    async fn bootstrap(&self) -> Result<()> {
        tracing::debug!("status_manager::bootstrap");
        let opts = &self.options;

        if !self.store.database_exists().await? {
            self.store.create_database().await?;
        }
        for (table, unique_key) in [
            (&opts.status_credential_table_name, "id"),
            (&opts.user_credential_table_name, "id"),
            (&opts.event_table_name, "id"),
            (&opts.credential_event_table_name, "credentialId"),
            (&opts.config_table_name, "id"),
        ] {
            if !self.store.table_exists(table).await? {
                self.store.create_table(table, unique_key).await?;
            }
        }

        if self.store.table_empty(&opts.config_table_name).await? {
            self.seed().await
        } else {
            let state = self.get_database_state().await?;
            if state.valid {
                Ok(())
            } else {
                Err(Error::InvalidDatabaseState(state.error.unwrap_or_default()))
            }
        }
    }

    /// Seed an empty deployment: the config record plus one status
    /// credential per supported purpose.
    async fn seed(&self) -> Result<()> {
        let this = self.clone();
        execute_transaction(&self.store, move |txn| {
            let this = this.clone();
            Box::pin(async move {
                let mut info = BTreeMap::new();
                for purpose in &this.options.status_purposes {
                    let id = generate::status_credential_id();
                    let record = this.new_status_credential(&id, *purpose).await?;
                    txn.create(&this.options.status_credential_table_name, to_value(&record)?)
                        .await?;
                    info.insert(*purpose, PurposeInfo {
                        latest_status_credential_id: id,
                        latest_credentials_issued_counter: 0,
                        status_credentials_counter: 1,
                    });
                }

                let config = ConfigRecord {
                    id: generate::record_id(),
                    status_credential_site_origin: this.options.site_origin().to_string(),
                    status_credential_info: info,
                    credentials_issued_counter: 0,
                };
                txn.create(&this.options.config_table_name, to_value(&config)?).await?;

                Ok(())
            })
        })
        .await
    }

    /// The status info map for a credential: allocated coordinates and
    /// current validity, by purpose.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown credential id.
    pub async fn get_status(
        &self, credential_id: &str,
    ) -> Result<BTreeMap<StatusPurpose, StatusInfo>> {
        Ok(self.get_credential_info(credential_id).await?.status_info)
    }

    /// The full user credential record for a credential id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown credential id.
    pub async fn get_credential_info(&self, credential_id: &str) -> Result<UserCredentialRecord> {
        let mut store = self.store.clone();
        let Some(value) = store
            .get_by_field(&self.options.user_credential_table_name, "id", credential_id)
            .await?
        else {
            return Err(Error::NotFound(format!("no credential with id `{credential_id}`")));
        };
        from_value(value)
    }

    /// The status credential record for a status credential id, as served
    /// by the public status site.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown status credential id.
    pub async fn get_status_credential(&self, id: &str) -> Result<StatusCredentialRecord> {
        let mut store = self.store.clone();
        let Some(value) =
            store.get_by_field(&self.options.status_credential_table_name, "id", id).await?
        else {
            return Err(Error::NotFound(format!("no status credential with id `{id}`")));
        };
        from_value(value)
    }

    /// The singleton config record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the deployment has not been bootstrapped.
    pub async fn get_config(&self) -> Result<ConfigRecord> {
        let mut store = self.store.clone();
        read_config(&mut store, &self.options.config_table_name).await
    }

    /// Allocate revocation status for a credential.
    ///
    /// # Errors
    ///
    /// See [`StatusManager::allocate_status`].
    pub async fn allocate_revocation_status(
        &self, credential: Kind<VerifiableCredential>,
    ) -> Result<VerifiableCredential> {
        self.allocate_status(credential, &[StatusPurpose::Revocation]).await
    }

    /// Allocate suspension status for a credential.
    ///
    /// # Errors
    ///
    /// See [`StatusManager::allocate_status`].
    pub async fn allocate_suspension_status(
        &self, credential: Kind<VerifiableCredential>,
    ) -> Result<VerifiableCredential> {
        self.allocate_status(credential, &[StatusPurpose::Suspension]).await
    }

    /// Allocate status for every purpose this deployment supports.
    ///
    /// # Errors
    ///
    /// See [`StatusManager::allocate_status`].
    pub async fn allocate_supported_statuses(
        &self, credential: Kind<VerifiableCredential>,
    ) -> Result<VerifiableCredential> {
        let purposes = self.options.status_purposes.clone();
        self.allocate_status(credential, &purposes).await
    }

    /// Permanently invalidate a credential.
    ///
    /// # Errors
    ///
    /// See [`StatusManager::update_status`].
    pub async fn revoke_credential(&self, credential_id: &str) -> Result<VerifiableCredential> {
        self.update_status(UpdateRequest {
            credential_id: credential_id.to_string(),
            status_purpose: StatusPurpose::Revocation,
            invalidate: true,
        })
        .await
    }

    /// Temporarily invalidate a credential.
    ///
    /// # Errors
    ///
    /// See [`StatusManager::update_status`].
    pub async fn suspend_credential(&self, credential_id: &str) -> Result<VerifiableCredential> {
        self.update_status(UpdateRequest {
            credential_id: credential_id.to_string(),
            status_purpose: StatusPurpose::Suspension,
            invalidate: true,
        })
        .await
    }

    /// Lift a credential's suspension.
    ///
    /// # Errors
    ///
    /// See [`StatusManager::update_status`].
    pub async fn unsuspend_credential(&self, credential_id: &str) -> Result<VerifiableCredential> {
        self.update_status(UpdateRequest {
            credential_id: credential_id.to_string(),
            status_purpose: StatusPurpose::Suspension,
            invalidate: false,
        })
        .await
    }

    /// Compose a fresh, empty status credential record.
    pub(crate) async fn new_status_credential(
        &self, id: &str, purpose: StatusPurpose,
    ) -> Result<StatusCredentialRecord> {
        // positions run 1..=list_size; bit 0 is reserved
        let list = StatusList::new(self.options.list_size + 1);
        self.status_credential_from_list(id, purpose, &list).await
    }

    /// Compose (and when configured, sign) a status credential record
    /// around the provided list.
    pub(crate) async fn status_credential_from_list(
        &self, id: &str, purpose: StatusPurpose, list: &StatusList,
    ) -> Result<StatusCredentialRecord> {
        let url = self.status_credential_url(id);
        let mut credential = bitstring::credential(self.signer.controller(), &url, purpose, list)
            .map_err(|e| server!("issue composing status credential: {e}"))?;
        if self.options.sign_status_credential {
            signer::sign(&mut credential, &*self.signer)
                .await
                .map_err(|e| server!("issue signing status credential: {e}"))?;
        }

        Ok(StatusCredentialRecord {
            id: id.to_string(),
            purpose,
            credential: Kind::Object(credential),
        })
    }

    /// The URL a status credential is served under.
    pub(crate) fn status_credential_url(&self, id: &str) -> String {
        format!("{}/{id}", self.options.site_origin())
    }

    /// The embedded `credentialStatus` value for a set of coordinates: an
    /// object for a single purpose, an array for several.
    pub(crate) fn compose_status_entries(
        &self, status_info: &BTreeMap<StatusPurpose, StatusInfo>,
    ) -> OneMany<CredentialStatus> {
        let mut entries: Vec<CredentialStatus> = status_info
            .iter()
            .map(|(purpose, info)| {
                let list_url = self.status_credential_url(&info.status_credential_id);
                CredentialStatus {
                    id: format!("{list_url}#{}", info.status_list_index),
                    type_: "BitstringStatusListEntry".to_string(),
                    status_purpose: *purpose,
                    status_list_credential: list_url,
                    status_list_index: info.status_list_index.to_string(),
                }
            })
            .collect();

        if entries.len() == 1 {
            OneMany::One(entries.remove(0))
        } else {
            OneMany::Many(entries)
        }
    }
}

pub(crate) fn to_value<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(|e| server!("issue serializing record: {e}"))
}

pub(crate) fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| server!("issue deserializing record: {e}"))
}

pub(crate) async fn read_config<R: Records>(records: &mut R, table: &str) -> Result<ConfigRecord> {
    let Some(value) = records.get_any(table).await? else {
        return Err(Error::NotFound("config record not found".to_string()));
    };
    from_value(value)
}

pub(crate) async fn read_user_credential<R: Records>(
    records: &mut R, table: &str, credential_id: &str,
) -> Result<Option<UserCredentialRecord>> {
    records.get_by_field(table, "id", credential_id).await?.map(from_value).transpose()
}

pub(crate) async fn read_status_credential<R: Records>(
    records: &mut R, table: &str, id: &str,
) -> Result<Option<StatusCredentialRecord>> {
    records.get_by_field(table, "id", id).await?.map(from_value).transpose()
}

/// Create the credential-event row on first write, replace it afterwards.
pub(crate) async fn upsert_credential_event<R: Records>(
    records: &mut R, table: &str, credential_id: &str, event_id: &str,
) -> Result<()> {
    let record = CredentialEventRecord {
        credential_id: credential_id.to_string(),
        event_id: event_id.to_string(),
    };
    if records.get_by_field(table, "credentialId", credential_id).await?.is_some() {
        records.update(table, "credentialId", credential_id, to_value(&record)?).await
    } else {
        records.create(table, to_value(&record)?).await
    }
}
