//! # In-Memory Store
//!
//! The bundled store backend: a process-global registry of named in-memory
//! "servers", each holding named databases of JSON document tables.
//! Transactions are optimistic — a full snapshot is taken at begin and
//! table versions are validated at commit, so an interleaving writer
//! surfaces as `WriteConflict` exactly where a server-backed engine would
//! report one.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use std::time::Instant;

use serde_json::Value;

use crate::config::CLIENT_CACHE_TTL;
use crate::store::{Records, Store, Transaction};
use crate::{Error, Result, server};

/// Connection settings for the in-memory backend.
///
/// Either `url` or host/port addressing selects the server; distinct
/// endpoints are fully isolated, which is what keeps test deployments from
/// observing each other.
#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    /// Connection URL, e.g. `mem://issuer-1`.
    pub url: Option<String>,

    /// Server host, used when `url` is not set.
    pub host: Option<String>,

    /// Server port, used when `url` is not set.
    pub port: Option<u16>,

    /// Username pinned to the server at first connection.
    pub username: Option<String>,

    /// Password pinned to the server at first connection.
    pub password: Option<String>,

    /// Database name.
    pub database: String,
}

impl ConnectOptions {
    fn endpoint(&self) -> String {
        self.url.clone().unwrap_or_else(|| {
            let host = self.host.as_deref().unwrap_or("localhost");
            match self.port {
                Some(port) => format!("mem://{host}:{port}"),
                None => format!("mem://{host}"),
            }
        })
    }

    fn auth(&self) -> Auth {
        Auth {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Auth {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default)]
struct Server {
    /// Credentials pinned by the first successful connection.
    auth: Mutex<Option<Auth>>,
    databases: Mutex<HashMap<String, Arc<Db>>>,
}

#[derive(Debug, Default)]
struct Db {
    inner: Mutex<DbInner>,
}

#[derive(Debug, Default)]
struct DbInner {
    tables: HashMap<String, Table>,
    active_txns: usize,
}

#[derive(Clone, Debug)]
struct Table {
    unique_key: String,
    version: u64,
    /// Rows keyed by their unique-key value.
    rows: HashMap<String, Value>,
}

impl Table {
    fn unique_value(&self, record: &Value) -> Result<String> {
        record.get(&self.unique_key).and_then(Value::as_str).map(ToString::to_string).ok_or_else(
            || server!("record is missing unique key `{}`", self.unique_key),
        )
    }

    fn create(&mut self, record: Value) -> Result<()> {
        let key = self.unique_value(&record)?;
        if self.rows.contains_key(&key) {
            return Err(Error::WriteConflict(format!(
                "record with {} `{key}` already exists",
                self.unique_key
            )));
        }
        self.rows.insert(key, record);
        self.version += 1;
        Ok(())
    }

    fn update(&mut self, key: &str, value: &str, record: Value) -> Result<()> {
        let current = if key == self.unique_key {
            self.rows.contains_key(value).then(|| value.to_string())
        } else {
            self.rows
                .iter()
                .find(|(_, row)| field_matches(row, key, value))
                .map(|(unique, _)| unique.clone())
        };
        let Some(current) = current else {
            return Err(Error::NotFound(format!("no record with {key} `{value}`")));
        };

        // replacing a record may alter its unique-key value
        let replacement = self.unique_value(&record)?;
        if replacement != current && self.rows.contains_key(&replacement) {
            return Err(Error::WriteConflict(format!(
                "record with {} `{replacement}` already exists",
                self.unique_key
            )));
        }
        self.rows.remove(&current);
        self.rows.insert(replacement, record);
        self.version += 1;
        Ok(())
    }

    fn get_by_field(&self, key: &str, value: &str) -> Option<Value> {
        if key == self.unique_key {
            return self.rows.get(value).cloned();
        }
        self.rows.values().find(|row| field_matches(row, key, value)).cloned()
    }

    fn get_all_by_field(&self, key: &str, value: &str) -> Vec<Value> {
        self.rows.values().filter(|row| field_matches(row, key, value)).cloned().collect()
    }
}

fn field_matches(record: &Value, key: &str, value: &str) -> bool {
    record.get(key).and_then(Value::as_str) == Some(value)
}

/// Process-global server registry, keyed by endpoint.
static REGISTRY: LazyLock<Mutex<HashMap<String, Arc<Server>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Client cache with TTL. A single mutex guards it so only one task opens
/// a new connection at a time.
static CLIENTS: LazyLock<Mutex<HashMap<String, (Instant, Arc<Server>)>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// A handle to one database on an in-memory server.
#[derive(Clone, Debug)]
pub struct MemStore {
    server: Arc<Server>,
    database: String,
}

impl MemStore {
    /// Connect to the server selected by `options`.
    ///
    /// The first connection to an endpoint pins its credentials; later
    /// connections must present the same ones.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` when the presented credentials differ
    /// from the pinned ones.
    pub fn connect(options: &ConnectOptions) -> Result<Self> {
        let endpoint = options.endpoint();

        let server = {
            let mut clients = CLIENTS.lock().map_err(|e| server!("client cache poisoned: {e}"))?;
            let cached = clients
                .get(&endpoint)
                .filter(|(cached_at, _)| cached_at.elapsed() < CLIENT_CACHE_TTL)
                .map(|(_, server)| Arc::clone(server));

            if let Some(server) = cached {
                server
            } else {
                let mut registry = REGISTRY.lock().map_err(|e| server!("registry poisoned: {e}"))?;
                let server = Arc::clone(registry.entry(endpoint.clone()).or_default());
                clients.insert(endpoint, (Instant::now(), Arc::clone(&server)));
                server
            }
        };

        let mut pinned = server.auth.lock().map_err(|e| server!("auth poisoned: {e}"))?;
        match pinned.as_ref() {
            None => *pinned = Some(options.auth()),
            Some(auth) if *auth == options.auth() => {}
            Some(_) => {
                return Err(Error::InvalidCredentials(
                    "credentials do not match this database".to_string(),
                ));
            }
        }
        drop(pinned);

        Ok(Self {
            server,
            database: options.database.clone(),
        })
    }

    /// The number of transactions currently open against the database.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.db().map_or(0, |db| db.inner.lock().map_or(0, |inner| inner.active_txns))
    }

    fn db(&self) -> Result<Arc<Db>> {
        let databases =
            self.server.databases.lock().map_err(|e| server!("databases poisoned: {e}"))?;
        databases
            .get(&self.database)
            .cloned()
            .ok_or_else(|| Error::MissingDatabase(format!("database `{}`", self.database)))
    }

    fn with_db<R>(&self, f: impl FnOnce(&mut DbInner) -> Result<R>) -> Result<R> {
        let db = self.db()?;
        let mut inner = lock_inner(&db)?;
        f(&mut inner)
    }
}

fn lock_inner(db: &Db) -> Result<MutexGuard<'_, DbInner>> {
    db.inner.lock().map_err(|e| server!("database poisoned: {e}"))
}

fn table<'a>(inner: &'a mut DbInner, name: &str) -> Result<&'a mut Table> {
    inner
        .tables
        .get_mut(name)
        .ok_or_else(|| Error::MissingDatabaseTable(format!("table `{name}`")))
}

impl Records for MemStore {
    async fn create(&mut self, table_name: &str, record: Value) -> Result<()> {
        self.with_db(|inner| table(inner, table_name)?.create(record))
    }

    async fn update(&mut self, table_name: &str, key: &str, value: &str, record: Value) -> Result<()> {
        self.with_db(|inner| table(inner, table_name)?.update(key, value, record))
    }

    async fn get_by_field(&mut self, table_name: &str, key: &str, value: &str) -> Result<Option<Value>> {
        self.with_db(|inner| Ok(table(inner, table_name)?.get_by_field(key, value)))
    }

    async fn get_all_by_field(
        &mut self, table_name: &str, key: &str, value: &str,
    ) -> Result<Vec<Value>> {
        self.with_db(|inner| Ok(table(inner, table_name)?.get_all_by_field(key, value)))
    }

    async fn get_any(&mut self, table_name: &str) -> Result<Option<Value>> {
        self.with_db(|inner| Ok(table(inner, table_name)?.rows.values().next().cloned()))
    }

    async fn get_all(&mut self, table_name: &str) -> Result<Vec<Value>> {
        self.with_db(|inner| Ok(table(inner, table_name)?.rows.values().cloned().collect()))
    }
}

impl Store for MemStore {
    type Txn = MemTxn;

    async fn begin(&self) -> Result<Self::Txn> {
        let db = self.db()?;
        let (snapshot, begin_versions) = {
            let mut inner = lock_inner(&db)?;
            inner.active_txns += 1;
            let versions = inner
                .tables
                .iter()
                .map(|(name, table)| (name.clone(), table.version))
                .collect();
            (inner.tables.clone(), versions)
        };

        Ok(MemTxn {
            db,
            snapshot,
            begin_versions,
            touched: HashSet::new(),
            written: HashSet::new(),
        })
    }

    async fn database_exists(&self) -> Result<bool> {
        let databases =
            self.server.databases.lock().map_err(|e| server!("databases poisoned: {e}"))?;
        Ok(databases.contains_key(&self.database))
    }

    async fn create_database(&self) -> Result<()> {
        let mut databases =
            self.server.databases.lock().map_err(|e| server!("databases poisoned: {e}"))?;
        databases.entry(self.database.clone()).or_default();
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.with_db(|inner| Ok(inner.tables.contains_key(table)))
    }

    async fn table_empty(&self, table_name: &str) -> Result<bool> {
        self.with_db(|inner| Ok(table(inner, table_name)?.rows.is_empty()))
    }

    async fn create_table(&self, table: &str, unique_key: &str) -> Result<()> {
        self.with_db(|inner| {
            inner.tables.entry(table.to_string()).or_insert_with(|| Table {
                unique_key: unique_key.to_string(),
                version: 0,
                rows: HashMap::new(),
            });
            Ok(())
        })
    }
}

/// An optimistic transaction over a [`MemStore`] database.
#[derive(Debug)]
pub struct MemTxn {
    db: Arc<Db>,
    snapshot: HashMap<String, Table>,
    /// Table versions as of begin. The snapshot copies bump their own
    /// versions as the transaction writes, so commit validates live tables
    /// against these instead.
    begin_versions: HashMap<String, u64>,
    /// Tables read or written; validated against live versions at commit.
    touched: HashSet<String>,
    written: HashSet<String>,
}

impl MemTxn {
    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.touched.insert(name.to_string());
        self.snapshot
            .get_mut(name)
            .ok_or_else(|| Error::MissingDatabaseTable(format!("table `{name}`")))
    }

    fn table_ref(&mut self, name: &str) -> Result<&Table> {
        self.touched.insert(name.to_string());
        self.snapshot
            .get(name)
            .ok_or_else(|| Error::MissingDatabaseTable(format!("table `{name}`")))
    }
}

impl Records for MemTxn {
    async fn create(&mut self, table_name: &str, record: Value) -> Result<()> {
        self.written.insert(table_name.to_string());
        self.table_mut(table_name)?.create(record)
    }

    async fn update(&mut self, table_name: &str, key: &str, value: &str, record: Value) -> Result<()> {
        self.written.insert(table_name.to_string());
        self.table_mut(table_name)?.update(key, value, record)
    }

    async fn get_by_field(&mut self, table_name: &str, key: &str, value: &str) -> Result<Option<Value>> {
        Ok(self.table_ref(table_name)?.get_by_field(key, value))
    }

    async fn get_all_by_field(
        &mut self, table_name: &str, key: &str, value: &str,
    ) -> Result<Vec<Value>> {
        Ok(self.table_ref(table_name)?.get_all_by_field(key, value))
    }

    async fn get_any(&mut self, table_name: &str) -> Result<Option<Value>> {
        Ok(self.table_ref(table_name)?.rows.values().next().cloned())
    }

    async fn get_all(&mut self, table_name: &str) -> Result<Vec<Value>> {
        Ok(self.table_ref(table_name)?.rows.values().cloned().collect())
    }
}

impl Transaction for MemTxn {
    async fn commit(mut self) -> Result<()> {
        let db = Arc::clone(&self.db);
        let mut inner = lock_inner(&db)?;

        // validate every touched table against its version as of begin
        for name in &self.touched {
            let live = inner.tables.get(name).map(|t| t.version);
            if live != self.begin_versions.get(name).copied() {
                return Err(Error::WriteConflict(format!(
                    "table `{name}` was modified by a concurrent transaction"
                )));
            }
        }

        // the snapshot copies already carry their post-write versions
        for name in &self.written {
            if let Some(table) = self.snapshot.remove(name) {
                inner.tables.insert(name.clone(), table);
            }
        }

        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        // buffered writes die with the snapshot
        Ok(())
    }
}

impl Drop for MemTxn {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.db.inner.lock() {
            inner.active_txns = inner.active_txns.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn connect(tag: &str, auth: (Option<&str>, Option<&str>)) -> Result<MemStore> {
        MemStore::connect(&ConnectOptions {
            url: Some(format!("mem://mem-tests-{tag}")),
            username: auth.0.map(ToString::to_string),
            password: auth.1.map(ToString::to_string),
            database: "credentialStatus".to_string(),
            ..ConnectOptions::default()
        })
    }

    #[tokio::test]
    async fn unique_key_enforced() {
        let store = connect("unique", (None, None)).expect("should connect");
        store.create_database().await.expect("should create database");
        store.create_table("UserCredential", "id").await.expect("should create table");

        let mut store = store;
        store
            .create("UserCredential", json!({"id": "urn:uuid:1", "issuer": "did:example:a"}))
            .await
            .expect("should create");
        let Err(Error::WriteConflict(_)) =
            store.create("UserCredential", json!({"id": "urn:uuid:1"})).await
        else {
            panic!("duplicate id should conflict");
        };
    }

    #[tokio::test]
    async fn missing_database_and_table() {
        let store = connect("missing", (None, None)).expect("should connect");

        let mut handle = store.clone();
        let Err(Error::MissingDatabase(_)) = handle.get_any("Config").await else {
            panic!("database should be missing");
        };

        store.create_database().await.expect("should create database");
        let Err(Error::MissingDatabaseTable(_)) = handle.get_any("Config").await else {
            panic!("table should be missing");
        };
    }

    #[tokio::test]
    async fn credentials_pinned_at_first_connection() {
        connect("auth", (Some("issuer"), Some("open-sesame"))).expect("should connect");
        connect("auth", (Some("issuer"), Some("open-sesame"))).expect("same credentials connect");

        let Err(Error::InvalidCredentials(_)) = connect("auth", (Some("issuer"), Some("wrong")))
        else {
            panic!("mismatched credentials should be rejected");
        };
    }

    #[tokio::test]
    async fn read_your_writes() {
        let store = connect("ryw", (None, None)).expect("should connect");
        store.create_database().await.expect("should create database");
        store.create_table("Event", "id").await.expect("should create table");

        let mut txn = store.begin().await.expect("should begin");
        txn.create("Event", json!({"id": "e1", "credentialId": "c1"})).await.expect("create");
        let row = txn.get_by_field("Event", "credentialId", "c1").await.expect("read");
        assert!(row.is_some(), "transaction should observe its own write");
        txn.rollback().await.expect("rollback");

        let mut store = store;
        assert!(store.get_any("Event").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn active_transaction_count() {
        let store = connect("active", (None, None)).expect("should connect");
        store.create_database().await.expect("should create database");
        store.create_table("Event", "id").await.expect("should create table");

        let txn = store.begin().await.expect("should begin");
        let other = store.begin().await.expect("should begin");
        assert_eq!(store.active_transactions(), 2);

        txn.commit().await.expect("commit");
        other.rollback().await.expect("rollback");
        assert_eq!(store.active_transactions(), 0);
    }
}
