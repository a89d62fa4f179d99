//! Database session: connection lifecycle, store registry, and key/value
//! convenience storage.

use crate::config::SessionConfig;
use crate::error::{CoreError, CoreResult};
use crate::schema::{compile_schema, KEY_FIELD, VALUE_FIELD};
use crate::scope::{ScopeManager, TransactionScope};
use crate::store::{RecordStore, StoreOptions};
use cabinet_engine::{CollectionDef, Key, Record, StorageEngine, TxnMode, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never opened.
    NotOpen,
    /// Open in progress.
    Opening,
    /// Connected to the underlying database.
    Open,
    /// Connection closed.
    Closed,
    /// Underlying database destroyed.
    Deleted,
}

/// The main session handle.
///
/// A `Session` owns the single connection to one underlying database, the
/// registry of [`RecordStore`]s (one per collection, registered once), and
/// the reserved key/value collection. It is the entry point for everything
/// in this crate:
///
/// ```rust
/// use cabinet_core::{MemoryEngine, Record, Session, SessionConfig, StoreOptions};
///
/// let session = Session::new(MemoryEngine::new());
/// session
///     .open(SessionConfig::new("app", 1).collection("notes", "id, ownerId"))
///     .unwrap();
///
/// let notes = session.add_store("notes", &[], StoreOptions::default()).unwrap();
/// notes.add(Record::new().with("id", "n1").with("ownerId", "u1")).unwrap();
///
/// session.close().unwrap();
/// ```
///
/// Only one open connection exists per session instance; the session moves
/// through not-open, opening, open, and closed/deleted states.
pub struct Session {
    engine: Box<dyn StorageEngine>,
    scopes: Arc<ScopeManager>,
    stores: RwLock<HashMap<String, Arc<RecordStore>>>,
    defs: RwLock<HashMap<String, CollectionDef>>,
    state: RwLock<SessionState>,
    name: RwLock<Option<String>>,
    key_value_collection: RwLock<String>,
    /// Guards against running collection setup twice within one open
    /// cycle, when both the success and upgrade-needed engine callbacks
    /// could otherwise fire initialization.
    initialized: RwLock<bool>,
}

impl Session {
    /// Creates a session over an engine. Nothing is opened yet.
    pub fn new(engine: impl StorageEngine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
            scopes: Arc::new(ScopeManager::new()),
            stores: RwLock::new(HashMap::new()),
            defs: RwLock::new(HashMap::new()),
            state: RwLock::new(SessionState::NotOpen),
            name: RwLock::new(None),
            key_value_collection: RwLock::new(String::new()),
            initialized: RwLock::new(false),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Returns whether the session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::NotOpen)
        }
    }

    /// Opens (or creates/upgrades) the underlying database.
    ///
    /// On creation or upgrade, the schema is compiled and every declared
    /// collection is created, plus the synthesized key/value collection
    /// when the schema does not name it. A collection whose setup fails is
    /// skipped with a warning; sibling collections proceed independently.
    ///
    /// # Errors
    ///
    /// Fails with `InvariantViolation` when already open or when the
    /// version is not positive, and propagates engine failures (e.g.
    /// requesting an older version than what exists).
    pub fn open(&self, config: SessionConfig) -> CoreResult<bool> {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Open | SessionState::Opening => {
                    return Err(CoreError::invariant("session is already open"));
                }
                _ => *state = SessionState::Opening,
            }
        }
        match self.open_inner(&config) {
            Ok(()) => {
                *self.state.write() = SessionState::Open;
                Ok(true)
            }
            Err(err) => {
                *self.state.write() = SessionState::NotOpen;
                Err(err)
            }
        }
    }

    fn open_inner(&self, config: &SessionConfig) -> CoreResult<()> {
        if config.version == 0 {
            return Err(CoreError::invariant("version must be a positive integer"));
        }
        let defs = compile_schema(&config.schema, &config.key_value_collection)?;

        *self.initialized.write() = false;
        let connection = self.engine.open_database(&config.name, config.version)?;
        debug!(name = %config.name, version = config.version, "opened database");

        if connection.needs_setup() {
            let mut initialized = self.initialized.write();
            if !*initialized {
                *initialized = true;
                for def in &defs {
                    if connection.has_collection(&def.name) {
                        continue;
                    }
                    if let Err(err) = connection.create_collection(def) {
                        // Fatal for this collection only; siblings run as
                        // independent units of work.
                        warn!(collection = %def.name, %err, "collection setup failed");
                    }
                }
            }
        }

        *self.defs.write() = defs.into_iter().map(|d| (d.name.clone(), d)).collect();
        *self.name.write() = Some(config.name.clone());
        *self.key_value_collection.write() = config.key_value_collection.clone();
        self.scopes.attach(connection);
        Ok(())
    }

    /// Closes the connection. Returns `false` when there was nothing open.
    pub fn close(&self) -> CoreResult<bool> {
        let mut state = self.state.write();
        if *state != SessionState::Open {
            return Ok(false);
        }
        if let Some(connection) = self.scopes.detach() {
            connection.close();
        }
        *state = SessionState::Closed;
        debug!("closed database session");
        Ok(true)
    }

    /// Closes first if open, then destroys all persisted data for this
    /// database name. Irreversible.
    ///
    /// # Errors
    ///
    /// Fails with `InvariantViolation` when the session was never opened.
    pub fn delete(&self) -> CoreResult<bool> {
        let name = self
            .name
            .read()
            .clone()
            .ok_or_else(|| CoreError::invariant("cannot delete a database that was never opened"))?;
        self.close()?;
        let deleted = self.engine.delete_database(&name)?;
        *self.state.write() = SessionState::Deleted;
        debug!(%name, "deleted database");
        Ok(deleted)
    }

    /// Registers a store for a collection.
    ///
    /// `related` must name every other collection any of the store's
    /// operation chains will touch, even transitively; it is validated
    /// here, at registration time, rather than surfacing later as a
    /// runtime transaction-usage error.
    ///
    /// # Errors
    ///
    /// Fails with `DuplicateStore` when the name is already registered and
    /// `CollectionNotFound` when the collection or any related name is not
    /// in the schema.
    pub fn add_store(
        &self,
        name: &str,
        related: &[&str],
        options: StoreOptions,
    ) -> CoreResult<Arc<RecordStore>> {
        self.ensure_open()?;
        let defs = self.defs.read();
        let def = defs
            .get(name)
            .ok_or_else(|| CoreError::collection_not_found(name))?;
        for table in related {
            if !defs.contains_key(*table) {
                return Err(CoreError::collection_not_found(*table));
            }
        }

        let mut stores = self.stores.write();
        if stores.contains_key(name) {
            return Err(CoreError::duplicate_store(name));
        }
        let store = Arc::new(RecordStore::new(
            name.to_string(),
            def.primary_key.clone(),
            related.iter().map(|s| (*s).to_string()).collect(),
            options,
            Arc::clone(&self.scopes),
        ));
        stores.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Looks up a registered store.
    pub fn get_store(&self, name: &str) -> CoreResult<Arc<RecordStore>> {
        self.stores
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::store_not_found(name))
    }

    /// Returns the reserved key/value store, registering it on first use.
    pub fn key_value_store(&self) -> CoreResult<Arc<RecordStore>> {
        let name = self.key_value_collection.read().clone();
        if let Some(store) = self.stores.read().get(&name).cloned() {
            return Ok(store);
        }
        self.add_store(&name, &[], StoreOptions::default())
    }

    // ------------------------------------------------------------------
    // Key/value and key-only convenience storage.
    //
    // All of these are thin wrappers over `{key, value}`-shaped records
    // (key-only: `{key}`) in a plain collection, going through the same
    // scope manager as every store operation.
    // ------------------------------------------------------------------

    fn data_scope(&self, collection: &str, mode: TxnMode) -> CoreResult<TransactionScope> {
        self.ensure_open()?;
        self.scopes.open_scope(&[collection.to_string()], mode)
    }

    fn kv_collection(&self) -> String {
        self.key_value_collection.read().clone()
    }

    fn put_data(
        scope: &mut TransactionScope,
        collection: &str,
        key: &str,
        value: Option<Value>,
    ) -> CoreResult<()> {
        match value {
            Some(value) => {
                let record = Record::new().with(KEY_FIELD, key).with(VALUE_FIELD, value);
                scope.put(collection, record)?;
            }
            // Storing an absent value is defined as deleting the key.
            None => scope.delete(collection, &Key::text(key))?,
        }
        Ok(())
    }

    /// Reads the value stored under `key` in a `{key, value}` collection.
    pub fn get_data(&self, collection: &str, key: &str) -> CoreResult<Option<Value>> {
        let scope = self.data_scope(collection, TxnMode::ReadOnly)?;
        Ok(scope
            .get(collection, &Key::text(key))?
            .and_then(|mut record| record.unset(VALUE_FIELD)))
    }

    /// Reads several values, preserving per-key correspondence.
    pub fn get_data_values(
        &self,
        collection: &str,
        keys: &[&str],
    ) -> CoreResult<Vec<Option<Value>>> {
        let scope = self.data_scope(collection, TxnMode::ReadOnly)?;
        keys.iter()
            .map(|key| {
                Ok(scope
                    .get(collection, &Key::text(*key))?
                    .and_then(|mut record| record.unset(VALUE_FIELD)))
            })
            .collect()
    }

    /// Stores `value` under `key`; a `None` value deletes the key.
    pub fn set_data(&self, collection: &str, key: &str, value: Option<Value>) -> CoreResult<()> {
        let mut scope = self.data_scope(collection, TxnMode::ReadWrite)?;
        Self::put_data(&mut scope, collection, key, value)?;
        scope.commit()
    }

    /// Stores many `(key, value)` pairs in one transaction.
    pub fn set_data_values(
        &self,
        collection: &str,
        entries: Vec<(String, Option<Value>)>,
    ) -> CoreResult<()> {
        let mut scope = self.data_scope(collection, TxnMode::ReadWrite)?;
        for (key, value) in entries {
            Self::put_data(&mut scope, collection, &key, value)?;
        }
        scope.commit()
    }

    /// Deletes the value stored under `key`.
    pub fn remove_data(&self, collection: &str, key: &str) -> CoreResult<()> {
        self.set_data(collection, key, None)
    }

    /// Reads a value from the reserved key/value collection.
    pub fn get_value(&self, key: &str) -> CoreResult<Option<Value>> {
        self.get_data(&self.kv_collection(), key)
    }

    /// Reads several values from the reserved key/value collection.
    pub fn get_values(&self, keys: &[&str]) -> CoreResult<Vec<Option<Value>>> {
        self.get_data_values(&self.kv_collection(), keys)
    }

    /// Every value in the reserved key/value collection.
    pub fn get_all_values(&self) -> CoreResult<Vec<Value>> {
        let collection = self.kv_collection();
        let scope = self.data_scope(&collection, TxnMode::ReadOnly)?;
        Ok(scope
            .scan(&collection, None, None)?
            .into_iter()
            .filter_map(|mut record| record.unset(VALUE_FIELD))
            .collect())
    }

    /// Stores a value in the reserved key/value collection; `None`
    /// deletes the key.
    pub fn set_value(&self, key: &str, value: Option<Value>) -> CoreResult<()> {
        self.set_data(&self.kv_collection(), key, value)
    }

    /// Stores many values in the reserved key/value collection in one
    /// transaction.
    pub fn set_values(&self, entries: Vec<(String, Option<Value>)>) -> CoreResult<()> {
        self.set_data_values(&self.kv_collection(), entries)
    }

    /// Every key present in a key-only collection.
    pub fn get_keys(&self, collection: &str) -> CoreResult<Vec<String>> {
        let scope = self.data_scope(collection, TxnMode::ReadOnly)?;
        Ok(scope
            .keys(collection)?
            .into_iter()
            .filter_map(|key| key.as_text().map(str::to_string))
            .collect())
    }

    /// Marks a key present in a key-only collection.
    pub fn set_key(&self, collection: &str, key: &str) -> CoreResult<()> {
        let mut scope = self.data_scope(collection, TxnMode::ReadWrite)?;
        scope.put(collection, Record::new().with(KEY_FIELD, key))?;
        scope.commit()
    }

    /// Marks many keys present, in one transaction.
    pub fn set_keys(&self, collection: &str, keys: &[&str]) -> CoreResult<()> {
        let mut scope = self.data_scope(collection, TxnMode::ReadWrite)?;
        for key in keys {
            scope.put(collection, Record::new().with(KEY_FIELD, *key))?;
        }
        scope.commit()
    }

    /// Removes a key from a key-only collection.
    pub fn remove_key(&self, collection: &str, key: &str) -> CoreResult<()> {
        let mut scope = self.data_scope(collection, TxnMode::ReadWrite)?;
        scope.delete(collection, &Key::text(key))?;
        scope.commit()
    }

    /// Removes every key from a key-only collection.
    pub fn clear_store_keys(&self, collection: &str) -> CoreResult<()> {
        let mut scope = self.data_scope(collection, TxnMode::ReadWrite)?;
        scope.clear(collection)?;
        scope.commit()
    }

    /// Names of every collection in the open database.
    pub fn collection_names(&self) -> CoreResult<Vec<String>> {
        self.ensure_open()?;
        self.scopes
            .with_connection(|connection| Ok(connection.collection_names()))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("name", &*self.name.read())
            .field("stores", &self.stores.read().len())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
