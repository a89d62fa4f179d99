//! In-memory reference engine.

use crate::defs::{CollectionDef, KeyPath, TxnMode};
use crate::engine::{EngineConnection, EngineTransaction, StorageEngine};
use crate::error::{EngineError, EngineResult};
use crate::record::Record;
use crate::value::Key;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory storage engine.
///
/// `MemoryEngine` implements the full engine contract without persistence:
/// databases live for the engine's lifetime and are destroyed by
/// [`StorageEngine::delete_database`] or by dropping the engine. Cloning
/// the engine shares its databases, so a second session can reopen what a
/// first one created.
///
/// Transactions buffer their writes and apply them under a database-wide
/// write lock at commit, so every operation issued on one transaction
/// commits or aborts together.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    databases: Arc<RwLock<HashMap<String, Arc<MemoryDatabase>>>>,
}

struct MemoryDatabase {
    version: RwLock<u32>,
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

struct MemoryCollection {
    def: CollectionDef,
    rows: BTreeMap<Key, Record>,
}

impl MemoryEngine {
    /// Creates an engine with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for MemoryEngine {
    fn open_database(&self, name: &str, version: u32) -> EngineResult<Box<dyn EngineConnection>> {
        if version == 0 {
            return Err(EngineError::invalid_definition("version must be positive"));
        }

        let db = {
            let mut dbs = self.databases.write();
            match dbs.get(name) {
                Some(db) => Arc::clone(db),
                None => {
                    let db = Arc::new(MemoryDatabase {
                        // Start below the requested version so the first
                        // open reports needs_setup.
                        version: RwLock::new(0),
                        collections: RwLock::new(HashMap::new()),
                    });
                    dbs.insert(name.to_string(), Arc::clone(&db));
                    db
                }
            }
        };

        let existing = *db.version.read();
        if version < existing {
            return Err(EngineError::VersionMismatch {
                requested: version,
                existing,
            });
        }

        let needs_setup = version > existing;
        if needs_setup {
            *db.version.write() = version;
        }

        Ok(Box::new(MemoryConnection {
            db,
            needs_setup,
            open: AtomicBool::new(true),
        }))
    }

    fn delete_database(&self, name: &str) -> EngineResult<bool> {
        Ok(self.databases.write().remove(name).is_some())
    }
}

struct MemoryConnection {
    db: Arc<MemoryDatabase>,
    needs_setup: bool,
    open: AtomicBool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::ConnectionClosed)
        }
    }
}

fn validate_def(def: &CollectionDef) -> EngineResult<()> {
    if def.name.is_empty() {
        return Err(EngineError::invalid_definition("collection name is empty"));
    }
    if def.primary_key.is_empty() {
        return Err(EngineError::invalid_definition(format!(
            "collection '{}' has an empty primary key path",
            def.name
        )));
    }
    let mut seen = HashSet::new();
    for index in &def.indexes {
        if index.name.is_empty() {
            return Err(EngineError::invalid_definition(format!(
                "collection '{}' declares an unnamed index",
                def.name
            )));
        }
        if !seen.insert(index.name.as_str()) {
            return Err(EngineError::invalid_definition(format!(
                "duplicate index name '{}' on collection '{}'",
                index.name, def.name
            )));
        }
        let empty = match &index.key_path {
            KeyPath::Single(f) => f.is_empty(),
            KeyPath::Composite(fs) => fs.is_empty() || fs.iter().any(String::is_empty),
        };
        if empty {
            return Err(EngineError::invalid_definition(format!(
                "index '{}' on collection '{}' has an empty key path",
                index.name, def.name
            )));
        }
    }
    Ok(())
}

impl EngineConnection for MemoryConnection {
    fn needs_setup(&self) -> bool {
        self.needs_setup
    }

    fn create_collection(&self, def: &CollectionDef) -> EngineResult<()> {
        self.ensure_open()?;
        validate_def(def)?;

        let mut collections = self.db.collections.write();
        if collections.contains_key(&def.name) {
            return Err(EngineError::invalid_definition(format!(
                "collection '{}' already exists",
                def.name
            )));
        }
        collections.insert(
            def.name.clone(),
            MemoryCollection {
                def: def.clone(),
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn has_collection(&self, name: &str) -> bool {
        self.db.collections.read().contains_key(name)
    }

    fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.db.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn version(&self) -> u32 {
        *self.db.version.read()
    }

    fn transaction(
        &self,
        collections: &[String],
        mode: TxnMode,
    ) -> EngineResult<Box<dyn EngineTransaction>> {
        self.ensure_open()?;
        {
            let known = self.db.collections.read();
            for name in collections {
                if !known.contains_key(name) {
                    return Err(EngineError::collection_not_found(name.clone()));
                }
            }
        }
        Ok(Box::new(MemoryTransaction {
            db: Arc::clone(&self.db),
            scope: collections.to_vec(),
            mode,
            writes: HashMap::new(),
            cleared: HashSet::new(),
            state: TxnState::Active,
        }))
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

enum TxnState {
    Active,
    Poisoned(String),
    Finished,
}

struct MemoryTransaction {
    db: Arc<MemoryDatabase>,
    scope: Vec<String>,
    mode: TxnMode,
    /// Buffered writes per collection; `None` marks a pending delete.
    writes: HashMap<String, BTreeMap<Key, Option<Record>>>,
    cleared: HashSet<String>,
    state: TxnState,
}

impl MemoryTransaction {
    fn ensure_active(&self) -> EngineResult<()> {
        match &self.state {
            TxnState::Active => Ok(()),
            TxnState::Poisoned(reason) => Err(EngineError::aborted(reason.clone())),
            TxnState::Finished => Err(EngineError::TransactionFinished),
        }
    }

    fn ensure_scope(&self, collection: &str) -> EngineResult<()> {
        if self.scope.iter().any(|c| c == collection) {
            Ok(())
        } else {
            Err(EngineError::collection_not_found(collection))
        }
    }

    fn ensure_writable(&self) -> EngineResult<()> {
        match self.mode {
            TxnMode::ReadWrite => Ok(()),
            TxnMode::ReadOnly => Err(EngineError::ReadOnly),
        }
    }

    fn poison(&mut self, reason: String) {
        self.state = TxnState::Poisoned(reason);
    }

    fn def(&self, collection: &str) -> EngineResult<CollectionDef> {
        self.db
            .collections
            .read()
            .get(collection)
            .map(|c| c.def.clone())
            .ok_or_else(|| EngineError::collection_not_found(collection))
    }

    /// Committed rows overlaid with this transaction's buffered writes.
    fn effective_rows(&self, collection: &str) -> EngineResult<BTreeMap<Key, Record>> {
        let mut rows = if self.cleared.contains(collection) {
            BTreeMap::new()
        } else {
            self.db
                .collections
                .read()
                .get(collection)
                .map(|c| c.rows.clone())
                .ok_or_else(|| EngineError::collection_not_found(collection))?
        };
        if let Some(pending) = self.writes.get(collection) {
            for (key, write) in pending {
                match write {
                    Some(record) => {
                        rows.insert(key.clone(), record.clone());
                    }
                    None => {
                        rows.remove(key);
                    }
                }
            }
        }
        Ok(rows)
    }
}

impl EngineTransaction for MemoryTransaction {
    fn get(&self, collection: &str, key: &Key) -> EngineResult<Option<Record>> {
        self.ensure_active()?;
        self.ensure_scope(collection)?;

        if let Some(pending) = self.writes.get(collection) {
            if let Some(write) = pending.get(key) {
                return Ok(write.clone());
            }
        }
        if self.cleared.contains(collection) {
            return Ok(None);
        }
        Ok(self
            .db
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.rows.get(key).cloned()))
    }

    fn put(&mut self, collection: &str, record: Record) -> EngineResult<Key> {
        self.ensure_active()?;
        self.ensure_scope(collection)?;
        self.ensure_writable()?;

        let def = self.def(collection)?;
        let key = match record.key_for(&def.primary_key) {
            Some(key) => key,
            None => {
                let err = EngineError::invalid_key(format!(
                    "record has no valid '{}' key for collection '{}'",
                    def.primary_key, collection
                ));
                self.poison(err.to_string());
                return Err(err);
            }
        };

        for index in def.indexes.iter().filter(|i| i.unique) {
            let Some(candidate) = index.key_path.extract(&record) else {
                continue;
            };
            let rows = self.effective_rows(collection)?;
            let conflict = rows.iter().any(|(pk, existing)| {
                *pk != key && index.key_path.extract(existing).as_ref() == Some(&candidate)
            });
            if conflict {
                let err = EngineError::ConstraintViolation {
                    index: index.name.clone(),
                };
                self.poison(err.to_string());
                return Err(err);
            }
        }

        self.writes
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), Some(record));
        Ok(key)
    }

    fn delete(&mut self, collection: &str, key: &Key) -> EngineResult<()> {
        self.ensure_active()?;
        self.ensure_scope(collection)?;
        self.ensure_writable()?;

        self.writes
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), None);
        Ok(())
    }

    fn clear(&mut self, collection: &str) -> EngineResult<()> {
        self.ensure_active()?;
        self.ensure_scope(collection)?;
        self.ensure_writable()?;

        self.writes.remove(collection);
        self.cleared.insert(collection.to_string());
        Ok(())
    }

    fn scan(
        &self,
        collection: &str,
        index: Option<&str>,
        seed: Option<&Key>,
    ) -> EngineResult<Vec<Record>> {
        self.ensure_active()?;
        self.ensure_scope(collection)?;

        let rows = self.effective_rows(collection)?;
        match index {
            None => Ok(rows
                .into_iter()
                .filter(|(key, _)| seed.is_none_or(|s| s == key))
                .map(|(_, record)| record)
                .collect()),
            Some(name) => {
                let def = self.def(collection)?;
                let index = def
                    .index(name)
                    .ok_or_else(|| EngineError::index_not_found(collection, name))?;

                let mut entries: Vec<(Key, Key, Record)> = rows
                    .into_iter()
                    .filter_map(|(pk, record)| {
                        index.key_path.extract(&record).map(|ik| (ik, pk, record))
                    })
                    .filter(|(ik, _, _)| seed.is_none_or(|s| s == ik))
                    .collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                Ok(entries.into_iter().map(|(_, _, record)| record).collect())
            }
        }
    }

    fn keys(&self, collection: &str) -> EngineResult<Vec<Key>> {
        self.ensure_active()?;
        self.ensure_scope(collection)?;
        Ok(self.effective_rows(collection)?.into_keys().collect())
    }

    fn has_index(&self, collection: &str, index: &str) -> EngineResult<bool> {
        self.ensure_active()?;
        self.ensure_scope(collection)?;
        Ok(self.def(collection)?.index(index).is_some())
    }

    fn commit(&mut self) -> EngineResult<()> {
        self.ensure_active()?;

        let mut collections = self.db.collections.write();
        for name in &self.cleared {
            if let Some(collection) = collections.get_mut(name) {
                collection.rows.clear();
            }
        }
        for (name, pending) in &self.writes {
            if let Some(collection) = collections.get_mut(name) {
                for (key, write) in pending {
                    match write {
                        Some(record) => {
                            collection.rows.insert(key.clone(), record.clone());
                        }
                        None => {
                            collection.rows.remove(key);
                        }
                    }
                }
            }
        }

        self.state = TxnState::Finished;
        Ok(())
    }

    fn abort(&mut self) -> EngineResult<()> {
        match &self.state {
            TxnState::Active | TxnState::Poisoned(_) => {
                self.writes.clear();
                self.cleared.clear();
                self.state = TxnState::Finished;
                Ok(())
            }
            TxnState::Finished => Err(EngineError::TransactionFinished),
        }
    }
}
