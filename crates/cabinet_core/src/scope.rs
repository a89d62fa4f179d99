//! Transaction scope management.
//!
//! The underlying engine finalizes transactions on its own schedule, not
//! at the end of a logical unit of work. This module makes the scope an
//! explicit, caller-held resource instead: a [`TransactionScope`] is
//! acquired for a pre-declared collection set, committed exactly once on
//! the success path, and aborted on every other exit path by `Drop`.

use crate::error::{CoreError, CoreResult};
use cabinet_engine::{EngineConnection, EngineTransaction, Key, Record, TxnMode};
use parking_lot::RwLock;

/// Hands out transaction scopes over the session's live connection.
pub struct ScopeManager {
    connection: RwLock<Option<Box<dyn EngineConnection>>>,
}

impl ScopeManager {
    pub(crate) fn new() -> Self {
        Self {
            connection: RwLock::new(None),
        }
    }

    pub(crate) fn attach(&self, connection: Box<dyn EngineConnection>) {
        *self.connection.write() = Some(connection);
    }

    pub(crate) fn detach(&self) -> Option<Box<dyn EngineConnection>> {
        self.connection.write().take()
    }

    /// Runs a closure against the live connection.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&dyn EngineConnection) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let guard = self.connection.read();
        match guard.as_deref() {
            Some(connection) => f(connection),
            None => Err(CoreError::NotOpen),
        }
    }

    /// Opens a transaction scope over the declared collections.
    ///
    /// The scope is valid only for the named collections, in declared
    /// order; the engine rejects access to anything else with a
    /// collection-not-found failure.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::NotOpen`] when no underlying connection
    /// exists.
    pub fn open_scope(&self, collections: &[String], mode: TxnMode) -> CoreResult<TransactionScope> {
        let guard = self.connection.read();
        let connection = guard.as_deref().ok_or(CoreError::NotOpen)?;
        let txn = connection.transaction(collections, mode)?;
        Ok(TransactionScope {
            txn,
            finished: false,
        })
    }
}

impl std::fmt::Debug for ScopeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeManager")
            .field("attached", &self.connection.read().is_some())
            .finish()
    }
}

/// An explicit, caller-held transaction scope.
///
/// The scope is the unit of atomicity: operations issued through it all
/// commit together or the whole scope aborts, and no partial batch write
/// is ever observed. [`commit`](Self::commit) consumes the scope; dropping
/// an uncommitted scope aborts it, so the underlying transaction is
/// released on success, failure, and early return alike.
pub struct TransactionScope {
    txn: Box<dyn EngineTransaction>,
    finished: bool,
}

impl TransactionScope {
    /// Point lookup by primary key.
    pub fn get(&self, collection: &str, key: &Key) -> CoreResult<Option<Record>> {
        Ok(self.txn.get(collection, key)?)
    }

    /// Upserts a record, returning its primary key.
    pub fn put(&mut self, collection: &str, record: Record) -> CoreResult<Key> {
        Ok(self.txn.put(collection, record)?)
    }

    /// Deletes by primary key.
    pub fn delete(&mut self, collection: &str, key: &Key) -> CoreResult<()> {
        Ok(self.txn.delete(collection, key)?)
    }

    /// Removes every record in the collection.
    pub fn clear(&mut self, collection: &str) -> CoreResult<()> {
        Ok(self.txn.clear(collection)?)
    }

    /// Cursor iteration to exhaustion, optionally over an index with an
    /// exact-match seed.
    pub fn scan(
        &self,
        collection: &str,
        index: Option<&str>,
        seed: Option<&Key>,
    ) -> CoreResult<Vec<Record>> {
        Ok(self.txn.scan(collection, index, seed)?)
    }

    /// Every primary key in the collection.
    pub fn keys(&self, collection: &str) -> CoreResult<Vec<Key>> {
        Ok(self.txn.keys(collection)?)
    }

    /// Returns whether the collection has the named index.
    pub fn has_index(&self, collection: &str, index: &str) -> CoreResult<bool> {
        Ok(self.txn.has_index(collection, index)?)
    }

    /// Commits the scope, applying all buffered writes atomically.
    pub fn commit(mut self) -> CoreResult<()> {
        self.txn.commit()?;
        self.finished = true;
        Ok(())
    }

    /// Aborts the scope, discarding all buffered writes.
    pub fn abort(mut self) -> CoreResult<()> {
        self.txn.abort()?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.txn.abort();
        }
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabinet_engine::{CollectionDef, MemoryEngine, StorageEngine};

    fn manager_with(collections: &[&str]) -> ScopeManager {
        let engine = MemoryEngine::new();
        let connection = engine.open_database("scopes", 1).unwrap();
        for name in collections {
            connection
                .create_collection(&CollectionDef::new(*name, "id"))
                .unwrap();
        }
        let manager = ScopeManager::new();
        manager.attach(connection);
        manager
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn open_scope_before_attach_is_not_open() {
        let manager = ScopeManager::new();
        let result = manager.open_scope(&names(&["a"]), TxnMode::ReadOnly);
        assert!(matches!(result, Err(CoreError::NotOpen)));
    }

    #[test]
    fn committed_scope_persists_writes() {
        let manager = manager_with(&["a"]);

        let mut scope = manager.open_scope(&names(&["a"]), TxnMode::ReadWrite).unwrap();
        scope.put("a", Record::new().with("id", "r1")).unwrap();
        scope.commit().unwrap();

        let scope = manager.open_scope(&names(&["a"]), TxnMode::ReadOnly).unwrap();
        assert!(scope.get("a", &Key::text("r1")).unwrap().is_some());
    }

    #[test]
    fn dropped_scope_aborts() {
        let manager = manager_with(&["a"]);

        {
            let mut scope = manager.open_scope(&names(&["a"]), TxnMode::ReadWrite).unwrap();
            scope.put("a", Record::new().with("id", "r1")).unwrap();
            // No commit: the scope falls out of this block.
        }

        let scope = manager.open_scope(&names(&["a"]), TxnMode::ReadOnly).unwrap();
        assert!(scope.get("a", &Key::text("r1")).unwrap().is_none());
    }

    #[test]
    fn undeclared_collection_is_rejected() {
        let manager = manager_with(&["a", "b"]);
        let scope = manager.open_scope(&names(&["a"]), TxnMode::ReadOnly).unwrap();
        let result = scope.get("b", &Key::text("r1"));
        assert!(matches!(result, Err(CoreError::CollectionNotFound { .. })));
    }

    #[test]
    fn multi_collection_scope_commits_atomically() {
        let manager = manager_with(&["a", "b"]);

        let mut scope = manager
            .open_scope(&names(&["a", "b"]), TxnMode::ReadWrite)
            .unwrap();
        scope.put("a", Record::new().with("id", "r1")).unwrap();
        scope.put("b", Record::new().with("id", "r2")).unwrap();
        scope.commit().unwrap();

        let scope = manager
            .open_scope(&names(&["a", "b"]), TxnMode::ReadOnly)
            .unwrap();
        assert!(scope.get("a", &Key::text("r1")).unwrap().is_some());
        assert!(scope.get("b", &Key::text("r2")).unwrap().is_some());
    }

    #[test]
    fn detach_makes_manager_not_open() {
        let manager = manager_with(&["a"]);
        manager.detach();
        let result = manager.open_scope(&names(&["a"]), TxnMode::ReadOnly);
        assert!(matches!(result, Err(CoreError::NotOpen)));
    }
}
