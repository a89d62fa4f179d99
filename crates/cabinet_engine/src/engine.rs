//! Storage engine trait definitions.

use crate::defs::{CollectionDef, TxnMode};
use crate::error::EngineResult;
use crate::record::Record;
use crate::value::Key;

/// A transactional, indexed object-storage engine.
///
/// Engines manage named databases, each holding named collections of
/// records with secondary indexes. Cabinet consumes an engine exclusively
/// through this boundary and never re-implements storage, indexing, or
/// durability.
///
/// # Implementors
///
/// - [`crate::MemoryEngine`] - in-memory reference engine, used by tests
pub trait StorageEngine: Send + Sync {
    /// Opens the named database at `version`.
    ///
    /// Creates the database when missing. When `version` is newer than the
    /// persisted version, the returned connection reports
    /// [`EngineConnection::needs_setup`] so the caller can create missing
    /// collections and indexes.
    ///
    /// # Errors
    ///
    /// Returns `VersionMismatch` when `version` is older than the existing
    /// database, or `InvalidDefinition` when `version` is zero.
    fn open_database(&self, name: &str, version: u32) -> EngineResult<Box<dyn EngineConnection>>;

    /// Destroys all persisted state for the named database.
    ///
    /// Returns `false` when no such database existed. Irreversible.
    fn delete_database(&self, name: &str) -> EngineResult<bool>;
}

/// An open connection to one database.
pub trait EngineConnection: Send + Sync {
    /// Whether this open created or upgraded the database, meaning the
    /// caller must run collection setup.
    fn needs_setup(&self) -> bool;

    /// Creates a collection with its indexes.
    ///
    /// Only valid while the connection is open. A malformed definition
    /// (duplicate index names, empty key path) fails this collection's
    /// setup only; sibling collections are unaffected.
    fn create_collection(&self, def: &CollectionDef) -> EngineResult<()>;

    /// Returns whether the collection exists.
    fn has_collection(&self, name: &str) -> bool;

    /// Names of every collection in the database.
    fn collection_names(&self) -> Vec<String>;

    /// The database version this connection sees.
    fn version(&self) -> u32;

    /// Opens a transaction scoped to the declared collection set.
    ///
    /// The transaction is valid only for the named collections; accessing
    /// any other collection fails with `CollectionNotFound`.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` when any declared name does not exist,
    /// or `ConnectionClosed` after [`close`](Self::close).
    fn transaction(
        &self,
        collections: &[String],
        mode: TxnMode,
    ) -> EngineResult<Box<dyn EngineTransaction>>;

    /// Closes the connection. Idempotent.
    fn close(&self);
}

/// A transaction over a pre-declared set of collections.
///
/// Writes are buffered and applied atomically at [`commit`](Self::commit);
/// [`abort`](Self::abort) discards them. Any failed write poisons the
/// transaction: every later operation and the commit itself fail with
/// `TransactionAborted`, and no partial batch is ever visible.
pub trait EngineTransaction: Send {
    /// Point lookup by primary key.
    fn get(&self, collection: &str, key: &Key) -> EngineResult<Option<Record>>;

    /// Upserts a record by its primary key, returning the key.
    ///
    /// Enforces unique indexes against committed and buffered state.
    fn put(&mut self, collection: &str, record: Record) -> EngineResult<Key>;

    /// Deletes by primary key. Succeeds whether or not the key exists.
    fn delete(&mut self, collection: &str, key: &Key) -> EngineResult<()>;

    /// Removes every record in the collection.
    fn clear(&mut self, collection: &str) -> EngineResult<()>;

    /// Cursor iteration, run to exhaustion.
    ///
    /// With `index`, records come back in that index's key order; records
    /// whose key path extracts no valid key are not in the index and are
    /// skipped. Without, records come back in primary key order. `seed`
    /// restricts the cursor to an exact-match key range.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` for an unknown index name.
    fn scan(
        &self,
        collection: &str,
        index: Option<&str>,
        seed: Option<&Key>,
    ) -> EngineResult<Vec<Record>>;

    /// Every primary key in the collection, in order.
    fn keys(&self, collection: &str) -> EngineResult<Vec<Key>>;

    /// Returns whether the collection has an index with this name.
    fn has_index(&self, collection: &str, index: &str) -> EngineResult<bool>;

    /// Applies all buffered writes atomically.
    fn commit(&mut self) -> EngineResult<()>;

    /// Discards all buffered writes.
    fn abort(&mut self) -> EngineResult<()>;
}
