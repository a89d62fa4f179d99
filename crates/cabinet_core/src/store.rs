//! Record stores: per-collection CRUD over transaction scopes.

use crate::error::{CoreError, CoreResult};
use crate::id::generate_id;
use crate::query::{self, Predicate};
use crate::scope::{ScopeManager, TransactionScope};
use cabinet_engine::{Key, Record, TxnMode, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default name of the soft-delete timestamp field.
pub const DEFAULT_DELETED_FIELD: &str = "deletedTimestamp";

/// Per-store behavior options.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Route `remove` calls to a logical delete that stamps
    /// [`deleted_field`](Self::deleted_field) instead of erasing the
    /// record. Overridable per call.
    pub soft_delete: bool,
    /// Field holding the deletion timestamp (Unix millis). Presence marks
    /// the record logically deleted; absence marks it live.
    pub deleted_field: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            soft_delete: false,
            deleted_field: DEFAULT_DELETED_FIELD.to_string(),
        }
    }
}

impl StoreOptions {
    /// Enables soft-delete with the default timestamp field.
    #[must_use]
    pub fn soft_delete() -> Self {
        Self {
            soft_delete: true,
            ..Self::default()
        }
    }

    /// Overrides the deletion-timestamp field name.
    #[must_use]
    pub fn deleted_field(mut self, field: impl Into<String>) -> Self {
        self.deleted_field = field.into();
        self
    }
}

/// CRUD access to one collection.
///
/// A store binds its primary collection to a fixed, ordered list of
/// related collections declared at registration. Every scope the store
/// opens covers that full list, so a logical operation that composes data
/// across collections - reading a parent then its children - runs inside
/// one transaction instead of losing it between steps. The related list
/// must therefore name every collection any operation chain will touch,
/// even transitively; it is validated when the store is registered.
///
/// Stores are stateless between calls: all state lives in the engine, and
/// each operation acquires and releases its own scope.
pub struct RecordStore {
    name: String,
    primary_key: String,
    tables: Vec<String>,
    options: StoreOptions,
    scopes: Arc<ScopeManager>,
}

impl RecordStore {
    pub(crate) fn new(
        name: String,
        primary_key: String,
        related: Vec<String>,
        options: StoreOptions,
        scopes: Arc<ScopeManager>,
    ) -> Self {
        let mut tables = vec![name.clone()];
        tables.extend(related.into_iter().filter(|t| *t != name));
        Self {
            name,
            primary_key,
            tables,
            options,
            scopes,
        }
    }

    /// The collection this store fronts.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The collections every scope this store opens is declared over.
    #[must_use]
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Opens a scope over this store's declared collections.
    ///
    /// All in-store operations use this internally; it is public so a
    /// caller can compose multi-collection work in one atomic unit.
    pub fn open_scope(&self, mode: TxnMode) -> CoreResult<TransactionScope> {
        self.scopes.open_scope(&self.tables, mode)
    }

    fn key(id: &str) -> Key {
        Key::text(id)
    }

    /// Point lookup by id.
    pub fn get(&self, id: &str) -> CoreResult<Option<Record>> {
        let scope = self.open_scope(TxnMode::ReadOnly)?;
        scope.get(&self.name, &Self::key(id))
    }

    /// Point lookups for every id within one scope; absent ids are
    /// omitted. Optionally stably sorted by `sort_field`.
    pub fn get_many(&self, ids: &[&str], sort_field: Option<&str>) -> CoreResult<Vec<Record>> {
        let scope = self.open_scope(TxnMode::ReadOnly)?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = scope.get(&self.name, &Self::key(id))? {
                records.push(record);
            }
        }
        if let Some(field) = sort_field {
            query::sort_records(&mut records, field);
        }
        Ok(records)
    }

    /// Full collection scan, optionally sorted.
    pub fn get_all(&self, sort_field: Option<&str>) -> CoreResult<Vec<Record>> {
        let scope = self.open_scope(TxnMode::ReadOnly)?;
        let mut records = scope.scan(&self.name, None, None)?;
        if let Some(field) = sort_field {
            query::sort_records(&mut records, field);
        }
        Ok(records)
    }

    /// Equality query over indexed fields.
    ///
    /// See [`crate::Predicate`] for matcher semantics and
    /// [`crate::Resolution`] for access path selection.
    pub fn query(&self, predicate: &Predicate, sort_field: Option<&str>) -> CoreResult<Vec<Record>> {
        let scope = self.open_scope(TxnMode::ReadOnly)?;
        query::query(&scope, &self.name, &self.primary_key, predicate, sort_field)
    }

    fn ensure_id(&self, mut record: Record) -> Record {
        if record.key_for(&self.primary_key).is_none() {
            record.set(self.primary_key.clone(), generate_id());
        }
        record
    }

    /// Adds a record, generating its id when absent.
    ///
    /// There are no insert-only semantics: this is upsert-by-id through
    /// the update path, and success means the write round-tripped through
    /// the read-back.
    pub fn add(&self, record: Record) -> CoreResult<bool> {
        self.update(self.ensure_id(record)).map(|_| true)
    }

    /// Adds many records in one transaction, one success flag each.
    pub fn add_many(&self, records: Vec<Record>) -> CoreResult<Vec<bool>> {
        let records: Vec<Record> = records.into_iter().map(|r| self.ensure_id(r)).collect();
        let written = self.update_many(records)?;
        Ok(vec![true; written.len()])
    }

    /// Writes the record, then reads it back by its resulting key within
    /// the same scope - the caller observes exactly what is now persisted,
    /// not merely its own input echoed back.
    pub fn update(&self, record: Record) -> CoreResult<Record> {
        let mut scope = self.open_scope(TxnMode::ReadWrite)?;
        let fresh = Self::write_and_reread(&mut scope, &self.name, record)?;
        scope.commit()?;
        Ok(fresh)
    }

    /// Writes all records, then re-reads each by id, all in one
    /// transaction.
    pub fn update_many(&self, records: Vec<Record>) -> CoreResult<Vec<Record>> {
        let mut scope = self.open_scope(TxnMode::ReadWrite)?;
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            keys.push(scope.put(&self.name, record)?);
        }
        let mut fresh = Vec::with_capacity(keys.len());
        for key in &keys {
            fresh.push(
                scope
                    .get(&self.name, key)?
                    .ok_or_else(|| CoreError::invariant("write did not round-trip"))?,
            );
        }
        scope.commit()?;
        Ok(fresh)
    }

    fn write_and_reread(
        scope: &mut TransactionScope,
        collection: &str,
        record: Record,
    ) -> CoreResult<Record> {
        let key = scope.put(collection, record)?;
        scope
            .get(collection, &key)?
            .ok_or_else(|| CoreError::invariant("write did not round-trip"))
    }

    /// Removes a record.
    ///
    /// On a soft-delete store this marks the record deleted instead,
    /// unless `override_soft_delete` forces a physical delete.
    pub fn remove(&self, id: &str, override_soft_delete: bool) -> CoreResult<bool> {
        if self.options.soft_delete && !override_soft_delete {
            self.set_deleted_flag(&[id], true)?;
            return Ok(true);
        }
        let mut scope = self.open_scope(TxnMode::ReadWrite)?;
        scope.delete(&self.name, &Self::key(id))?;
        scope.commit()?;
        Ok(true)
    }

    /// Removes many records with one success flag per id.
    ///
    /// Physical deletes are issued strictly sequentially - each deletion's
    /// acknowledgment is the only safe point to issue the next, since the
    /// engine has no bulk delete-by-id-list primitive - all within a
    /// single transaction. The call resolves only once every id has been
    /// processed or the scope aborts.
    pub fn remove_many(&self, ids: &[&str], override_soft_delete: bool) -> CoreResult<Vec<bool>> {
        if self.options.soft_delete && !override_soft_delete {
            self.set_deleted_flag(ids, true)?;
            return Ok(vec![true; ids.len()]);
        }
        let mut scope = self.open_scope(TxnMode::ReadWrite)?;
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            scope.delete(&self.name, &Self::key(id))?;
            results.push(true);
        }
        scope.commit()?;
        Ok(results)
    }

    /// Marks a record not deleted.
    pub fn restore(&self, id: &str) -> CoreResult<()> {
        self.set_deleted_flag(&[id], false).map(|_| ())
    }

    /// Marks many records not deleted.
    pub fn restore_many(&self, ids: &[&str]) -> CoreResult<()> {
        self.set_deleted_flag(ids, false).map(|_| ())
    }

    /// Stamps or clears the deletion-timestamp field on the target
    /// records, writing back through the update path in one transaction.
    /// Ids with no record are skipped. Returns the freshly persisted
    /// records.
    pub fn set_deleted_flag(&self, ids: &[&str], deleted: bool) -> CoreResult<Vec<Record>> {
        let mut scope = self.open_scope(TxnMode::ReadWrite)?;
        let mut updated = Vec::new();
        for id in ids {
            let Some(mut record) = scope.get(&self.name, &Self::key(id))? else {
                continue;
            };
            if deleted {
                record.set(self.options.deleted_field.clone(), Value::Number(now_millis()));
            } else {
                record.unset(&self.options.deleted_field);
            }
            updated.push(Self::write_and_reread(&mut scope, &self.name, record)?);
        }
        scope.commit()?;
        Ok(updated)
    }

    /// Removes every record in the collection unconditionally, bypassing
    /// soft-delete.
    pub fn clear(&self) -> CoreResult<()> {
        let mut scope = self.open_scope(TxnMode::ReadWrite)?;
        scope.clear(&self.name)?;
        scope.commit()
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("name", &self.name)
            .field("tables", &self.tables)
            .field("soft_delete", &self.options.soft_delete)
            .finish_non_exhaustive()
    }
}

fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabinet_engine::{CollectionDef, IndexDef, KeyPath, MemoryEngine, StorageEngine};
    use proptest::prelude::*;

    fn store_with(options: StoreOptions) -> RecordStore {
        let engine = MemoryEngine::new();
        let connection = engine.open_database("stores", 1).unwrap();
        connection
            .create_collection(
                &CollectionDef::new("notes", "id")
                    .with_index(IndexDef::new("ownerId", KeyPath::Single("ownerId".into()))),
            )
            .unwrap();
        let scopes = Arc::new(ScopeManager::new());
        scopes.attach(connection);
        RecordStore::new("notes".into(), "id".into(), Vec::new(), options, scopes)
    }

    fn plain_store() -> RecordStore {
        store_with(StoreOptions::default())
    }

    #[test]
    fn update_then_get_roundtrips() {
        let store = plain_store();
        let record = Record::new().with("id", "n1").with("body", "hello");
        let written = store.update(record.clone()).unwrap();
        assert_eq!(written, record);
        assert_eq!(store.get("n1").unwrap(), Some(record));
    }

    #[test]
    fn get_absent_id_is_none() {
        let store = plain_store();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn add_generates_an_id_when_absent() {
        let store = plain_store();
        assert!(store.add(Record::new().with("body", "no id")).unwrap());

        let all = store.get_all(None).unwrap();
        assert_eq!(all.len(), 1);
        let id = all[0].id().unwrap();
        assert_eq!(id.len(), 27);
    }

    #[test]
    fn add_keeps_an_existing_id() {
        let store = plain_store();
        assert!(store.add(Record::new().with("id", "n1")).unwrap());
        assert!(store.get("n1").unwrap().is_some());
    }

    #[test]
    fn add_is_upsert_by_id() {
        let store = plain_store();
        store.add(Record::new().with("id", "n1").with("v", 1)).unwrap();
        store.add(Record::new().with("id", "n1").with("v", 2)).unwrap();

        let record = store.get("n1").unwrap().unwrap();
        assert_eq!(record.get("v"), Some(&Value::Number(2.0)));
        assert_eq!(store.get_all(None).unwrap().len(), 1);
    }

    #[test]
    fn update_many_rereads_every_record() {
        let store = plain_store();
        let records = vec![
            Record::new().with("id", "n1").with("rank", 2),
            Record::new().with("id", "n2").with("rank", 1),
        ];
        let written = store.update_many(records.clone()).unwrap();
        assert_eq!(written, records);

        let fetched = store.get_many(&["n1", "n2"], Some("rank")).unwrap();
        assert_eq!(fetched[0].id(), Some("n2"));
        assert_eq!(fetched[1].id(), Some("n1"));
    }

    #[test]
    fn get_many_omits_absent_ids() {
        let store = plain_store();
        store.add(Record::new().with("id", "n1")).unwrap();
        let records = store.get_many(&["n1", "ghost"], None).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn remove_many_deletes_every_id_sequentially() {
        let store = plain_store();
        for id in ["n1", "n2", "n3"] {
            store.add(Record::new().with("id", id)).unwrap();
        }

        let results = store.remove_many(&["n1", "n2", "n3"], false).unwrap();
        assert_eq!(results, vec![true, true, true]);
        for id in ["n1", "n2", "n3"] {
            assert!(store.get(id).unwrap().is_none());
        }
    }

    #[test]
    fn soft_delete_marks_instead_of_erasing() {
        let store = store_with(StoreOptions::soft_delete());
        store.add(Record::new().with("id", "n1").with("body", "keep me")).unwrap();

        assert!(store.remove("n1", false).unwrap());

        let record = store.get("n1").unwrap().expect("record still retrievable");
        let stamp = record.get(DEFAULT_DELETED_FIELD).expect("timestamp set");
        assert!(matches!(stamp, Value::Number(ms) if *ms > 0.0));
    }

    #[test]
    fn restore_clears_the_timestamp() {
        let store = store_with(StoreOptions::soft_delete());
        store.add(Record::new().with("id", "n1")).unwrap();
        store.remove("n1", false).unwrap();

        store.restore("n1").unwrap();

        let record = store.get("n1").unwrap().unwrap();
        assert!(!record.contains(DEFAULT_DELETED_FIELD));
    }

    #[test]
    fn override_forces_physical_delete() {
        let store = store_with(StoreOptions::soft_delete());
        store.add(Record::new().with("id", "n1")).unwrap();

        assert!(store.remove("n1", true).unwrap());
        assert!(store.get("n1").unwrap().is_none());
    }

    #[test]
    fn custom_deleted_field_name() {
        let store = store_with(StoreOptions::soft_delete().deleted_field("goneAt"));
        store.add(Record::new().with("id", "n1")).unwrap();
        store.remove("n1", false).unwrap();

        let record = store.get("n1").unwrap().unwrap();
        assert!(record.contains("goneAt"));
        assert!(!record.contains(DEFAULT_DELETED_FIELD));
    }

    #[test]
    fn clear_wipes_soft_deleted_records_too() {
        let store = store_with(StoreOptions::soft_delete());
        store.add(Record::new().with("id", "n1")).unwrap();
        store.add(Record::new().with("id", "n2")).unwrap();
        store.remove("n1", false).unwrap();

        store.clear().unwrap();
        assert!(store.get_all(None).unwrap().is_empty());
    }

    #[test]
    fn set_deleted_flag_skips_missing_ids() {
        let store = store_with(StoreOptions::soft_delete());
        store.add(Record::new().with("id", "n1")).unwrap();

        let updated = store.set_deleted_flag(&["n1", "ghost"], true).unwrap();
        assert_eq!(updated.len(), 1);
        assert!(updated[0].contains(DEFAULT_DELETED_FIELD));
    }

    #[test]
    fn query_uses_the_store_primary_key() {
        let store = plain_store();
        store.add(Record::new().with("id", "n1").with("ownerId", "u1")).unwrap();

        let hits = store
            .query(&Predicate::new().field("id", "n1"), None)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| Value::Number(f64::from(n))),
            "[a-z0-9]{0,12}".prop_map(Value::Text),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        ]
    }

    proptest! {
        // Round-trip law: whatever update persists, a subsequent get
        // returns deep-equal.
        #[test]
        fn update_get_roundtrip_law(
            fields in proptest::collection::btree_map("[a-z]{1,8}", value_strategy(), 0..6)
        ) {
            let store = plain_store();
            let mut record: Record = fields.into_iter().collect();
            record.set("id", "r1");

            let written = store.update(record.clone()).unwrap();
            prop_assert_eq!(&written, &record);
            prop_assert_eq!(store.get("r1").unwrap(), Some(record));
        }
    }
}
