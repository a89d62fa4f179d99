//! Collection and index definitions.

use crate::record::Record;
use crate::value::Key;
use serde::{Deserialize, Serialize};

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnMode {
    /// Reads only; writes are rejected.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// The record field(s) an index is built over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPath {
    /// A single field.
    Single(String),
    /// An ordered list of fields forming a composite key.
    Composite(Vec<String>),
}

impl KeyPath {
    /// Extracts this path's key from a record.
    ///
    /// A composite path yields `Key::Array` with one component per field.
    /// Returns `None` when any constituent field is absent or not a valid
    /// key type; such records simply have no entry in the index.
    #[must_use]
    pub fn extract(&self, record: &Record) -> Option<Key> {
        match self {
            KeyPath::Single(field) => record.key_for(field),
            KeyPath::Composite(fields) => fields
                .iter()
                .map(|f| record.key_for(f))
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
        }
    }
}

/// Definition of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its collection.
    pub name: String,
    /// Field(s) the index is built over.
    pub key_path: KeyPath,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Whether the index requests multi-valued entry behavior.
    ///
    /// Carried through from the schema; inert for flat scalar records.
    pub multi_entry: bool,
}

impl IndexDef {
    /// Creates a non-unique index definition.
    pub fn new(name: impl Into<String>, key_path: KeyPath) -> Self {
        Self {
            name: name.into(),
            key_path,
            unique: false,
            multi_entry: false,
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the index multi-entry.
    #[must_use]
    pub fn multi_entry(mut self) -> Self {
        self.multi_entry = true;
        self
    }
}

/// Definition of a collection: a name, the primary key field, and zero or
/// more secondary indexes.
///
/// Collections are created at database creation/upgrade time and are
/// immutable afterward except via a full version upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDef {
    /// Collection name.
    pub name: String,
    /// Primary key field.
    pub primary_key: String,
    /// Secondary index definitions.
    pub indexes: Vec<IndexDef>,
}

impl CollectionDef {
    /// Creates a collection definition with no secondary indexes.
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            indexes: Vec::new(),
        }
    }

    /// Builder-style index addition.
    #[must_use]
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Looks up a secondary index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }
}
