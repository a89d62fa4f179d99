//! Flat records.

use crate::value::{Key, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The conventional primary key field name.
pub const ID_FIELD: &str = "id";

/// A flat record: an ordered mapping from field name to scalar value.
///
/// Records are the unit of storage for every collection. They are flat by
/// construction - a field holds a [`Value`], never another record. Absence
/// of a field is the "absent" scalar; there is no null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Returns a field's value, or `None` when the field is absent.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Removes a field, returning its previous value.
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Returns whether the field is present.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the record's `id` field, when present and textual.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.get(ID_FIELD).and_then(Value::as_text)
    }

    /// Extracts an index key from a field.
    ///
    /// Returns `None` when the field is absent or its value is not a valid
    /// key type (booleans).
    #[must_use]
    pub fn key_for(&self, field: &str) -> Option<Key> {
        self.get(field).and_then(Value::as_key)
    }

    /// Number of present fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(field, value)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
