//! Scalar values and index keys.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A flat scalar field value.
///
/// Records map field names to values; a field that is logically absent
/// simply has no entry in its record. Values are never nested - there is
/// no record- or collection-valued variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean value. Booleans are not valid index keys.
    Bool(bool),
    /// Numeric value (IEEE 754 double).
    Number(f64),
    /// UTF-8 text.
    Text(String),
    /// Binary blob.
    Bytes(Vec<u8>),
}

impl Value {
    /// Converts this value into an index key, if it is a valid key type.
    ///
    /// Booleans are not valid keys: a boolean-valued field produces no
    /// index entry, so equality seeks against a boolean find nothing via
    /// an index. This mirrors the underlying engine's key model and is not
    /// special-cased anywhere above it.
    #[must_use]
    pub fn as_key(&self) -> Option<Key> {
        match self {
            Value::Bool(_) => None,
            Value::Number(n) => Some(Key::Number(*n)),
            Value::Text(s) => Some(Key::Text(s.clone())),
            Value::Bytes(b) => Some(Key::Bytes(b.clone())),
        }
    }

    /// Returns the text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric content, if this is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// An index key.
///
/// Keys are totally ordered: numbers sort before text, text before bytes,
/// bytes before composite arrays. Within numbers, IEEE total ordering is
/// used so keys are usable in ordered containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Key {
    /// Numeric key.
    Number(f64),
    /// Text key.
    Text(String),
    /// Binary key.
    Bytes(Vec<u8>),
    /// Composite key, one component per indexed field in declared order.
    Array(Vec<Key>),
}

impl Key {
    /// Creates a text key.
    pub fn text(s: impl Into<String>) -> Self {
        Key::Text(s.into())
    }

    /// Returns the text content, if this is a text key.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Text(_) => 1,
            Key::Bytes(_) => 2,
            Key::Array(_) => 3,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            (Key::Bytes(a), Key::Bytes(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cmp(y) {
                        Ordering::Equal => {}
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bool_is_not_a_key() {
        assert!(Value::Bool(true).as_key().is_none());
        assert!(Value::Bool(false).as_key().is_none());
    }

    #[test]
    fn scalar_keys_convert() {
        assert_eq!(Value::Number(3.0).as_key(), Some(Key::Number(3.0)));
        assert_eq!(Value::Text("a".into()).as_key(), Some(Key::text("a")));
        assert_eq!(
            Value::Bytes(vec![1, 2]).as_key(),
            Some(Key::Bytes(vec![1, 2]))
        );
    }

    #[test]
    fn type_order_is_number_text_bytes_array() {
        let number = Key::Number(f64::MAX);
        let text = Key::text("");
        let bytes = Key::Bytes(vec![]);
        let array = Key::Array(vec![]);
        assert!(number < text);
        assert!(text < bytes);
        assert!(bytes < array);
    }

    #[test]
    fn array_keys_order_componentwise() {
        let a = Key::Array(vec![Key::text("a"), Key::Number(1.0)]);
        let b = Key::Array(vec![Key::text("a"), Key::Number(2.0)]);
        let c = Key::Array(vec![Key::text("b"), Key::Number(0.0)]);
        assert!(a < b);
        assert!(b < c);
        // Shorter prefix sorts first
        let prefix = Key::Array(vec![Key::text("a")]);
        assert!(prefix < a);
    }

    proptest! {
        #[test]
        fn number_ordering_is_total(a in any::<f64>(), b in any::<f64>()) {
            let (ka, kb) = (Key::Number(a), Key::Number(b));
            // total_cmp never panics and is antisymmetric
            prop_assert_eq!(ka.cmp(&kb), kb.cmp(&ka).reverse());
        }
    }
}
