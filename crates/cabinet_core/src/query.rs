//! Predicate query engine.
//!
//! Answers an arbitrary-arity equality predicate with an index lookup plus
//! in-memory residual filtering. Index selection is a two-step resolver
//! with an explicit fallback: a composite index covering the whole
//! predicate is preferred; failing that, the first field's single-field
//! index seeds the scan and the remaining fields are checked in memory.

use crate::error::{CoreError, CoreResult};
use crate::scope::TransactionScope;
use cabinet_engine::{EngineError, Key, Record, Value};
use tracing::debug;

/// How a predicate field matches a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Equal to one value (loose equality).
    Scalar(Value),
    /// Equal to at least one member of the set (loose equality).
    AnyOf(Vec<Value>),
}

/// An equality predicate: an explicit, ordered list of field matchers.
///
/// Field order is the declared order - it drives composite index naming
/// and single-field index selection, and is never derived from map
/// iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    fields: Vec<(String, Matcher)>,
}

impl Predicate {
    /// Creates an empty predicate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an exact-value field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), Matcher::Scalar(value.into())));
        self
    }

    /// Adds a field matching any of a set of candidate values.
    #[must_use]
    pub fn field_in<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.fields.push((
            name.into(),
            Matcher::AnyOf(values.into_iter().map(Into::into).collect()),
        ));
        self
    }

    /// Number of predicate fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether the predicate has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The `(field, matcher)` pairs in declared order.
    #[must_use]
    pub fn entries(&self) -> &[(String, Matcher)] {
        &self.fields
    }
}

/// Outcome of index resolution for a predicate.
///
/// The composite attempt and its fallback are modeled as explicit steps
/// so the behavior is visible and testable rather than incidental: a
/// failed composite resolution silently falls back to single-field
/// resolution, while a failed single-field resolution is a caller error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A composite index covers every predicate field in declared order.
    Composite {
        /// Name of the composite index (fields joined with `+`).
        index: String,
    },
    /// The first predicate field's index seeds the scan.
    Single {
        /// The seeding field.
        field: String,
        /// Whether the field is the collection's primary key, in which
        /// case the scan runs in primary key order with no named index.
        primary: bool,
    },
    /// No usable index exists for the first predicate field.
    NotFound {
        /// The unresolvable field.
        field: String,
    },
}

/// Resolves the access path for a predicate.
///
/// Composite resolution applies only when the predicate has more than one
/// field and every matcher is a scalar - composite seeds cannot carry a
/// per-field value set.
pub fn resolve(
    scope: &TransactionScope,
    collection: &str,
    primary_key: &str,
    predicate: &Predicate,
) -> CoreResult<Resolution> {
    let entries = predicate.entries();
    let Some((first, _)) = entries.split_first() else {
        return Err(CoreError::invariant("predicate has no fields"));
    };

    let all_scalar = entries
        .iter()
        .all(|(_, matcher)| matches!(matcher, Matcher::Scalar(_)));
    if entries.len() > 1 && all_scalar {
        let name = entries
            .iter()
            .map(|(field, _)| field.as_str())
            .collect::<Vec<_>>()
            .join("+");
        if scope.has_index(collection, &name)? {
            return Ok(Resolution::Composite { index: name });
        }
        // Intentional silent fallback to single-field resolution.
    }

    let field = first.0.clone();
    if field == primary_key {
        return Ok(Resolution::Single {
            field,
            primary: true,
        });
    }
    if scope.has_index(collection, &field)? {
        return Ok(Resolution::Single {
            field,
            primary: false,
        });
    }
    Ok(Resolution::NotFound { field })
}

/// Runs an equality query against a collection within an open scope.
///
/// The scan always runs to exhaustion - cursors are the only iteration
/// primitive - and residual filtering excludes records whose remaining
/// predicate fields do not match. With `sort_field`, results are stably
/// sorted ascending by numeric coercion of that field; sorting on a
/// non-numeric field leaves the affected records in unspecified order.
pub fn query(
    scope: &TransactionScope,
    collection: &str,
    primary_key: &str,
    predicate: &Predicate,
    sort_field: Option<&str>,
) -> CoreResult<Vec<Record>> {
    let entries = predicate.entries();
    let resolution = resolve(scope, collection, primary_key, predicate)?;
    debug!(collection, ?resolution, "selected query access path");

    let (records, skip_first) = match &resolution {
        Resolution::Composite { index } => {
            let seed = composite_seed(entries)?;
            (scope.scan(collection, Some(index), Some(&seed))?, true)
        }
        Resolution::Single { field, primary } => {
            let index = if *primary { None } else { Some(field.as_str()) };
            match &entries[0].1 {
                Matcher::Scalar(value) => {
                    let seed = scalar_seed(value)?;
                    (scope.scan(collection, index, Some(&seed))?, true)
                }
                // A value set cannot seed a key range: scan everything and
                // residual-filter the field along with the rest.
                Matcher::AnyOf(_) => (scope.scan(collection, index, None)?, false),
            }
        }
        Resolution::NotFound { field } => {
            return Err(CoreError::index_not_found(collection, field.clone()));
        }
    };

    let residual = if skip_first { &entries[1..] } else { entries };
    let mut matched: Vec<Record> = records
        .into_iter()
        .filter(|record| residual_matches(record, residual))
        .collect();
    if let Some(field) = sort_field {
        sort_records(&mut matched, field);
    }
    Ok(matched)
}

fn scalar_seed(value: &Value) -> CoreResult<Key> {
    value
        .as_key()
        .ok_or_else(|| EngineError::invalid_key("value is not a valid index key").into())
}

fn composite_seed(entries: &[(String, Matcher)]) -> CoreResult<Key> {
    entries
        .iter()
        .map(|(_, matcher)| match matcher {
            Matcher::Scalar(value) => scalar_seed(value),
            Matcher::AnyOf(_) => Err(CoreError::invariant(
                "composite seeds cannot carry a value set",
            )),
        })
        .collect::<CoreResult<Vec<_>>>()
        .map(Key::Array)
}

/// Residual filter: each remaining predicate field must match; the first
/// failing field excludes the record.
fn residual_matches(record: &Record, entries: &[(String, Matcher)]) -> bool {
    entries.iter().all(|(field, matcher)| {
        let Some(have) = record.get(field) else {
            return false;
        };
        match matcher {
            Matcher::Scalar(want) => loosely_eq(have, want),
            Matcher::AnyOf(set) => set.iter().any(|want| loosely_eq(have, want)),
        }
    })
}

/// Loose equality between field values.
///
/// Same-type comparisons are strict. Across types, both sides coerce
/// numerically - text parses as a float, booleans coerce to 0/1 - so a
/// numeric string matches its number (`"7"` matches `7`). Bytes never
/// coerce. Cross-type coercion is intentional compatibility behavior.
#[must_use]
pub fn loosely_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        _ => match (coerce_number(a), coerce_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Text(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Bytes(_) => None,
    }
}

/// Stable ascending sort by numeric coercion of `field`.
///
/// Sort keys are assumed numeric or numeric-coercible. A record whose sort
/// field is absent or non-numeric contributes no ordering signal, so its
/// relative order is whatever the scan produced - unspecified behavior,
/// kept rather than fixed.
pub(crate) fn sort_records(records: &mut [Record], field: &str) {
    records.sort_by(|a, b| {
        let x = a.get(field).and_then(coerce_number);
        let y = b.get(field).and_then(coerce_number);
        match (x, y) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            _ => std::cmp::Ordering::Equal,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeManager;
    use cabinet_engine::{
        CollectionDef, IndexDef, KeyPath, MemoryEngine, StorageEngine, TxnMode,
    };

    fn tasks_def() -> CollectionDef {
        CollectionDef::new("tasks", "id")
            .with_index(IndexDef::new("userId", KeyPath::Single("userId".into())))
            .with_index(IndexDef::new(
                "code+userId",
                KeyPath::Composite(vec!["code".into(), "userId".into()]),
            ))
            .with_index(IndexDef::new("code", KeyPath::Single("code".into())).unique())
            .with_index(IndexDef::new("rank", KeyPath::Single("rank".into())))
    }

    fn manager() -> ScopeManager {
        let engine = MemoryEngine::new();
        let connection = engine.open_database("queries", 1).unwrap();
        connection.create_collection(&tasks_def()).unwrap();
        let manager = ScopeManager::new();
        manager.attach(connection);
        manager
    }

    fn seed_tasks(manager: &ScopeManager) {
        let tables = vec!["tasks".to_string()];
        let mut scope = manager.open_scope(&tables, TxnMode::ReadWrite).unwrap();
        for (id, code, user, rank) in [
            ("t1", "A", "u1", 3),
            ("t2", "B", "u1", 1),
            ("t3", "C", "u2", 2),
        ] {
            scope
                .put(
                    "tasks",
                    Record::new()
                        .with("id", id)
                        .with("code", code)
                        .with("userId", user)
                        .with("rank", rank),
                )
                .unwrap();
        }
        scope.commit().unwrap();
    }

    fn read_scope(manager: &ScopeManager) -> TransactionScope {
        manager
            .open_scope(&["tasks".to_string()], TxnMode::ReadOnly)
            .unwrap()
    }

    #[test]
    fn predicate_preserves_declared_order() {
        let predicate = Predicate::new().field("b", 1).field("a", 2);
        let fields: Vec<&str> = predicate.entries().iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["b", "a"]);
    }

    #[test]
    fn resolves_composite_when_fields_align() {
        let manager = manager();
        let scope = read_scope(&manager);
        let predicate = Predicate::new().field("code", "A").field("userId", "u1");
        let resolution = resolve(&scope, "tasks", "id", &predicate).unwrap();
        assert_eq!(
            resolution,
            Resolution::Composite {
                index: "code+userId".into()
            }
        );
    }

    #[test]
    fn falls_back_to_single_without_composite() {
        let manager = manager();
        let scope = read_scope(&manager);
        // userId+code (reversed order) names no index; the fallback seeds
        // on the first field.
        let predicate = Predicate::new().field("userId", "u1").field("code", "A");
        let resolution = resolve(&scope, "tasks", "id", &predicate).unwrap();
        assert_eq!(
            resolution,
            Resolution::Single {
                field: "userId".into(),
                primary: false
            }
        );
    }

    #[test]
    fn value_set_forces_single_path() {
        let manager = manager();
        let scope = read_scope(&manager);
        let predicate = Predicate::new()
            .field_in("code", ["A", "B"])
            .field("userId", "u1");
        let resolution = resolve(&scope, "tasks", "id", &predicate).unwrap();
        assert!(matches!(resolution, Resolution::Single { .. }));
    }

    #[test]
    fn primary_key_field_uses_primary_order() {
        let manager = manager();
        let scope = read_scope(&manager);
        let predicate = Predicate::new().field("id", "t1");
        let resolution = resolve(&scope, "tasks", "id", &predicate).unwrap();
        assert_eq!(
            resolution,
            Resolution::Single {
                field: "id".into(),
                primary: true
            }
        );
    }

    #[test]
    fn unindexed_field_is_a_caller_error() {
        let manager = manager();
        seed_tasks(&manager);
        let scope = read_scope(&manager);
        let predicate = Predicate::new().field("title", "x");
        let result = query(&scope, "tasks", "id", &predicate, None);
        assert!(matches!(result, Err(CoreError::IndexNotFound { .. })));
    }

    #[test]
    fn single_scalar_query_matches_exactly() {
        let manager = manager();
        seed_tasks(&manager);
        let scope = read_scope(&manager);
        let hits = query(
            &scope,
            "tasks",
            "id",
            &Predicate::new().field("userId", "u1"),
            None,
        )
        .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|r| r.get("userId") == Some(&Value::Text("u1".into()))));
    }

    #[test]
    fn value_set_query_is_the_union() {
        let manager = manager();
        seed_tasks(&manager);
        let scope = read_scope(&manager);
        let hits = query(
            &scope,
            "tasks",
            "id",
            &Predicate::new().field_in("code", ["A", "C"]),
            None,
        )
        .unwrap();
        let mut ids: Vec<_> = hits.iter().map(|r| r.id().unwrap().to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["t1", "t3"]);
    }

    #[test]
    fn composite_and_fallback_agree() {
        let manager = manager();
        seed_tasks(&manager);
        let scope = read_scope(&manager);

        // Composite path.
        let composite = query(
            &scope,
            "tasks",
            "id",
            &Predicate::new().field("code", "A").field("userId", "u1"),
            None,
        )
        .unwrap();

        // Reversed field order resolves no composite index, so this runs
        // the single-field path with residual filtering.
        let fallback = query(
            &scope,
            "tasks",
            "id",
            &Predicate::new().field("userId", "u1").field("code", "A"),
            None,
        )
        .unwrap();

        assert_eq!(composite.len(), 1);
        assert_eq!(composite[0].id(), Some("t1"));
        assert_eq!(composite, fallback);
    }

    #[test]
    fn query_by_primary_key() {
        let manager = manager();
        seed_tasks(&manager);
        let scope = read_scope(&manager);
        let hits = query(
            &scope,
            "tasks",
            "id",
            &Predicate::new().field("id", "t2"),
            None,
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), Some("t2"));
    }

    #[test]
    fn sort_field_orders_numerically() {
        let manager = manager();
        seed_tasks(&manager);
        let scope = read_scope(&manager);
        let hits = query(
            &scope,
            "tasks",
            "id",
            &Predicate::new().field_in("code", ["A", "B", "C"]),
            Some("rank"),
        )
        .unwrap();
        let ids: Vec<_> = hits.iter().map(|r| r.id().unwrap().to_string()).collect();
        assert_eq!(ids, vec!["t2", "t3", "t1"]);
    }

    #[test]
    fn numeric_string_matches_number() {
        let manager = manager();
        let tables = vec!["tasks".to_string()];
        let mut scope = manager.open_scope(&tables, TxnMode::ReadWrite).unwrap();
        scope
            .put(
                "tasks",
                Record::new().with("id", "t9").with("userId", "u9").with("rank", 7),
            )
            .unwrap();
        scope.commit().unwrap();

        let scope = read_scope(&manager);
        let hits = query(
            &scope,
            "tasks",
            "id",
            &Predicate::new()
                .field("userId", "u9")
                .field("rank", "7"),
            None,
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn loose_equality_coerces_across_types() {
        assert!(loosely_eq(&Value::Text("7".into()), &Value::Number(7.0)));
        assert!(loosely_eq(&Value::Number(1.0), &Value::Bool(true)));
        assert!(loosely_eq(&Value::Text(" 2 ".into()), &Value::Number(2.0)));
        assert!(!loosely_eq(&Value::Text("x".into()), &Value::Number(0.0)));
        assert!(!loosely_eq(&Value::Bytes(vec![55]), &Value::Number(55.0)));
        assert!(!loosely_eq(&Value::Text("7".into()), &Value::Text("7.0".into())));
    }

    #[test]
    fn empty_predicate_is_rejected() {
        let manager = manager();
        let scope = read_scope(&manager);
        let result = query(&scope, "tasks", "id", &Predicate::new(), None);
        assert!(matches!(result, Err(CoreError::InvariantViolation { .. })));
    }
}
