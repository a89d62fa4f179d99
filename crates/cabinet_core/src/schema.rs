//! Schema compilation.
//!
//! Turns the declarative `collection -> index tokens` mapping into the
//! concrete definitions consumed when the underlying database is created
//! or upgraded. Each comma-separated token is one of:
//!
//! - `field` - simple, non-unique index
//! - `!field` - simple, unique index
//! - `*field` - simple index with multi-valued entry behavior
//! - `[a+b+...]` - composite index over the `+`-separated field list; each
//!   constituent additionally gets its own implicit single-field index,
//!   honoring its own marker prefix
//!
//! The first token is the collection's primary key path; tokens after it
//! are secondary indexes.

use crate::error::{CoreError, CoreResult};
use cabinet_engine::{CollectionDef, IndexDef, KeyPath};
use std::collections::BTreeMap;

/// Marker prefix requesting a unique index.
const UNIQUE_MARKER: char = '!';
/// Marker prefix requesting multi-valued entry behavior.
const MULTI_ENTRY_MARKER: char = '*';

/// Primary key field of the synthesized key/value collection.
pub const KEY_FIELD: &str = "key";

/// Field holding the stored value in `{key, value}`-shaped records.
pub const VALUE_FIELD: &str = "value";

struct FieldToken {
    name: String,
    unique: bool,
    multi_entry: bool,
}

fn parse_field(token: &str) -> CoreResult<FieldToken> {
    let mut name = token.trim();
    let mut unique = false;
    let mut multi_entry = false;
    loop {
        if let Some(rest) = name.strip_prefix(UNIQUE_MARKER) {
            unique = true;
            name = rest;
        } else if let Some(rest) = name.strip_prefix(MULTI_ENTRY_MARKER) {
            multi_entry = true;
            name = rest;
        } else {
            break;
        }
    }
    if name.is_empty() {
        return Err(CoreError::invariant(format!(
            "empty field name in index token '{token}'"
        )));
    }
    Ok(FieldToken {
        name: name.to_string(),
        unique,
        multi_entry,
    })
}

fn add_single_field_index(def: &mut CollectionDef, field: &FieldToken) {
    // Implicit constituent indexes must not re-declare an index the schema
    // already produced under the same name.
    if def.index(&field.name).is_some() {
        return;
    }
    let mut index = IndexDef::new(field.name.clone(), KeyPath::Single(field.name.clone()));
    if field.unique {
        index = index.unique();
    }
    if field.multi_entry {
        index = index.multi_entry();
    }
    def.indexes.push(index);
}

fn compile_collection(name: &str, tokens: &str) -> CoreResult<CollectionDef> {
    if name.is_empty() {
        return Err(CoreError::invariant("schema declares an unnamed collection"));
    }
    let tokens: Vec<&str> = tokens
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    let Some((first, rest)) = tokens.split_first() else {
        return Err(CoreError::invariant(format!(
            "collection '{name}' declares no primary key"
        )));
    };
    if first.starts_with('[') {
        return Err(CoreError::invariant(format!(
            "collection '{name}' declares a composite primary key"
        )));
    }

    let primary = parse_field(first)?;
    let mut def = CollectionDef::new(name, primary.name);

    for token in rest {
        match token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            Some(inner) => {
                let fields = inner
                    .split('+')
                    .map(parse_field)
                    .collect::<CoreResult<Vec<_>>>()?;
                if fields.len() < 2 {
                    return Err(CoreError::invariant(format!(
                        "composite index '{token}' on collection '{name}' needs at least two fields"
                    )));
                }
                let field_names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
                let index_name = field_names.join("+");
                def.indexes.push(IndexDef::new(
                    index_name,
                    KeyPath::Composite(field_names),
                ));
                for field in &fields {
                    add_single_field_index(&mut def, field);
                }
            }
            None => {
                add_single_field_index(&mut def, &parse_field(token)?);
            }
        }
    }
    Ok(def)
}

/// Compiles a schema into collection definitions.
///
/// When `key_value_collection` is absent from the schema, one extra
/// collection is synthesized with a single primary key field, `key`, and
/// no secondary indexes - the substrate for both key/value storage and
/// key-only storage.
pub fn compile_schema(
    schema: &BTreeMap<String, String>,
    key_value_collection: &str,
) -> CoreResult<Vec<CollectionDef>> {
    let mut defs = Vec::with_capacity(schema.len() + 1);
    for (name, tokens) in schema {
        defs.push(compile_collection(name, tokens)?);
    }
    if !schema.contains_key(key_value_collection) {
        defs.push(CollectionDef::new(key_value_collection, KEY_FIELD));
    }
    Ok(defs)
}
