//! # Cabinet Engine
//!
//! Storage engine boundary for Cabinet.
//!
//! This crate defines the contract between Cabinet's record layer and the
//! transactional, indexed object-storage engine underneath it:
//! - The [`StorageEngine`] / [`EngineConnection`] / [`EngineTransaction`]
//!   traits (the engine is an external dependency; Cabinet never implements
//!   its own durability)
//! - The shared data model: [`Value`], [`Record`], [`Key`], [`KeyPath`],
//!   [`IndexDef`], [`CollectionDef`]
//! - [`MemoryEngine`], an in-memory reference engine used for testing
//!
//! Engines are **object stores with secondary indexes**. They provide
//! per-collection CRUD, exact-match index cursors, and all-or-nothing
//! transactions scoped to a pre-declared collection set. Cabinet owns all
//! query planning and schema interpretation - engines do not understand
//! predicates, soft-delete, or key/value conventions.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod defs;
mod engine;
mod error;
mod memory;
mod record;
mod value;

pub use defs::{CollectionDef, IndexDef, KeyPath, TxnMode};
pub use engine::{EngineConnection, EngineTransaction, StorageEngine};
pub use error::{EngineError, EngineResult};
pub use memory::MemoryEngine;
pub use record::{Record, ID_FIELD};
pub use value::{Key, Value};
