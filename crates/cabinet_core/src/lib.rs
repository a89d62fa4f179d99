//! # Cabinet Core
//!
//! A table/record convenience layer over a transactional, asynchronous-in-
//! spirit, indexed object-storage engine.
//!
//! Cabinet gives callers a collection/record mental model - named record
//! collections, equality queries over indexed fields, batch CRUD, and
//! soft-delete - while delegating all storage, indexing, and transaction
//! mechanics to an engine behind the [`cabinet_engine`] boundary.
//!
//! The interesting parts:
//! - **Schema compilation**: a `name -> "id, userId, [!code+userId]"`
//!   mapping becomes concrete collection and index definitions.
//! - **Predicate queries**: an equality predicate over 1..N fields is
//!   answered by picking the best available index (composite when one
//!   covers the whole predicate, single-field otherwise) plus in-memory
//!   residual filtering.
//! - **Transaction scopes**: every store operation runs inside an explicit
//!   [`TransactionScope`] declared over a fixed collection set, committed
//!   on success and aborted on every other exit path.
//!
//! ```rust
//! use cabinet_core::{MemoryEngine, Predicate, Record, Session, SessionConfig, StoreOptions};
//!
//! let session = Session::new(MemoryEngine::new());
//! let config = SessionConfig::new("app", 1)
//!     .collection("tasks", "id, userId, [!code+userId]");
//! session.open(config).unwrap();
//!
//! let tasks = session.add_store("tasks", &[], StoreOptions::default()).unwrap();
//! tasks.add(Record::new().with("id", "t1").with("userId", "u1").with("code", "A")).unwrap();
//!
//! let hits = tasks
//!     .query(&Predicate::new().field("code", "A").field("userId", "u1"), None)
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod id;
mod query;
mod schema;
mod scope;
mod session;
mod store;

pub use cabinet_engine::{
    CollectionDef, EngineError, IndexDef, Key, KeyPath, MemoryEngine, Record, StorageEngine,
    TxnMode, Value, ID_FIELD,
};
pub use config::{SessionConfig, DEFAULT_KEY_VALUE_COLLECTION};
pub use error::{CoreError, CoreResult};
pub use id::generate_id;
pub use query::{loosely_eq, Matcher, Predicate, Resolution};
pub use schema::{compile_schema, KEY_FIELD, VALUE_FIELD};
pub use scope::{ScopeManager, TransactionScope};
pub use session::{Session, SessionState};
pub use store::{RecordStore, StoreOptions, DEFAULT_DELETED_FIELD};
