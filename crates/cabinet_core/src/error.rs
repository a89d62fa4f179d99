//! Error types for Cabinet core.

use cabinet_engine::EngineError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Cabinet core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Operation attempted before a successful open, or after close.
    #[error("database session is not open")]
    NotOpen,

    /// Referenced store was never registered.
    #[error("store not found: {name}")]
    StoreNotFound {
        /// Name of the store.
        name: String,
    },

    /// Referenced collection was never declared or created.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// A store was registered twice under the same name.
    #[error("store already registered: {name}")]
    DuplicateStore {
        /// Name of the store.
        name: String,
    },

    /// A predicate field has no usable index.
    #[error("no index for field '{field}' on collection {collection}")]
    IndexNotFound {
        /// Collection that was queried.
        collection: String,
        /// Predicate field with no index.
        field: String,
    },

    /// The engine rolled the transaction back; every operation scheduled
    /// on that scope failed and no partial batch was committed.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the abort.
        reason: String,
    },

    /// Caller misuse, e.g. deleting an uninitialized database.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the misuse.
        message: String,
    },

    /// Any other engine failure, passed through unreinterpreted.
    #[error(transparent)]
    Engine(EngineError),
}

impl CoreError {
    /// Creates a store-not-found error.
    pub fn store_not_found(name: impl Into<String>) -> Self {
        Self::StoreNotFound { name: name.into() }
    }

    /// Creates a collection-not-found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates a duplicate-store error.
    pub fn duplicate_store(name: impl Into<String>) -> Self {
        Self::DuplicateStore { name: name.into() }
    }

    /// Creates an index-not-found error.
    pub fn index_not_found(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self::IndexNotFound {
            collection: collection.into(),
            field: field.into(),
        }
    }

    /// Creates an invariant-violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }
}

impl From<EngineError> for CoreError {
    /// Lifts engine failures into the core taxonomy.
    ///
    /// Aborts (including the constraint violations that cause them) and
    /// index/collection misses become first-class variants; everything
    /// else passes through carrying the engine's own error.
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::TransactionAborted { reason } => CoreError::TransactionAborted { reason },
            EngineError::ConstraintViolation { .. } => CoreError::TransactionAborted {
                reason: err.to_string(),
            },
            EngineError::IndexNotFound { collection, name } => CoreError::IndexNotFound {
                collection,
                field: name,
            },
            EngineError::CollectionNotFound { name } => CoreError::CollectionNotFound { name },
            other => CoreError::Engine(other),
        }
    }
}
