//! Error types for the engine boundary.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by a storage engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Referenced database does not exist.
    #[error("database not found: {name}")]
    DatabaseNotFound {
        /// Name of the database.
        name: String,
    },

    /// Requested version is older than the existing database version.
    #[error("requested version {requested} is older than existing version {existing}")]
    VersionMismatch {
        /// Version requested by the caller.
        requested: u32,
        /// Version currently persisted.
        existing: u32,
    },

    /// Collection was never created, or is outside a transaction's declared scope.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// Index does not exist on the collection.
    #[error("index not found: {name} on collection {collection}")]
    IndexNotFound {
        /// Collection that was searched.
        collection: String,
        /// Name of the missing index.
        name: String,
    },

    /// A write violated a unique index.
    #[error("unique constraint violated on index {index}")]
    ConstraintViolation {
        /// Name of the violated index.
        index: String,
    },

    /// A record's key field is missing or not a valid key type.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Description of the problem.
        message: String,
    },

    /// A collection or index definition is malformed.
    #[error("invalid definition: {message}")]
    InvalidDefinition {
        /// Description of the problem.
        message: String,
    },

    /// The transaction was rolled back; every operation scheduled on it failed.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the abort.
        reason: String,
    },

    /// The transaction already committed or aborted.
    #[error("transaction already finished")]
    TransactionFinished,

    /// A write was attempted through a read-only transaction.
    #[error("write attempted in a read-only transaction")]
    ReadOnly,

    /// The connection was closed.
    #[error("connection is closed")]
    ConnectionClosed,
}

impl EngineError {
    /// Creates a collection-not-found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an index-not-found error.
    pub fn index_not_found(collection: impl Into<String>, name: impl Into<String>) -> Self {
        Self::IndexNotFound {
            collection: collection.into(),
            name: name.into(),
        }
    }

    /// Creates an invalid-key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates an invalid-definition error.
    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    /// Creates a transaction-aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }
}
