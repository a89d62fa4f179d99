//! Session configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default name of the reserved key/value collection.
///
/// Synthesized by the schema compiler when the schema does not declare it.
pub const DEFAULT_KEY_VALUE_COLLECTION: &str = "key_value";

/// Configuration for opening a database session.
///
/// # Example
///
/// ```rust
/// use cabinet_core::SessionConfig;
///
/// let config = SessionConfig::new("app", 2)
///     .collection("tasks", "id, userId, [!code+userId]")
///     .collection("notes", "id, ownerId")
///     .key_value_collection("settings");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Database name.
    pub name: String,
    /// Database version; must be a positive integer. Opening with a newer
    /// version than what exists triggers a creation/upgrade cycle.
    pub version: u32,
    /// Collection name to comma-separated index tokens.
    pub schema: BTreeMap<String, String>,
    /// Name of the reserved key/value collection.
    pub key_value_collection: String,
}

impl SessionConfig {
    /// Creates a configuration with an empty schema.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            schema: BTreeMap::new(),
            key_value_collection: DEFAULT_KEY_VALUE_COLLECTION.to_string(),
        }
    }

    /// Declares a collection and its index tokens.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>, tokens: impl Into<String>) -> Self {
        self.schema.insert(name.into(), tokens.into());
        self
    }

    /// Overrides the reserved key/value collection name.
    #[must_use]
    pub fn key_value_collection(mut self, name: impl Into<String>) -> Self {
        self.key_value_collection = name.into();
        self
    }
}
