//! Storage configuration types.

use serde::Deserialize;

/// Default on-disk database location.
pub const DEFAULT_STORAGE_PATH: &str = "data/statera.db";

/// Command store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file, or `:memory:` for a private in-memory database.
    pub path: String,
    /// Connection pool size. In-memory databases always use one connection.
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_STORAGE_PATH.to_string(),
            max_connections: 5,
        }
    }
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self {
            path: ":memory:".to_string(),
            max_connections: 1,
        }
    }
}
