//! SQLite implementations of the command store and outbox.

mod command_store;
mod outbox_store;

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::StorageConfig;

pub use command_store::SqliteCommandStore;

/// Path value selecting a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Open the configured database and create the schema.
pub async fn init_storage(
    config: &StorageConfig,
) -> Result<Arc<SqliteCommandStore>, Box<dyn std::error::Error>> {
    info!("Storage: sqlite at {}", config.path);

    let pool = connect(config).await?;
    let store = Arc::new(SqliteCommandStore::new(pool));
    store.init().await?;

    Ok(store)
}

async fn connect(config: &StorageConfig) -> Result<SqlitePool, Box<dyn std::error::Error>> {
    if config.path == IN_MEMORY {
        // Each connection would otherwise see its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        return Ok(pool);
    }

    if let Some(parent) = std::path::Path::new(&config.path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect(&format!("sqlite:{}?mode=rwc", config.path))
        .await?;
    Ok(pool)
}
