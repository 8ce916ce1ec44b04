//! statera-worker: ledger process
//!
//! Hosts the command store, the in-process bus, the read projection and the
//! upload worker until interrupted.
//!
//! ## Configuration
//! - First argument: optional YAML config file
//! - STATERA_CONFIG: config file path
//! - STATERA__SECTION__KEY: per-key overrides (e.g. STATERA__STORAGE__PATH)
//! - STATERA_LOG: tracing filter (default: info)

use tracing::info;

use statera::config::Config;
use statera::runtime::Runtime;
use statera::storage::OutboxStore;
use statera::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref())?;
    let runtime = Runtime::build(&config).await?;

    info!(
        storage = %config.storage.path,
        pending_outbox = runtime.store().pending_count().await?,
        "statera-worker started"
    );

    tokio::signal::ctrl_c().await?;

    info!(
        accounts = runtime.read().account_count().await,
        transactions = runtime.read().transaction_count().await,
        "Shutting down"
    );
    runtime.shutdown();

    Ok(())
}
