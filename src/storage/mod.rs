//! Command-side storage.
//!
//! The command store is the authoritative record of accounts and
//! transactions. Every write also appends the resulting event envelopes to an
//! outbox inside the same relational transaction, so an entity change and its
//! event are committed together or not at all.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{now_epoch, Account, Transaction};
use crate::events::EventEnvelope;

pub mod mock;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use mock::MockCommandStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{init_storage, SqliteCommandStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid decimal: {0}")]
    InvalidDecimal(#[from] rust_decimal::Error),

    #[error("Invalid date: {0}")]
    InvalidDate(#[from] chrono::ParseError),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// An outbox row awaiting delivery.
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub event_id: Uuid,
    /// JSON-encoded [`EventEnvelope`].
    pub payload: Vec<u8>,
    pub retry_count: u32,
    pub created_at: i64,
}

/// Edit applied to the stored copy of an account.
pub type AccountChange = Box<dyn FnOnce(&mut Account) + Send>;

/// Apply `change` to a copy of `stored`.
///
/// The id and `created_at` always come from `stored`, and `updated_at`
/// ends at or after both the stored value and the current time.
pub fn apply_change(stored: &Account, change: AccountChange) -> Account {
    let mut next = stored.clone();
    change(&mut next);
    next.id = stored.id;
    next.created_at = stored.created_at;
    next.updated_at = next.updated_at.max(stored.updated_at);
    next.touch(now_epoch());
    next
}

/// Authoritative store for accounts and transactions.
///
/// Each write returns the envelopes it appended to the outbox. They are
/// committed but not yet delivered.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Insert a new account and its `account.created` event.
    async fn insert_account(&self, account: &Account) -> Result<EventEnvelope>;

    /// Read, change and rewrite an account in one write transaction, then
    /// append `account.updated`.
    ///
    /// Concurrent modifications of the same account are serialized, so none
    /// is lost. Returns `NotFound` when no row has the id.
    async fn modify_account(&self, id: Uuid, change: AccountChange)
        -> Result<(Account, EventEnvelope)>;

    /// Remove an account and append `account.deleted`.
    async fn delete_account(&self, id: Uuid) -> Result<EventEnvelope>;

    /// Authoritative lookup by id.
    async fn get_account(&self, id: Uuid) -> Result<Account>;

    /// Insert every transaction and one `transaction.created` event per row,
    /// all in a single relational transaction.
    ///
    /// Fails with `NotFound` if any row references an unknown account, in
    /// which case nothing is written.
    async fn insert_transactions(&self, transactions: &[Transaction])
        -> Result<Vec<EventEnvelope>>;

    /// Page of accounts ordered by id.
    async fn accounts_page(&self, limit: u32, offset: u64) -> Result<Vec<Account>>;

    /// Page of transactions ordered by id.
    async fn transactions_page(&self, limit: u32, offset: u64) -> Result<Vec<Transaction>>;
}

/// Delivery bookkeeping for outbox rows.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Rows older than `min_age_secs` that have been retried fewer than
    /// `max_retries` times, oldest first.
    async fn pending(&self, limit: u32, max_retries: u32, min_age_secs: u64)
        -> Result<Vec<OutboxRecord>>;

    /// Remove a delivered row.
    async fn mark_delivered(&self, event_id: Uuid) -> Result<()>;

    /// Record a failed delivery attempt.
    async fn mark_failed(&self, event_id: Uuid) -> Result<()>;

    /// Remove a row that can never be delivered.
    async fn discard(&self, event_id: Uuid) -> Result<()>;

    /// Number of rows still in the outbox.
    async fn pending_count(&self) -> Result<u64>;
}
