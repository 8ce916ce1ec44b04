//! Query-side projection.
//!
//! `ReadModelProjector` consumes domain events from the bus and keeps a
//! `ReadStore` in sync with the command store. The read side is eventually
//! consistent: it lags the command side by the bus delivery delay and may
//! diverge when a non-durable bus drops messages.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::bus::{self, BusError, EventBus, EventHandler, Subscription};
use crate::domain::{Account, Transaction};
use crate::events::{DomainEvent, EventDecodeError, EventEnvelope, SCHEMA_VERSION};
use crate::storage::{CommandStore, OutboxStore, StorageError};

pub mod fuzzy;
mod memory;

pub use memory::MemoryReadStore;

/// Event ids remembered for deduplication.
pub const DEFAULT_DEDUP_WINDOW: usize = 65_536;

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Errors applying an event to the read model.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Decode error: {0}")]
    Decode(#[from] EventDecodeError),

    #[error("Unsupported schema version {0}")]
    UnsupportedSchema(u32),

    #[error("Read store error: {0}")]
    Store(String),

    #[error("Rebuild source error: {0}")]
    Source(#[from] StorageError),
}

/// Searchable, eventually consistent view of accounts and transactions.
#[async_trait]
pub trait ReadStore: Send + Sync {
    /// Insert or replace an account by id.
    async fn upsert_account(&self, account: Account) -> Result<()>;

    /// Remove an account. Returns whether it was present.
    async fn remove_account(&self, id: Uuid) -> Result<bool>;

    /// Insert or replace a transaction by id.
    async fn upsert_transaction(&self, transaction: Transaction) -> Result<()>;

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>>;

    /// Page of accounts ordered by creation time, then id.
    async fn list_accounts(&self, limit: usize, offset: usize) -> Result<Vec<Account>>;

    /// Accounts whose nickname fuzzily matches `query`, best match first.
    async fn search_accounts(&self, query: &str) -> Result<Vec<Account>>;

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>>;

    /// Page of an account's transactions ordered by input date, creation
    /// time, then id.
    async fn transactions_by_account(
        &self,
        account_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;
}

/// Outcome of applying one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    /// Already applied under the same event id.
    Duplicate,
    /// Event for a deleted account, or not a read-model event.
    Ignored,
}

/// Rows copied by [`ReadModelProjector::rebuild`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rebuilt {
    pub accounts: usize,
    pub transactions: usize,
    /// Outbox rows whose effect the snapshot already holds.
    pub pending: usize,
}

/// Bounded set of recent ids. The oldest id is forgotten first.
struct SeenWindow {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl SeenWindow {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    fn record(&mut self, id: Uuid) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }
}

/// Event handler that projects domain events into a `ReadStore`.
///
/// Account events are upserted by id whatever the prior state, so an update
/// arriving before its create still lands. Deleted ids are tombstoned and
/// later creates or updates for them are ignored. Tombstones share the dedup
/// window's bound: only the most recent deletes are remembered.
#[derive(Clone)]
pub struct ReadModelProjector {
    store: Arc<dyn ReadStore>,
    seen: Arc<Mutex<SeenWindow>>,
    // Held across the store write so a delete cannot interleave with an upsert
    tombstones: Arc<tokio::sync::Mutex<SeenWindow>>,
}

impl ReadModelProjector {
    pub fn new(store: Arc<dyn ReadStore>) -> Self {
        Self::with_dedup_window(store, DEFAULT_DEDUP_WINDOW)
    }

    pub fn with_dedup_window(store: Arc<dyn ReadStore>, window: usize) -> Self {
        Self {
            store,
            seen: Arc::new(Mutex::new(SeenWindow::new(window))),
            tombstones: Arc::new(tokio::sync::Mutex::new(SeenWindow::new(window))),
        }
    }

    pub fn store(&self) -> &Arc<dyn ReadStore> {
        &self.store
    }

    fn already_applied(&self, event_id: &Uuid) -> bool {
        self.seen
            .lock()
            .map(|seen| seen.contains(event_id))
            .unwrap_or(false)
    }

    fn mark_applied(&self, event_id: Uuid) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.record(event_id);
        }
    }

    /// Apply one envelope to the read store.
    pub async fn apply(&self, envelope: &EventEnvelope) -> Result<Applied> {
        if envelope.schema_version != SCHEMA_VERSION {
            return Err(ProjectionError::UnsupportedSchema(envelope.schema_version));
        }
        if self.already_applied(&envelope.event_id) {
            debug!(event_id = %envelope.event_id, "Duplicate event skipped");
            return Ok(Applied::Duplicate);
        }

        let outcome = match &envelope.event {
            DomainEvent::AccountCreated(account) | DomainEvent::AccountUpdated(account) => {
                let tombstones = self.tombstones.lock().await;
                if tombstones.contains(&account.id) {
                    debug!(account_id = %account.id, "Event for deleted account ignored");
                    Applied::Ignored
                } else {
                    self.store.upsert_account(account.clone()).await?;
                    Applied::Updated
                }
            }
            DomainEvent::AccountDeleted(deleted) => {
                let mut tombstones = self.tombstones.lock().await;
                tombstones.record(deleted.id);
                if !self.store.remove_account(deleted.id).await? {
                    debug!(account_id = %deleted.id, "Delete for account not in read model");
                }
                Applied::Updated
            }
            DomainEvent::TransactionCreated(transaction) => {
                self.store.upsert_transaction(transaction.clone()).await?;
                Applied::Updated
            }
            DomainEvent::FileUploaded(_) => Applied::Ignored,
        };

        self.mark_applied(envelope.event_id);
        Ok(outcome)
    }

    /// Load the committed state of `source` into the read store.
    ///
    /// Run before subscribing and before any command can write. Events
    /// still waiting in the outbox are already part of the snapshot, so
    /// their ids are recorded as applied and a later redelivery is skipped.
    #[tracing::instrument(name = "projector.rebuild", skip_all)]
    pub async fn rebuild(
        &self,
        source: &dyn CommandStore,
        outbox: &dyn OutboxStore,
        page_size: u32,
    ) -> Result<Rebuilt> {
        let page_size = page_size.max(1);
        let mut rebuilt = Rebuilt::default();

        for row in outbox.pending(u32::MAX, u32::MAX, 0).await? {
            self.mark_applied(row.event_id);
            rebuilt.pending += 1;
        }

        let mut offset = 0u64;
        loop {
            let accounts = source.accounts_page(page_size, offset).await?;
            let fetched = accounts.len();
            for account in accounts {
                self.store.upsert_account(account).await?;
            }
            rebuilt.accounts += fetched;
            offset += fetched as u64;
            if fetched < page_size as usize {
                break;
            }
        }

        let mut offset = 0u64;
        loop {
            let transactions = source.transactions_page(page_size, offset).await?;
            let fetched = transactions.len();
            for transaction in transactions {
                self.store.upsert_transaction(transaction).await?;
            }
            rebuilt.transactions += fetched;
            offset += fetched as u64;
            if fetched < page_size as usize {
                break;
            }
        }

        info!(
            accounts = rebuilt.accounts,
            transactions = rebuilt.transactions,
            pending = rebuilt.pending,
            "Read model rebuilt from command store"
        );
        Ok(rebuilt)
    }

    /// Decode and apply an envelope in its JSON wire form.
    pub async fn apply_json(&self, bytes: &[u8]) -> Result<Applied> {
        let envelope = EventEnvelope::from_json(bytes)?;
        self.apply(&envelope).await
    }

    /// Subscribe to every event the read model consumes.
    pub async fn subscribe_all(&self, bus: &dyn EventBus) -> bus::Result<Vec<Subscription>> {
        let accounts = bus.subscribe("account", Box::new(self.clone())).await?;
        let transactions = bus
            .subscribe(crate::events::TRANSACTION_CREATED, Box::new(self.clone()))
            .await?;
        Ok(vec![accounts, transactions])
    }
}

impl EventHandler for ReadModelProjector {
    fn handle(&self, envelope: Arc<EventEnvelope>) -> BoxFuture<'static, std::result::Result<(), BusError>> {
        let projector = self.clone();
        let span = tracing::debug_span!("projector.handle", event = envelope.name(), event_id = %envelope.event_id);

        Box::pin(
            async move {
                // Dispatch logs the failure; the event is not retried
                projector
                    .apply(&envelope)
                    .await
                    .map(|_| ())
                    .map_err(|e| BusError::HandlerFailed {
                        name: "read-model".to_string(),
                        message: e.to_string(),
                    })
            }
            .instrument(span),
        )
    }
}
