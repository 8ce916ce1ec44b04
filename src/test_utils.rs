//! Test utilities and mock implementations.
//!
//! Helpers shared by unit tests and, through the `test-utils` feature, by
//! the integration tests under `tests/`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::bus::{BusError, EventHandler};
use crate::domain::{Account, Transaction};
use crate::events::{DomainEvent, EventEnvelope};
use crate::notify::{Mailer, MailerError, Notification};

/// Handler that counts deliveries.
#[derive(Default)]
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter, readable after the handler is boxed away.
    pub fn count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.count)
    }
}

impl EventHandler for CountingHandler {
    fn handle(&self, _envelope: Arc<EventEnvelope>) -> BoxFuture<'static, Result<(), BusError>> {
        let count = Arc::clone(&self.count);
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// `account.created` envelope for a fresh account.
pub fn make_account_envelope(nickname: &str) -> EventEnvelope {
    let email = format!("{}@example.com", nickname.to_lowercase());
    EventEnvelope::new(DomainEvent::AccountCreated(Account::new(nickname, email)))
}

/// `transaction.created` envelope for a random account.
pub fn make_transaction_envelope() -> EventEnvelope {
    let date = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap_or_default();
    EventEnvelope::new(DomainEvent::TransactionCreated(Transaction::new(
        Uuid::new_v4(),
        Decimal::new(10050, 2),
        "test",
        date,
    )))
}

/// Four rows: three valid, the third malformed.
pub fn sample_csv() -> &'static str {
    "2023-01-15,100.50\n2023-01-20,-30.00\nbad-date,10\n2023-02-01,5\n"
}

/// Mailer that records notifications in memory.
#[derive(Default)]
pub struct MockMailer {
    sent: RwLock<Vec<Notification>>,
    attempts: AtomicUsize,
    fail: RwLock<bool>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    pub async fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, notification: &Notification) -> Result<(), MailerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if *self.fail.read().await {
            return Err(MailerError::Unavailable("Mock mailer failure".to_string()));
        }
        self.sent.write().await.push(notification.clone());
        Ok(())
    }
}

/// Single-connection in-memory SQLite pool.
///
/// Every connection to `:memory:` is a separate database, so the pool is
/// pinned to one connection that never expires.
#[cfg(feature = "sqlite")]
pub async fn sqlite_pool() -> Result<sqlx::SqlitePool, sqlx::Error> {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
}
