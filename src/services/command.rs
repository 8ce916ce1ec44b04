//! Command-side application service.
//!
//! Every command writes through the `CommandStore`, which commits the entity
//! change together with its outbox rows. Only after that commit are the
//! envelopes handed to the `OutboxRelay`. A failed publish is logged by the
//! relay and retried later; it never fails the command.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::bus::OutboxRelay;
use crate::domain::{Account, Transaction};
use crate::events::EventEnvelope;
use crate::storage::{AccountChange, CommandStore, StorageError};

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, CommandError>;

/// Errors surfaced to command callers.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Persistence error: {0}")]
    Persistence(StorageError),
}

impl From<StorageError> for CommandError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Persistence(other),
        }
    }
}

impl CommandError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Write side of the ledger.
pub struct CommandService {
    store: Arc<dyn CommandStore>,
    relay: Arc<OutboxRelay>,
}

impl CommandService {
    pub fn new(store: Arc<dyn CommandStore>, relay: Arc<OutboxRelay>) -> Self {
        Self { store, relay }
    }

    async fn emit(&self, envelopes: &[EventEnvelope]) {
        self.relay.deliver(envelopes).await;
    }

    #[tracing::instrument(name = "command.create_account", skip_all)]
    pub async fn create_account(
        &self,
        nickname: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Account> {
        let account = Account::new(nickname, email);
        let envelope = self.store.insert_account(&account).await?;
        self.emit(std::slice::from_ref(&envelope)).await;

        info!(account_id = %account.id, "Account created");
        Ok(account)
    }

    /// Authoritative lookup against the command store.
    pub async fn get_account(&self, id: Uuid) -> Result<Account> {
        Ok(self.store.get_account(id).await?)
    }

    /// Replace an account's mutable fields.
    ///
    /// `created_at` is kept from the stored row and `updated_at` never moves
    /// backwards.
    #[tracing::instrument(name = "command.update_account", skip_all, fields(account_id = %account.id))]
    pub async fn update_account(&self, account: Account) -> Result<Account> {
        self.modify(account.id, Box::new(move |current: &mut Account| *current = account))
            .await
    }

    async fn modify(&self, id: Uuid, change: AccountChange) -> Result<Account> {
        let (account, envelope) = self.store.modify_account(id, change).await?;
        self.emit(std::slice::from_ref(&envelope)).await;
        Ok(account)
    }

    #[tracing::instrument(name = "command.delete_account", skip(self))]
    pub async fn delete_account(&self, id: Uuid) -> Result<()> {
        let envelope = self.store.delete_account(id).await?;
        self.emit(std::slice::from_ref(&envelope)).await;

        info!(account_id = %id, "Account deleted");
        Ok(())
    }

    /// Add `delta` to the stored balance.
    ///
    /// Balance is an independent cache: transaction commands never change it.
    #[tracing::instrument(name = "command.adjust_balance", skip(self))]
    pub async fn adjust_balance(&self, id: Uuid, delta: Decimal) -> Result<Account> {
        self.modify(id, Box::new(move |account: &mut Account| account.adjust_balance(delta)))
            .await
    }

    /// Mark an account inactive without deleting it.
    pub async fn deactivate_account(&self, id: Uuid) -> Result<Account> {
        self.modify(id, Box::new(Account::deactivate)).await
    }

    pub async fn create_transaction(
        &self,
        account_id: Uuid,
        amount: Decimal,
        source_file_id: impl Into<String>,
        input_date: NaiveDate,
    ) -> Result<Transaction> {
        let transaction = Transaction::new(account_id, amount, source_file_id, input_date);
        let envelopes = self
            .store
            .insert_transactions(std::slice::from_ref(&transaction))
            .await?;
        self.emit(&envelopes).await;
        Ok(transaction)
    }

    /// Persist a batch atomically. Events leave only after the commit.
    #[tracing::instrument(name = "command.create_transactions_bulk", skip_all, fields(count = transactions.len()))]
    pub async fn create_transactions_bulk(&self, transactions: Vec<Transaction>) -> Result<()> {
        let envelopes = self.store.insert_transactions(&transactions).await?;
        let delivered = self.relay.deliver(&envelopes).await;

        info!(
            count = transactions.len(),
            delivered = delivered,
            "Transaction batch committed"
        );
        Ok(())
    }
}
