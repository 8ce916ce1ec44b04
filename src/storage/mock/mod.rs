//! Mock storage implementations for testing.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{apply_change, AccountChange, CommandStore, OutboxRecord, OutboxStore, Result, StorageError};
use crate::domain::{now_epoch, Account, Transaction};
use crate::events::{DeletedAccount, DomainEvent, EventEnvelope};

/// Mock command store that keeps entities and outbox rows in memory.
///
/// Writes are all-or-nothing like the relational implementation: a failing
/// bulk insert leaves no rows and no outbox entries behind.
#[derive(Default)]
pub struct MockCommandStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
    transactions: RwLock<BTreeMap<Uuid, Transaction>>,
    outbox: RwLock<Vec<OutboxRecord>>,
    fail_on_write: RwLock<bool>,
    fail_on_read: RwLock<bool>,
}

impl MockCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    pub async fn transaction_count(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn transactions_for_account(&self, account_id: Uuid) -> Vec<Transaction> {
        self.transactions
            .read()
            .await
            .values()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect()
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Unavailable("Mock write failure".to_string()));
        }
        Ok(())
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Unavailable("Mock read failure".to_string()));
        }
        Ok(())
    }

    async fn append_outbox(&self, envelopes: &[EventEnvelope]) -> Result<()> {
        let mut records = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            records.push(OutboxRecord {
                event_id: envelope.event_id,
                payload: envelope.to_json()?,
                retry_count: 0,
                created_at: envelope.occurred_at.timestamp(),
            });
        }
        self.outbox.write().await.extend(records);
        Ok(())
    }
}

#[async_trait]
impl CommandStore for MockCommandStore {
    async fn insert_account(&self, account: &Account) -> Result<EventEnvelope> {
        self.check_write().await?;
        let envelope = EventEnvelope::new(DomainEvent::AccountCreated(account.clone()));
        self.append_outbox(std::slice::from_ref(&envelope)).await?;
        self.accounts.write().await.insert(account.id, account.clone());
        Ok(envelope)
    }

    async fn modify_account(
        &self,
        id: Uuid,
        change: AccountChange,
    ) -> Result<(Account, EventEnvelope)> {
        self.check_write().await?;
        let mut accounts = self.accounts.write().await;
        let Some(stored) = accounts.get_mut(&id) else {
            return Err(StorageError::NotFound {
                entity: "account",
                id,
            });
        };
        let next = apply_change(stored, change);
        let envelope = EventEnvelope::new(DomainEvent::AccountUpdated(next.clone()));
        self.append_outbox(std::slice::from_ref(&envelope)).await?;
        *stored = next.clone();
        Ok((next, envelope))
    }

    async fn delete_account(&self, id: Uuid) -> Result<EventEnvelope> {
        self.check_write().await?;
        let mut accounts = self.accounts.write().await;
        if !accounts.contains_key(&id) {
            return Err(StorageError::NotFound {
                entity: "account",
                id,
            });
        }
        let envelope = EventEnvelope::new(DomainEvent::AccountDeleted(DeletedAccount { id }));
        self.append_outbox(std::slice::from_ref(&envelope)).await?;
        accounts.remove(&id);
        Ok(envelope)
    }

    async fn get_account(&self, id: Uuid) -> Result<Account> {
        self.check_read().await?;
        self.accounts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound {
                entity: "account",
                id,
            })
    }

    async fn insert_transactions(
        &self,
        transactions: &[Transaction],
    ) -> Result<Vec<EventEnvelope>> {
        self.check_write().await?;
        {
            let accounts = self.accounts.read().await;
            if let Some(orphan) = transactions
                .iter()
                .find(|t| !accounts.contains_key(&t.account_id))
            {
                return Err(StorageError::NotFound {
                    entity: "account",
                    id: orphan.account_id,
                });
            }
        }

        let envelopes: Vec<EventEnvelope> = transactions
            .iter()
            .map(|t| EventEnvelope::new(DomainEvent::TransactionCreated(t.clone())))
            .collect();
        self.append_outbox(&envelopes).await?;

        let mut stored = self.transactions.write().await;
        for transaction in transactions {
            stored.insert(transaction.id, transaction.clone());
        }
        Ok(envelopes)
    }

    async fn accounts_page(&self, limit: u32, offset: u64) -> Result<Vec<Account>> {
        self.check_read().await?;
        let mut accounts: Vec<Account> = self.accounts.read().await.values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn transactions_page(&self, limit: u32, offset: u64) -> Result<Vec<Transaction>> {
        self.check_read().await?;
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutboxStore for MockCommandStore {
    async fn pending(
        &self,
        limit: u32,
        max_retries: u32,
        min_age_secs: u64,
    ) -> Result<Vec<OutboxRecord>> {
        let cutoff = now_epoch() - min_age_secs as i64;
        let mut pending: Vec<OutboxRecord> = self
            .outbox
            .read()
            .await
            .iter()
            .filter(|r| r.created_at <= cutoff && r.retry_count < max_retries)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn mark_delivered(&self, event_id: Uuid) -> Result<()> {
        self.discard(event_id).await
    }

    async fn mark_failed(&self, event_id: Uuid) -> Result<()> {
        if let Some(record) = self
            .outbox
            .write()
            .await
            .iter_mut()
            .find(|r| r.event_id == event_id)
        {
            record.retry_count += 1;
        }
        Ok(())
    }

    async fn discard(&self, event_id: Uuid) -> Result<()> {
        self.outbox.write().await.retain(|r| r.event_id != event_id);
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        Ok(self.outbox.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests;
