//! In-process read store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::fuzzy::match_distance;
use super::{ReadStore, Result};
use crate::domain::{Account, Transaction};

/// Read store held in memory behind a tokio `RwLock`.
#[derive(Default)]
pub struct MemoryReadStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
}

impl MemoryReadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn transaction_count(&self) -> usize {
        self.transactions.read().await.len()
    }
}

#[async_trait]
impl ReadStore for MemoryReadStore {
    async fn upsert_account(&self, account: Account) -> Result<()> {
        self.accounts.write().await.insert(account.id, account);
        Ok(())
    }

    async fn remove_account(&self, id: Uuid) -> Result<bool> {
        Ok(self.accounts.write().await.remove(&id).is_some())
    }

    async fn upsert_transaction(&self, transaction: Transaction) -> Result<()> {
        self.transactions.write().await.insert(transaction.id, transaction);
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn list_accounts(&self, limit: usize, offset: usize) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> = self.accounts.read().await.values().cloned().collect();
        accounts.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(accounts.into_iter().skip(offset).take(limit).collect())
    }

    async fn search_accounts(&self, query: &str) -> Result<Vec<Account>> {
        let mut hits: Vec<(usize, Account)> = self
            .accounts
            .read()
            .await
            .values()
            .filter_map(|account| {
                match_distance(&account.nickname, query).map(|d| (d, account.clone()))
            })
            .collect();
        hits.sort_by(|(da, a), (db, b)| {
            da.cmp(db)
                .then_with(|| a.nickname.cmp(&b.nickname))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(hits.into_iter().map(|(_, account)| account).collect())
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn transactions_by_account(
        &self,
        account_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| {
            (a.input_date, a.created_at, a.id).cmp(&(b.input_date, b.created_at, b.id))
        });
        Ok(transactions.into_iter().skip(offset).take(limit).collect())
    }
}
