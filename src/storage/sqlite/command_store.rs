//! SQLite CommandStore implementation.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_query::{Expr, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Account, Transaction, TransactionType, INPUT_DATE_FORMAT};
use crate::events::{DeletedAccount, DomainEvent, EventEnvelope};
use crate::storage::schema::{Accounts, Outbox, Transactions, SCHEMA};
use crate::storage::{apply_change, AccountChange, CommandStore, Result, StorageError};

/// SQLite implementation of CommandStore and OutboxStore.
pub struct SqliteCommandStore {
    pub(super) pool: SqlitePool,
}

impl SqliteCommandStore {
    /// Create a new SQLite command store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Command store schema initialized (SQLite)");
        Ok(())
    }

    // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
    // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
    async fn begin(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(())
    }

    /// Commit on success, roll back on failure.
    ///
    /// A failed COMMIT is rolled back too, so the connection never returns
    /// to the pool inside an open transaction.
    async fn finish<T>(conn: &mut SqliteConnection, result: Result<T>) -> Result<T> {
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                Self::rollback(conn).await;
                return Err(e);
            }
        };
        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            Self::rollback(conn).await;
            return Err(e.into());
        }
        Ok(value)
    }

    async fn rollback(conn: &mut SqliteConnection) {
        if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            // Fails harmlessly when SQLite already ended the transaction
            debug!(error = %e, "Rollback failed");
        }
    }

    async fn select_account(conn: &mut SqliteConnection, id: Uuid) -> Result<Account> {
        match sqlx::query(&account_query(id)).fetch_optional(&mut *conn).await? {
            Some(row) => account_from_row(&row),
            None => Err(StorageError::NotFound {
                entity: "account",
                id,
            }),
        }
    }

    async fn account_exists(conn: &mut SqliteConnection, id: Uuid) -> Result<bool> {
        let query = Query::select()
            .column(Accounts::Id)
            .from(Accounts::Table)
            .and_where(Expr::col(Accounts::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        Ok(sqlx::query(&query).fetch_optional(&mut *conn).await?.is_some())
    }

    async fn append_outbox(conn: &mut SqliteConnection, envelope: &EventEnvelope) -> Result<()> {
        let query = Query::insert()
            .into_table(Outbox::Table)
            .columns([
                Outbox::EventId,
                Outbox::EventName,
                Outbox::AggregateId,
                Outbox::Payload,
                Outbox::CreatedAt,
            ])
            .values_panic([
                envelope.event_id.to_string().into(),
                envelope.name().into(),
                envelope.aggregate_id.to_string().into(),
                envelope.to_json()?.into(),
                envelope.occurred_at.timestamp().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    async fn write_account(conn: &mut SqliteConnection, account: &Account) -> Result<EventEnvelope> {
        let query = Query::insert()
            .into_table(Accounts::Table)
            .columns([
                Accounts::Id,
                Accounts::Nickname,
                Accounts::Email,
                Accounts::Balance,
                Accounts::CreatedAt,
                Accounts::UpdatedAt,
                Accounts::Active,
            ])
            .values_panic([
                account.id.to_string().into(),
                account.nickname.clone().into(),
                account.email.clone().into(),
                account.balance.to_string().into(),
                account.created_at.into(),
                account.updated_at.into(),
                i32::from(account.active).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;

        let envelope = EventEnvelope::new(DomainEvent::AccountCreated(account.clone()));
        Self::append_outbox(conn, &envelope).await?;
        Ok(envelope)
    }

    async fn rewrite_account(
        conn: &mut SqliteConnection,
        id: Uuid,
        change: AccountChange,
    ) -> Result<(Account, EventEnvelope)> {
        let stored = Self::select_account(conn, id).await?;
        let account = apply_change(&stored, change);

        let query = Query::update()
            .table(Accounts::Table)
            .values([
                (Accounts::Nickname, account.nickname.clone().into()),
                (Accounts::Email, account.email.clone().into()),
                (Accounts::Balance, account.balance.to_string().into()),
                (
                    Accounts::UpdatedAt,
                    Expr::cust_with_values("MAX(\"updated_at\", ?)", [account.updated_at]),
                ),
                (Accounts::Active, i32::from(account.active).into()),
            ])
            .and_where(Expr::col(Accounts::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;

        let envelope = EventEnvelope::new(DomainEvent::AccountUpdated(account.clone()));
        Self::append_outbox(conn, &envelope).await?;
        Ok((account, envelope))
    }

    async fn remove_account(conn: &mut SqliteConnection, id: Uuid) -> Result<EventEnvelope> {
        let query = Query::delete()
            .from_table(Accounts::Table)
            .and_where(Expr::col(Accounts::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "account",
                id,
            });
        }

        let envelope = EventEnvelope::new(DomainEvent::AccountDeleted(DeletedAccount { id }));
        Self::append_outbox(conn, &envelope).await?;
        Ok(envelope)
    }

    async fn write_transactions(
        conn: &mut SqliteConnection,
        transactions: &[Transaction],
    ) -> Result<Vec<EventEnvelope>> {
        let mut known_accounts = HashSet::new();
        let mut envelopes = Vec::with_capacity(transactions.len());

        for transaction in transactions {
            if !known_accounts.contains(&transaction.account_id) {
                if !Self::account_exists(conn, transaction.account_id).await? {
                    return Err(StorageError::NotFound {
                        entity: "account",
                        id: transaction.account_id,
                    });
                }
                known_accounts.insert(transaction.account_id);
            }

            let query = Query::insert()
                .into_table(Transactions::Table)
                .columns([
                    Transactions::Id,
                    Transactions::AccountId,
                    Transactions::Amount,
                    Transactions::Type,
                    Transactions::SourceFileId,
                    Transactions::InputDate,
                    Transactions::CreatedAt,
                ])
                .values_panic([
                    transaction.id.to_string().into(),
                    transaction.account_id.to_string().into(),
                    transaction.amount.to_string().into(),
                    transaction.kind.as_str().into(),
                    transaction.source_file_id.clone().into(),
                    transaction.input_date.format(INPUT_DATE_FORMAT).to_string().into(),
                    transaction.created_at.into(),
                ])
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query).execute(&mut *conn).await?;

            let envelope = EventEnvelope::new(DomainEvent::TransactionCreated(transaction.clone()));
            Self::append_outbox(conn, &envelope).await?;
            envelopes.push(envelope);
        }

        Ok(envelopes)
    }

    /// Transactions recorded for an account, ordered by input date.
    pub async fn transactions_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        let query = Query::select()
            .columns(TRANSACTION_COLUMNS)
            .from(Transactions::Table)
            .and_where(Expr::col(Transactions::AccountId).eq(account_id.to_string()))
            .order_by(Transactions::InputDate, sea_query::Order::Asc)
            .order_by(Transactions::CreatedAt, sea_query::Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(transaction_from_row).collect()
    }
}

const ACCOUNT_COLUMNS: [Accounts; 7] = [
    Accounts::Id,
    Accounts::Nickname,
    Accounts::Email,
    Accounts::Balance,
    Accounts::CreatedAt,
    Accounts::UpdatedAt,
    Accounts::Active,
];

const TRANSACTION_COLUMNS: [Transactions; 7] = [
    Transactions::Id,
    Transactions::AccountId,
    Transactions::Amount,
    Transactions::Type,
    Transactions::SourceFileId,
    Transactions::InputDate,
    Transactions::CreatedAt,
];

fn account_query(id: Uuid) -> String {
    Query::select()
        .columns(ACCOUNT_COLUMNS)
        .from(Accounts::Table)
        .and_where(Expr::col(Accounts::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder)
}

fn account_from_row(row: &SqliteRow) -> Result<Account> {
    let id: String = row.try_get("id")?;
    let balance: String = row.try_get("balance")?;
    let active: i32 = row.try_get("active")?;

    Ok(Account {
        id: Uuid::parse_str(&id)?,
        nickname: row.try_get("nickname")?,
        email: row.try_get("email")?,
        balance: Decimal::from_str(&balance)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        active: active != 0,
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction> {
    let id: String = row.try_get("id")?;
    let account_id: String = row.try_get("account_id")?;
    let amount: String = row.try_get("amount")?;
    let kind: String = row.try_get("type")?;
    let input_date: String = row.try_get("input_date")?;
    let amount = Decimal::from_str(&amount)?;

    Ok(Transaction {
        id: Uuid::parse_str(&id)?,
        account_id: Uuid::parse_str(&account_id)?,
        amount,
        kind: TransactionType::parse(&kind).unwrap_or_else(|| TransactionType::from_amount(amount)),
        source_file_id: row.try_get("source_file_id")?,
        input_date: NaiveDate::parse_from_str(&input_date, INPUT_DATE_FORMAT)?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl CommandStore for SqliteCommandStore {
    #[tracing::instrument(name = "store.insert_account", skip_all, fields(id = %account.id))]
    async fn insert_account(&self, account: &Account) -> Result<EventEnvelope> {
        let mut conn = self.pool.acquire().await?;
        Self::begin(&mut conn).await?;
        let result = Self::write_account(&mut conn, account).await;
        Self::finish(&mut conn, result).await
    }

    #[tracing::instrument(name = "store.modify_account", skip(self, change))]
    async fn modify_account(
        &self,
        id: Uuid,
        change: AccountChange,
    ) -> Result<(Account, EventEnvelope)> {
        let mut conn = self.pool.acquire().await?;
        Self::begin(&mut conn).await?;
        let result = Self::rewrite_account(&mut conn, id, change).await;
        Self::finish(&mut conn, result).await
    }

    #[tracing::instrument(name = "store.delete_account", skip(self))]
    async fn delete_account(&self, id: Uuid) -> Result<EventEnvelope> {
        let mut conn = self.pool.acquire().await?;
        Self::begin(&mut conn).await?;
        let result = Self::remove_account(&mut conn, id).await;
        Self::finish(&mut conn, result).await
    }

    async fn get_account(&self, id: Uuid) -> Result<Account> {
        let mut conn = self.pool.acquire().await?;
        Self::select_account(&mut conn, id).await
    }

    #[tracing::instrument(name = "store.insert_transactions", skip_all, fields(count = transactions.len()))]
    async fn insert_transactions(
        &self,
        transactions: &[Transaction],
    ) -> Result<Vec<EventEnvelope>> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire().await?;
        Self::begin(&mut conn).await?;
        let result = Self::write_transactions(&mut conn, transactions).await;
        let envelopes = Self::finish(&mut conn, result).await?;

        debug!(count = envelopes.len(), "Transactions committed with outbox rows");
        Ok(envelopes)
    }

    async fn accounts_page(&self, limit: u32, offset: u64) -> Result<Vec<Account>> {
        let query = Query::select()
            .columns(ACCOUNT_COLUMNS)
            .from(Accounts::Table)
            .order_by(Accounts::Id, sea_query::Order::Asc)
            .limit(u64::from(limit))
            .offset(offset)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn transactions_page(&self, limit: u32, offset: u64) -> Result<Vec<Transaction>> {
        let query = Query::select()
            .columns(TRANSACTION_COLUMNS)
            .from(Transactions::Table)
            .order_by(Transactions::Id, sea_query::Order::Asc)
            .limit(u64::from(limit))
            .offset(offset)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(transaction_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sqlite_pool;

    #[tokio::test]
    async fn test_failed_commit_is_rolled_back() {
        let pool = sqlite_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        for statement in [
            "PRAGMA foreign_keys = ON",
            "CREATE TABLE parent (id INTEGER PRIMARY KEY)",
            "CREATE TABLE child (parent_id INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED)",
        ] {
            sqlx::query(statement).execute(&mut *conn).await.unwrap();
        }

        // The deferred key is only checked at COMMIT, which then fails
        SqliteCommandStore::begin(&mut conn).await.unwrap();
        sqlx::query("INSERT INTO child (parent_id) VALUES (42)")
            .execute(&mut *conn)
            .await
            .unwrap();
        let err = SqliteCommandStore::finish(&mut conn, Ok(())).await.unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));

        // No transaction is left open on the connection
        SqliteCommandStore::begin(&mut conn).await.unwrap();
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM child")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(rows, 0);
        SqliteCommandStore::finish(&mut conn, Ok(())).await.unwrap();
    }
}
