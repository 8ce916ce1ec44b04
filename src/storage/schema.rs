//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Accounts table schema.
#[derive(Iden)]
pub enum Accounts {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "nickname"]
    Nickname,
    #[iden = "email"]
    Email,
    #[iden = "balance"]
    Balance,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
    #[iden = "active"]
    Active,
}

/// Transactions table schema.
#[derive(Iden)]
pub enum Transactions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "account_id"]
    AccountId,
    #[iden = "amount"]
    Amount,
    #[iden = "type"]
    Type,
    #[iden = "source_file_id"]
    SourceFileId,
    #[iden = "input_date"]
    InputDate,
    #[iden = "created_at"]
    CreatedAt,
}

/// Outbox table schema.
#[derive(Iden)]
pub enum Outbox {
    Table,
    #[iden = "event_id"]
    EventId,
    #[iden = "event_name"]
    EventName,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "payload"]
    Payload,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "retry_count"]
    RetryCount,
}

/// SQL for creating the accounts table.
///
/// Amounts are stored as decimal text so no precision is lost.
pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    nickname TEXT NOT NULL,
    email TEXT NOT NULL,
    balance TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
)
"#;

/// SQL for creating the transactions table.
pub const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    amount TEXT NOT NULL,
    type TEXT NOT NULL,
    source_file_id TEXT NOT NULL,
    input_date TEXT NOT NULL,
    created_at INTEGER NOT NULL
)
"#;

pub const CREATE_TRANSACTIONS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id, input_date)";

/// SQL for creating the outbox table.
pub const CREATE_OUTBOX_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS outbox (
    event_id TEXT PRIMARY KEY,
    event_name TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    payload BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0
)
"#;

pub const CREATE_OUTBOX_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_outbox_created ON outbox(created_at)";

/// Every schema statement, in execution order.
pub const SCHEMA: &[&str] = &[
    CREATE_ACCOUNTS_TABLE,
    CREATE_TRANSACTIONS_TABLE,
    CREATE_TRANSACTIONS_INDEX,
    CREATE_OUTBOX_TABLE,
    CREATE_OUTBOX_INDEX,
];
