//! Entity model: accounts, transactions and derived summaries.

mod account;
mod summary;
mod transaction;

pub use account::Account;
pub use summary::{MonthlyBucket, TransactionSummary};
pub use transaction::{Transaction, TransactionType, INPUT_DATE_FORMAT};

/// Current time as whole seconds since the Unix epoch (UTC).
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
