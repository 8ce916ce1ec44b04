use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use super::Transaction;

/// Per-account aggregate derived from the stored transaction set.
///
/// Never persisted; recomputed on request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionSummary {
    pub total_count: u64,
    pub total_balance: Decimal,
    pub credit_count: u64,
    pub total_credit: Decimal,
    pub average_credit: Decimal,
    pub debit_count: u64,
    pub total_debit: Decimal,
    pub average_debit: Decimal,
    /// Keyed by `YYYY-MM`.
    pub monthly: BTreeMap<String, MonthlyBucket>,
}

/// Transactions of a single calendar month.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyBucket {
    pub year: i32,
    pub month: u32,
    pub total: u64,
    pub balance: Decimal,
    pub credit_count: u64,
    pub debit_count: u64,
    pub average_credit: Decimal,
    pub average_debit: Decimal,
    pub transactions: Vec<Transaction>,
}
