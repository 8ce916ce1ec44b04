//! Per-account transaction summaries.
//!
//! `summarize` runs in two passes: the first accumulates counts and sums
//! globally and per `YYYY-MM` bucket, the second turns the accumulated sums
//! into averages once every contributing transaction has been seen.

use std::sync::Arc;

use chrono::Datelike;
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{MonthlyBucket, Transaction, TransactionSummary, TransactionType};
use crate::projector::{ProjectionError, ReadStore};

/// Default upper bound on transactions read per summary.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Errors computing a summary.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Sum of amounts exceeds the decimal range")]
    Overflow,

    #[error(transparent)]
    Read(#[from] ProjectionError),
}

fn accumulate(total: &mut Decimal, amount: Decimal) -> Result<(), SummaryError> {
    *total = total.checked_add(amount).ok_or(SummaryError::Overflow)?;
    Ok(())
}

fn average(sum: Decimal, count: u64) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        sum / Decimal::from(count)
    }
}

/// Summarize a transaction set.
///
/// Classification uses each transaction's stored type tag. Fails with
/// `Overflow` when any running sum leaves the `Decimal` range.
pub fn summarize(transactions: &[Transaction]) -> Result<TransactionSummary, SummaryError> {
    let mut summary = TransactionSummary::default();

    // Pass 1: accumulate. Bucket averages hold running sums until pass 2.
    for transaction in transactions {
        summary.total_count += 1;
        accumulate(&mut summary.total_balance, transaction.amount)?;

        let bucket = summary
            .monthly
            .entry(transaction.month_key())
            .or_insert_with(|| MonthlyBucket {
                year: transaction.input_date.year(),
                month: transaction.input_date.month(),
                ..Default::default()
            });
        bucket.total += 1;
        accumulate(&mut bucket.balance, transaction.amount)?;
        bucket.transactions.push(transaction.clone());

        match transaction.kind {
            TransactionType::Credit => {
                summary.credit_count += 1;
                accumulate(&mut summary.total_credit, transaction.amount)?;
                bucket.credit_count += 1;
                accumulate(&mut bucket.average_credit, transaction.amount)?;
            }
            TransactionType::Debit => {
                summary.debit_count += 1;
                accumulate(&mut summary.total_debit, transaction.amount)?;
                bucket.debit_count += 1;
                accumulate(&mut bucket.average_debit, transaction.amount)?;
            }
        }
    }

    // Pass 2: divide
    for bucket in summary.monthly.values_mut() {
        bucket.average_credit = average(bucket.average_credit, bucket.credit_count);
        bucket.average_debit = average(bucket.average_debit, bucket.debit_count);
    }
    summary.average_credit = average(summary.total_credit, summary.credit_count);
    summary.average_debit = average(summary.total_debit, summary.debit_count);

    Ok(summary)
}

/// Computes summaries from the read model.
pub struct SummaryService {
    read: Arc<dyn ReadStore>,
    page_size: usize,
}

impl SummaryService {
    pub fn new(read: Arc<dyn ReadStore>, page_size: usize) -> Self {
        Self {
            read,
            page_size: page_size.max(1),
        }
    }

    /// Summarize the first `page_size` transactions of an account.
    ///
    /// Larger histories are summarized incompletely.
    pub async fn summarize(&self, account_id: Uuid) -> Result<TransactionSummary, SummaryError> {
        let transactions = self
            .read
            .transactions_by_account(account_id, self.page_size, 0)
            .await?;

        if transactions.len() >= self.page_size {
            warn!(
                account_id = %account_id,
                page_size = self.page_size,
                "Summary page is full, older history may be missing"
            );
        }

        summarize(&transactions)
    }
}
