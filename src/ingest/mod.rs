//! Bulk ingestion of CSV transaction batches.
//!
//! Input is headerless CSV with two fields per row: `YYYY-MM-DD,<amount>`.
//! Fields are taken verbatim, so surrounding whitespace makes a row invalid.
//! Rows are validated independently; malformed rows are logged and skipped
//! and the survivors are written in a single bulk command.

use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Transaction, INPUT_DATE_FORMAT};
use crate::services::{CommandError, CommandService};

/// Result type for ingestion.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors that abort an ingestion call.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("No valid rows in batch ({rejected} rejected)")]
    NoValidRows { rejected: usize },

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Upload ingestion settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// How long the upload worker waits for the read side to catch up.
    pub projection_timeout_ms: u64,
    /// First poll interval while waiting; doubles up to one second.
    pub projection_poll_ms: u64,
    /// Largest number of transactions read per summary.
    pub summary_page_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            projection_timeout_ms: 5_000,
            projection_poll_ms: 20,
            summary_page_size: crate::aggregation::DEFAULT_PAGE_SIZE,
        }
    }
}

/// Why a row was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("expected 2 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid date '{0}'")]
    Date(String),

    #[error("invalid amount '{0}'")]
    Amount(String),

    #[error("unreadable record: {0}")]
    Record(String),
}

/// A skipped row and its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    pub line: u64,
    pub reason: RowError,
}

/// A row that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub line: u64,
    pub input_date: NaiveDate,
    pub amount: Decimal,
}

/// Outcome of an accepted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: Vec<RowRejection>,
    pub transaction_ids: Vec<Uuid>,
}

/// Parse the signed amount of a row.
///
/// A leading `-` in the raw text forces the result negative whatever the
/// decimal parser produced.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let parsed = Decimal::from_str(raw).ok()?;
    if raw.starts_with('-') {
        Some(-parsed.abs())
    } else {
        Some(parsed)
    }
}

/// Parse a zero-padded `YYYY-MM-DD` date. Any other shape is rejected.
pub fn parse_input_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(raw, INPUT_DATE_FORMAT).ok()
}

fn parse_record(record: &csv::StringRecord) -> std::result::Result<(NaiveDate, Decimal), RowError> {
    if record.len() != 2 {
        return Err(RowError::FieldCount(record.len()));
    }
    let date = &record[0];
    let amount = &record[1];

    let input_date = parse_input_date(date).ok_or_else(|| RowError::Date(date.to_string()))?;
    let amount = parse_amount(amount).ok_or_else(|| RowError::Amount(amount.to_string()))?;

    Ok((input_date, amount))
}

/// Split a batch into valid rows and rejections.
pub fn parse_rows(contents: &[u8]) -> (Vec<ParsedRow>, Vec<RowRejection>) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(contents);

    let mut rows = Vec::new();
    let mut rejected = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let fallback_line = index as u64 + 1;
        let outcome = match result {
            Ok(record) => {
                let line = record.position().map_or(fallback_line, |p| p.line());
                parse_record(&record).map(|parsed| (line, parsed)).map_err(|e| (line, e))
            }
            Err(e) => {
                let line = e.position().map_or(fallback_line, |p| p.line());
                Err((line, RowError::Record(e.to_string())))
            }
        };

        match outcome {
            Ok((line, (input_date, amount))) => rows.push(ParsedRow {
                line,
                input_date,
                amount,
            }),
            Err((line, reason)) => {
                warn!(line = line, reason = %reason, "Skipping invalid row");
                rejected.push(RowRejection { line, reason });
            }
        }
    }

    (rows, rejected)
}

/// Turns uploaded batches into persisted transactions.
pub struct IngestionPipeline {
    commands: Arc<CommandService>,
}

impl IngestionPipeline {
    pub fn new(commands: Arc<CommandService>) -> Self {
        Self { commands }
    }

    /// Parse `contents` and persist every valid row for `account_id` in one
    /// bulk command.
    ///
    /// Fails with `NoValidRows` (and writes nothing) when every row is
    /// rejected.
    #[tracing::instrument(name = "ingest", skip(self, contents), fields(bytes = contents.len()))]
    pub async fn ingest(
        &self,
        contents: &[u8],
        account_id: Uuid,
        source_file_id: &str,
    ) -> Result<IngestReport> {
        let (rows, rejected) = parse_rows(contents);
        if rows.is_empty() {
            return Err(IngestError::NoValidRows {
                rejected: rejected.len(),
            });
        }

        let transactions: Vec<Transaction> = rows
            .into_iter()
            .map(|row| Transaction::new(account_id, row.amount, source_file_id, row.input_date))
            .collect();
        let transaction_ids: Vec<Uuid> = transactions.iter().map(|t| t.id).collect();

        self.commands.create_transactions_bulk(transactions).await?;

        info!(
            accepted = transaction_ids.len(),
            rejected = rejected.len(),
            "Batch ingested"
        );

        Ok(IngestReport {
            accepted: transaction_ids.len(),
            rejected,
            transaction_ids,
        })
    }
}
