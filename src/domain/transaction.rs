use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_epoch;

/// Calendar format of `input_date` in batch files and storage.
pub const INPUT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Credit/debit tag derived from the sign of the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    /// Strictly positive amounts are credits; zero and negatives are debits.
    pub fn from_amount(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            Self::Credit
        } else {
            Self::Debit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable ledger entry owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub source_file_id: String,
    pub input_date: NaiveDate,
    pub created_at: i64,
}

impl Transaction {
    pub fn new(
        account_id: Uuid,
        amount: Decimal,
        source_file_id: impl Into<String>,
        input_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount,
            kind: TransactionType::from_amount(amount),
            source_file_id: source_file_id.into(),
            input_date,
            created_at: now_epoch(),
        }
    }

    /// `YYYY-MM` bucket key of the input date.
    pub fn month_key(&self) -> String {
        self.input_date.format("%Y-%m").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_type_from_positive_amount() {
        assert_eq!(TransactionType::from_amount(dec!(0.01)), TransactionType::Credit);
        assert_eq!(TransactionType::from_amount(dec!(100.50)), TransactionType::Credit);
    }

    #[test]
    fn test_type_from_negative_amount() {
        assert_eq!(TransactionType::from_amount(dec!(-30.00)), TransactionType::Debit);
    }

    #[test]
    fn test_zero_amount_is_debit() {
        assert_eq!(TransactionType::from_amount(Decimal::ZERO), TransactionType::Debit);
        assert_eq!(TransactionType::from_amount(dec!(-0.00)), TransactionType::Debit);
    }

    #[test]
    fn test_new_transaction_derives_type() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        let tx = Transaction::new(Uuid::new_v4(), dec!(-5), "file.csv", date);
        assert_eq!(tx.kind, TransactionType::Debit);
        assert_eq!(tx.month_key(), "2023-01");
    }

    #[test]
    fn test_type_serializes_lowercase() {
        let date = NaiveDate::from_ymd_opt(2023, 2, 1).unwrap();
        let tx = Transaction::new(Uuid::new_v4(), dec!(5), "file.csv", date);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "credit");
        assert_eq!(json["input_date"], "2023-02-01");
    }

    #[test]
    fn test_type_parse() {
        assert_eq!(TransactionType::parse("credit"), Some(TransactionType::Credit));
        assert_eq!(TransactionType::parse("debit"), Some(TransactionType::Debit));
        assert_eq!(TransactionType::parse("refund"), None);
    }
}
