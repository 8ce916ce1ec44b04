use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_epoch;

/// Account aggregate as stored on the command side and projected on the
/// read side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub nickname: String,
    pub email: String,
    /// Cached balance. Only explicit account commands change it; creating
    /// transactions does not.
    pub balance: Decimal,
    pub created_at: i64,
    pub updated_at: i64,
    pub active: bool,
}

impl Account {
    /// Create a new active account with a zero balance.
    pub fn new(nickname: impl Into<String>, email: impl Into<String>) -> Self {
        let now = now_epoch();
        Self {
            id: Uuid::new_v4(),
            nickname: nickname.into(),
            email: email.into(),
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            active: true,
        }
    }

    /// Advance `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now: i64) {
        self.updated_at = self.updated_at.max(now);
    }

    pub fn adjust_balance(&mut self, delta: Decimal) {
        self.balance += delta;
        self.touch(now_epoch());
    }

    pub fn rename(&mut self, nickname: impl Into<String>) {
        self.nickname = nickname.into();
        self.touch(now_epoch());
    }

    /// Soft-delete: the record stays but is flagged inactive.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.touch(now_epoch());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_account_defaults() {
        let account = Account::new("ana", "ana@example.com");
        assert_eq!(account.balance, Decimal::ZERO);
        assert!(account.active);
        assert_eq!(account.created_at, account.updated_at);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut account = Account::new("ana", "ana@example.com");
        let original = account.updated_at;

        account.touch(original - 100);
        assert_eq!(account.updated_at, original);

        account.touch(original + 5);
        assert_eq!(account.updated_at, original + 5);
    }

    #[test]
    fn test_adjust_balance_accumulates() {
        let mut account = Account::new("ana", "ana@example.com");
        account.adjust_balance(dec!(10.50));
        account.adjust_balance(dec!(-3.25));
        assert_eq!(account.balance, dec!(7.25));
    }

    #[test]
    fn test_deactivate_keeps_record() {
        let mut account = Account::new("ana", "ana@example.com");
        let before = account.updated_at;
        account.deactivate();
        assert!(!account.active);
        assert!(account.updated_at >= before);
    }
}
