//! Summary notifications.
//!
//! `NotificationDispatcher` resolves the account holder's address from the
//! command store, renders a plain-text summary and hands it to a `Mailer`.
//! Delivery failures are returned to the caller and not retried.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Account, TransactionSummary};
use crate::storage::{CommandStore, StorageError};

mod webhook;

pub use webhook::WebhookMailer;

/// Subject line of summary notifications.
pub const SUMMARY_SUBJECT: &str = "Your transaction summary";

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors surfaced by `NotificationDispatcher::notify`.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Account lookup failed: {0}")]
    Lookup(StorageError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] MailerError),
}

/// Errors from a delivery collaborator.
#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rejected with status {0}")]
    Rejected(u16),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mailer unavailable: {0}")]
    Unavailable(String),
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// External delivery collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), MailerError>;
}

/// Mailer that only logs what it would send.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), MailerError> {
        info!(to = %notification.to, subject = %notification.subject, "Notification sent (log mailer)");
        debug!(body = %notification.body, "Notification body");
        Ok(())
    }
}

/// Which mailer to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailerKind {
    #[default]
    Log,
    Webhook,
}

/// Notification configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub mailer: MailerKind,
    /// Endpoint for the webhook mailer.
    pub webhook_url: Option<String>,
    /// Sender address placed on every notification.
    pub sender: String,
    /// Webhook request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            mailer: MailerKind::Log,
            webhook_url: None,
            sender: "no-reply@statera.local".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Build the configured mailer.
pub fn build_mailer(config: &NotificationConfig) -> std::result::Result<Arc<dyn Mailer>, MailerError> {
    match config.mailer {
        MailerKind::Log => Ok(Arc::new(LogMailer)),
        MailerKind::Webhook => {
            let url = config
                .webhook_url
                .clone()
                .ok_or_else(|| MailerError::Config("webhook_url not set".to_string()))?;
            Ok(Arc::new(WebhookMailer::new(
                url,
                std::time::Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}

/// Render the plain-text summary for an account holder.
pub fn render_summary(account: &Account, summary: &TransactionSummary) -> String {
    let mut lines = vec![
        format!("Hello {},", account.nickname),
        String::new(),
        format!("Total balance: {:.2}", summary.total_balance),
        format!("Transactions: {}", summary.total_count),
        format!(
            "Average credit amount: {:.2} ({} credits)",
            summary.average_credit, summary.credit_count
        ),
        format!(
            "Average debit amount: {:.2} ({} debits)",
            summary.average_debit, summary.debit_count
        ),
    ];

    if !summary.monthly.is_empty() {
        lines.push(String::new());
        lines.push("Transactions by month:".to_string());
        lines.extend(summary.monthly.iter().map(|(key, bucket)| {
            format!(
                "  {}: {} transactions, balance {:.2}",
                key, bucket.total, bucket.balance
            )
        }));
    }

    let mut body = lines.join("\n");
    body.push('\n');
    body
}

/// Sends summaries to account holders.
pub struct NotificationDispatcher {
    accounts: Arc<dyn CommandStore>,
    mailer: Arc<dyn Mailer>,
    sender: String,
}

impl NotificationDispatcher {
    pub fn new(accounts: Arc<dyn CommandStore>, mailer: Arc<dyn Mailer>, sender: impl Into<String>) -> Self {
        Self {
            accounts,
            mailer,
            sender: sender.into(),
        }
    }

    #[tracing::instrument(name = "notify", skip(self, summary))]
    pub async fn notify(&self, summary: &TransactionSummary, account_id: Uuid) -> Result<()> {
        let account = match self.accounts.get_account(account_id).await {
            Ok(account) => account,
            Err(e) if e.is_not_found() => return Err(NotifyError::AccountNotFound(account_id)),
            Err(e) => return Err(NotifyError::Lookup(e)),
        };

        let notification = Notification {
            from: self.sender.clone(),
            to: account.email.clone(),
            subject: SUMMARY_SUBJECT.to_string(),
            body: render_summary(&account, summary),
        };
        self.mailer.send(&notification).await?;

        info!(account_id = %account_id, "Summary notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
