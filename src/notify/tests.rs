use super::*;
use crate::aggregation::summarize;
use crate::domain::Transaction;
use crate::storage::MockCommandStore;
use crate::test_utils::MockMailer;
use chrono::NaiveDate;
use rust_decimal_macros::dec;

async fn setup() -> (Arc<MockCommandStore>, Arc<MockMailer>, NotificationDispatcher, Account) {
    let store = Arc::new(MockCommandStore::new());
    let account = Account::new("Savings", "ana@example.com");
    store.insert_account(&account).await.unwrap();
    let mailer = Arc::new(MockMailer::new());
    let dispatcher = NotificationDispatcher::new(store.clone(), mailer.clone(), "ledger@example.com");
    (store, mailer, dispatcher, account)
}

fn sample_summary(account_id: Uuid) -> TransactionSummary {
    let date = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
    summarize(&[
        Transaction::new(account_id, dec!(100.50), "f", date("2023-01-15")),
        Transaction::new(account_id, dec!(-30.00), "f", date("2023-01-20")),
        Transaction::new(account_id, dec!(5), "f", date("2023-02-01")),
    ])
    .unwrap()
}

#[test]
fn test_render_summary() {
    let account = Account::new("Savings", "ana@example.com");
    let body = render_summary(&account, &sample_summary(account.id));

    assert!(body.starts_with("Hello Savings,"));
    assert!(body.contains("Total balance: 75.50"));
    assert!(body.contains("Average credit amount: 52.75 (2 credits)"));
    assert!(body.contains("Average debit amount: -30.00 (1 debits)"));
    assert!(body.contains("2023-01: 2 transactions, balance 70.50"));
    assert!(body.contains("2023-02: 1 transactions, balance 5.00"));
}

#[test]
fn test_render_summary_layout() {
    let account = Account::new("Savings", "ana@example.com");

    let empty = render_summary(&account, &TransactionSummary::default());
    assert_eq!(
        empty,
        "Hello Savings,\n\nTotal balance: 0.00\nTransactions: 0\n\
         Average credit amount: 0.00 (0 credits)\n\
         Average debit amount: 0.00 (0 debits)\n"
    );

    let body = render_summary(&account, &sample_summary(account.id));
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 10);
    assert_eq!(lines[7], "Transactions by month:");
    assert_eq!(lines[8], "  2023-01: 2 transactions, balance 70.50");
    assert!(body.ends_with("balance 5.00\n"));
}

#[tokio::test]
async fn test_notify_sends_to_account_email() {
    let (_store, mailer, dispatcher, account) = setup().await;

    dispatcher
        .notify(&sample_summary(account.id), account.id)
        .await
        .unwrap();

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ana@example.com");
    assert_eq!(sent[0].from, "ledger@example.com");
    assert_eq!(sent[0].subject, SUMMARY_SUBJECT);
}

#[tokio::test]
async fn test_notify_unknown_account() {
    let (_store, mailer, dispatcher, _account) = setup().await;
    let missing = Uuid::new_v4();

    let err = dispatcher
        .notify(&TransactionSummary::default(), missing)
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::AccountNotFound(id) if id == missing));
    assert!(mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_notify_lookup_failure() {
    let (store, _mailer, dispatcher, account) = setup().await;
    store.set_fail_on_read(true).await;

    let err = dispatcher
        .notify(&TransactionSummary::default(), account.id)
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::Lookup(_)));
}

#[tokio::test]
async fn test_delivery_failure_surfaces_without_retry() {
    let (_store, mailer, dispatcher, account) = setup().await;
    mailer.set_fail(true).await;

    let err = dispatcher
        .notify(&TransactionSummary::default(), account.id)
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::Delivery(_)));
    assert_eq!(mailer.attempts().await, 1);
}

#[test]
fn test_build_mailer_requires_webhook_url() {
    let config = NotificationConfig {
        mailer: MailerKind::Webhook,
        ..Default::default()
    };
    assert!(matches!(build_mailer(&config), Err(MailerError::Config(_))));
    assert!(build_mailer(&NotificationConfig::default()).is_ok());
}
