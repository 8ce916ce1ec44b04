use super::*;
use std::sync::Arc;
use chrono::NaiveDate;
use rust_decimal_macros::dec;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[tokio::test]
async fn test_insert_account_writes_outbox() {
    let store = MockCommandStore::new();
    let account = Account::new("ana", "ana@example.com");

    let envelope = store.insert_account(&account).await.unwrap();

    assert_eq!(envelope.name(), "account.created");
    assert_eq!(envelope.aggregate_id, account.id);
    assert_eq!(store.pending_count().await.unwrap(), 1);
    assert_eq!(store.get_account(account.id).await.unwrap(), account);
}

#[tokio::test]
async fn test_modify_missing_account_not_found() {
    let store = MockCommandStore::new();

    let err = store
        .modify_account(Uuid::new_v4(), Box::new(Account::deactivate))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_modify_keeps_identity_and_created_at() {
    let store = MockCommandStore::new();
    let account = Account::new("ana", "ana@example.com");
    store.insert_account(&account).await.unwrap();

    let (changed, envelope) = store
        .modify_account(
            account.id,
            Box::new(|a: &mut Account| {
                a.id = Uuid::new_v4();
                a.created_at = 0;
                a.updated_at = 0;
                a.nickname = "Holiday".to_string();
            }),
        )
        .await
        .unwrap();

    assert_eq!(envelope.name(), "account.updated");
    assert_eq!(changed.id, account.id);
    assert_eq!(changed.created_at, account.created_at);
    assert!(changed.updated_at >= account.updated_at);
    assert_eq!(store.get_account(account.id).await.unwrap(), changed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_modifications_are_not_lost() {
    let store = Arc::new(MockCommandStore::new());
    let account = Account::new("ana", "ana@example.com");
    store.insert_account(&account).await.unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .modify_account(account.id, Box::new(|a: &mut Account| a.adjust_balance(dec!(1))))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.get_account(account.id).await.unwrap().balance, dec!(20));
}

#[tokio::test]
async fn test_pages_cover_every_row_once() {
    let store = MockCommandStore::new();
    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let account = Account::new(name, "x@example.com");
        store.insert_account(&account).await.unwrap();
        ids.push(account.id);
    }
    store
        .insert_transactions(&[
            Transaction::new(ids[0], dec!(1), "f1", date("2023-01-01")),
            Transaction::new(ids[1], dec!(2), "f1", date("2023-01-02")),
        ])
        .await
        .unwrap();

    let mut seen: Vec<Uuid> = store.accounts_page(2, 0).await.unwrap().iter().map(|a| a.id).collect();
    seen.extend(store.accounts_page(2, 2).await.unwrap().iter().map(|a| a.id));
    ids.sort();
    assert_eq!(seen, ids);

    assert_eq!(store.transactions_page(10, 0).await.unwrap().len(), 2);
    assert!(store.transactions_page(10, 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_then_get_not_found() {
    let store = MockCommandStore::new();
    let account = Account::new("ana", "ana@example.com");
    store.insert_account(&account).await.unwrap();

    let envelope = store.delete_account(account.id).await.unwrap();

    assert_eq!(envelope.name(), "account.deleted");
    assert!(store.get_account(account.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_bulk_insert_with_unknown_account_writes_nothing() {
    let store = MockCommandStore::new();
    let account = Account::new("ana", "ana@example.com");
    store.insert_account(&account).await.unwrap();

    let rows = vec![
        Transaction::new(account.id, dec!(10), "f1", date("2023-01-01")),
        Transaction::new(Uuid::new_v4(), dec!(5), "f1", date("2023-01-02")),
    ];
    let err = store.insert_transactions(&rows).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(store.transaction_count().await, 0);
    assert_eq!(store.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_fail_on_write() {
    let store = MockCommandStore::new();
    store.set_fail_on_write(true).await;

    let result = store.insert_account(&Account::new("ana", "ana@example.com")).await;

    assert!(matches!(result, Err(StorageError::Unavailable(_))));
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_outbox_retry_bookkeeping() {
    let store = MockCommandStore::new();
    let envelope = store
        .insert_account(&Account::new("ana", "ana@example.com"))
        .await
        .unwrap();

    store.mark_failed(envelope.event_id).await.unwrap();
    store.mark_failed(envelope.event_id).await.unwrap();

    let pending = store.pending(10, 3, 0).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 2);

    // Exhausted rows are no longer offered
    assert!(store.pending(10, 2, 0).await.unwrap().is_empty());

    store.mark_delivered(envelope.event_id).await.unwrap();
    assert_eq!(store.pending_count().await.unwrap(), 0);
}
