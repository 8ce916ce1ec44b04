//! End-to-end tests across the command store, bus, projection and upload worker.
//!
//! Run with: cargo test --test pipeline --features sqlite,test-utils

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use uuid::Uuid;

use statera::bus::{MockEventBus, OutboxConfig, OutboxRelay};
use statera::config::{Config, StorageConfig};
use statera::domain::Transaction;
use statera::projector::{MemoryReadStore, ReadModelProjector, ReadStore};
use statera::runtime::Runtime;
use statera::services::CommandService;
use statera::storage::{OutboxStore, SqliteCommandStore};
use statera::test_utils::{sample_csv, sqlite_pool, MockMailer};
use statera::utils::bootstrap::wait_until;

const TIMEOUT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(10);

async fn runtime() -> (Runtime, Arc<MockMailer>) {
    let mailer = Arc::new(MockMailer::new());
    let runtime = Runtime::build_with_mailer(&Config::for_test(), mailer.clone())
        .await
        .expect("runtime should build");
    (runtime, mailer)
}

#[tokio::test]
async fn test_upload_end_to_end() {
    let (runtime, mailer) = runtime().await;
    let account = runtime
        .commands()
        .create_account("Savings", "ana@example.com")
        .await
        .unwrap();
    let mut client = runtime.registry().add(account.id).await;

    runtime
        .uploads()
        .upload("january.csv", sample_csv().as_bytes(), account.id)
        .await
        .unwrap();

    let outbox = mailer.as_ref();
    let delivered = wait_until("summary notification", TIMEOUT, POLL, || async move {
        !outbox.sent().await.is_empty()
    })
    .await;
    assert!(delivered);

    let sent = mailer.sent().await;
    assert_eq!(sent[0].to, "ana@example.com");
    assert!(sent[0].body.contains("Total balance: 75.50"));
    assert!(sent[0].body.contains("2023-01: 2 transactions, balance 70.50"));

    let message: serde_json::Value = serde_json::from_str(&client.recv().await.unwrap()).unwrap();
    assert_eq!(message["type"], "transaction_update");
    assert_eq!(message["summary"]["total_count"], 3);

    let stored = runtime.store().transactions_for_account(account.id).await.unwrap();
    assert_eq!(stored.len(), 3);

    // Ingestion leaves the cached balance alone
    let current = runtime.commands().get_account(account.id).await.unwrap();
    assert_eq!(current.balance, dec!(0));

    runtime.shutdown();
}

#[tokio::test]
async fn test_read_model_follows_account_lifecycle() {
    let (runtime, _mailer) = runtime().await;
    let read = runtime.read();
    let account = runtime
        .commands()
        .create_account("Savings", "ana@example.com")
        .await
        .unwrap();
    let id = account.id;

    let projected = wait_until("account projected", TIMEOUT, POLL, || async move {
        matches!(read.get_account(id).await, Ok(Some(_)))
    })
    .await;
    assert!(projected);

    let found = read.search_accounts("savngs").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, account.id);

    runtime
        .commands()
        .adjust_balance(account.id, dec!(25))
        .await
        .unwrap();
    let updated = wait_until("balance projected", TIMEOUT, POLL, || async move {
        matches!(read.get_account(id).await, Ok(Some(a)) if a.balance == dec!(25))
    })
    .await;
    assert!(updated);

    runtime.commands().delete_account(account.id).await.unwrap();
    let removed = wait_until("account removed", TIMEOUT, POLL, || async move {
        matches!(read.get_account(id).await, Ok(None))
    })
    .await;
    assert!(removed);
    assert!(read.search_accounts("savings").await.unwrap().is_empty());

    runtime.shutdown();
}

fn file_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::for_test();
    config.storage = StorageConfig {
        path: dir.path().join("ledger.db").to_string_lossy().into_owned(),
        max_connections: 5,
    };
    config
}

#[tokio::test]
async fn test_read_model_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(&dir);
    let mailer = Arc::new(MockMailer::new());

    let first = Runtime::build_with_mailer(&config, mailer.clone()).await.unwrap();
    let account = first
        .commands()
        .create_account("Savings", "ana@example.com")
        .await
        .unwrap();
    first.commands().adjust_balance(account.id, dec!(25)).await.unwrap();
    first
        .uploads()
        .upload("january.csv", sample_csv().as_bytes(), account.id)
        .await
        .unwrap();
    let outbox = mailer.as_ref();
    let delivered = wait_until("summary notification", TIMEOUT, POLL, || async move {
        !outbox.sent().await.is_empty()
    })
    .await;
    assert!(delivered);
    first.shutdown();

    let second = Runtime::build_with_mailer(&config, mailer.clone()).await.unwrap();

    let restored = second.read().get_account(account.id).await.unwrap().unwrap();
    assert_eq!(restored.balance, dec!(25));
    assert_eq!(second.read().transaction_count().await, 3);
    let found = second.read().search_accounts("savings").await.unwrap();
    assert_eq!(found.len(), 1);

    let summary = second.summaries().summarize(account.id).await.unwrap();
    assert_eq!(summary.total_count, 3);
    assert_eq!(summary.total_balance, dec!(75.50));

    second.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adjustments_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let mailer = Arc::new(MockMailer::new());
    let runtime = Runtime::build_with_mailer(&file_config(&dir), mailer).await.unwrap();
    let account = runtime
        .commands()
        .create_account("Savings", "ana@example.com")
        .await
        .unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let commands = runtime.commands().clone();
            tokio::spawn(async move { commands.adjust_balance(account.id, dec!(1)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = runtime.commands().get_account(account.id).await.unwrap();
    assert_eq!(stored.balance, dec!(20));
    assert!(stored.updated_at >= account.updated_at);

    runtime.shutdown();
}

struct Manual {
    store: Arc<SqliteCommandStore>,
    bus: Arc<MockEventBus>,
    relay: Arc<OutboxRelay>,
    read: Arc<MemoryReadStore>,
    commands: CommandService,
    _subscriptions: Vec<statera::bus::Subscription>,
}

async fn manual() -> Manual {
    let store = Arc::new(SqliteCommandStore::new(sqlite_pool().await.unwrap()));
    store.init().await.unwrap();
    let bus = Arc::new(MockEventBus::new());
    let relay = Arc::new(OutboxRelay::new(
        store.clone(),
        bus.clone(),
        OutboxConfig {
            min_age_secs: 0,
            ..Default::default()
        },
    ));
    let read = Arc::new(MemoryReadStore::new());
    let subscriptions = ReadModelProjector::new(read.clone())
        .subscribe_all(bus.as_ref())
        .await
        .unwrap();
    let commands = CommandService::new(store.clone(), relay.clone());

    Manual {
        store,
        bus,
        relay,
        read,
        commands,
        _subscriptions: subscriptions,
    }
}

#[tokio::test]
async fn test_publish_failure_is_recovered_from_outbox() {
    let m = manual().await;
    m.bus.set_fail_on_publish(true).await;

    // The command still succeeds; the event waits in the outbox
    let account = m.commands.create_account("Savings", "ana@example.com").await.unwrap();
    assert_eq!(m.store.pending_count().await.unwrap(), 1);
    assert_eq!(m.read.account_count().await, 0);

    m.bus.set_fail_on_publish(false).await;
    let recovered = m.relay.recover_pending().await.unwrap();

    assert_eq!(recovered, 1);
    assert_eq!(m.store.pending_count().await.unwrap(), 0);
    assert_eq!(m.read.get_account(account.id).await.unwrap(), Some(account));
}

#[tokio::test]
async fn test_redelivery_is_deduplicated() {
    let m = manual().await;
    let account = m.commands.create_account("Savings", "ana@example.com").await.unwrap();
    let envelopes = m.bus.take_published().await;

    // Replaying the same envelope is harmless
    m.relay.deliver(&envelopes).await;
    m.relay.deliver(&envelopes).await;

    assert_eq!(m.read.account_count().await, 1);
    assert_eq!(m.read.get_account(account.id).await.unwrap(), Some(account));
}

#[tokio::test]
async fn test_bulk_rollback_emits_nothing() {
    let m = manual().await;
    let account = m.commands.create_account("Savings", "ana@example.com").await.unwrap();
    m.bus.take_published().await;

    let date = chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let batch = vec![
        Transaction::new(account.id, dec!(10), "f1", date),
        Transaction::new(Uuid::new_v4(), dec!(5), "f1", date),
    ];
    let err = m.commands.create_transactions_bulk(batch).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(m.bus.published_count().await, 0);
    assert_eq!(m.store.pending_count().await.unwrap(), 0);
    assert!(m.store.transactions_for_account(account.id).await.unwrap().is_empty());
    assert_eq!(m.read.transaction_count().await, 0);
}
