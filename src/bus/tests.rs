use super::*;

#[test]
fn test_messaging_config_default() {
    let config = MessagingConfig::default();
    assert_eq!(config.channel_capacity, 1024);
    assert_eq!(config.drop_rate, 0.0);
    assert!(config.reject_drops);
}

#[test]
fn test_topic_matches_exact() {
    assert!(topic_matches("account.created", "account.created"));
    assert!(!topic_matches("account.created", "account.deleted"));
}

#[test]
fn test_topic_matches_wildcard() {
    assert!(topic_matches("account.created", "#"));
    assert!(topic_matches("transaction.file.uploaded", "#"));
}

#[test]
fn test_topic_matches_hierarchical() {
    assert!(topic_matches("account.created", "account"));
    assert!(topic_matches("transaction.file.uploaded", "transaction.file"));
    assert!(!topic_matches("account", "account.created"));
    assert!(!topic_matches("accounts.created", "account")); // No dot separator
}

#[test]
fn test_transaction_created_does_not_match_upload_filter() {
    assert!(!topic_matches("transaction.created", "transaction.file.uploaded"));
    assert!(!topic_matches("transaction.file.uploaded", "transaction.created"));
}

#[tokio::test]
async fn test_subscription_cancel_clears_flag() {
    let active = Arc::new(AtomicBool::new(true));
    let mut subscription = Subscription::inline("account", Arc::clone(&active));

    assert!(subscription.is_active());
    subscription.cancel();
    assert!(!active.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_subscription_drop_cancels() {
    let active = Arc::new(AtomicBool::new(true));
    {
        let _subscription = Subscription::inline("account", Arc::clone(&active));
    }
    assert!(!active.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_subscription_detach_keeps_active() {
    let active = Arc::new(AtomicBool::new(true));
    Subscription::inline("account", Arc::clone(&active)).detach();
    assert!(active.load(Ordering::SeqCst));
}
