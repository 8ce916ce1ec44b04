use super::*;
use crate::notify::MailerKind;
use serial_test::serial;
use std::io::Write;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.storage.path, DEFAULT_STORAGE_PATH);
    assert_eq!(config.messaging.channel_capacity, 1024);
    assert_eq!(config.outbox.max_retries, 10);
    assert_eq!(config.ingest.summary_page_size, 1000);
    assert_eq!(config.notification.mailer, MailerKind::Log);
}

#[test]
fn test_config_for_test() {
    let config = Config::for_test();
    assert_eq!(config.storage.path, ":memory:");
    assert_eq!(config.outbox.min_age_secs, 0);
}

#[test]
fn test_partial_yaml_keeps_defaults() {
    let yaml = r#"
storage:
  path: /var/lib/statera/ledger.db
notification:
  mailer: webhook
  webhook_url: http://localhost:9000/mail
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.storage.path, "/var/lib/statera/ledger.db");
    assert_eq!(config.storage.max_connections, 5);
    assert_eq!(config.notification.mailer, MailerKind::Webhook);
    assert_eq!(
        config.notification.webhook_url.as_deref(),
        Some("http://localhost:9000/mail")
    );
    assert_eq!(config.outbox.recovery_interval_secs, 5);
}

#[test]
#[serial]
fn test_load_from_file_path() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "ingest:\n  summary_page_size: 50\noutbox:\n  batch_size: 7").unwrap();

    let config = Config::load(file.path().to_str()).unwrap();

    assert_eq!(config.ingest.summary_page_size, 50);
    assert_eq!(config.outbox.batch_size, 7);
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "storage:\n  path: from-file.db").unwrap();

    std::env::set_var("STATERA__STORAGE__PATH", "from-env.db");
    let config = Config::load(file.path().to_str());
    std::env::remove_var("STATERA__STORAGE__PATH");

    assert_eq!(config.unwrap().storage.path, "from-env.db");
}
