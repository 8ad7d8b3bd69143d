//! Integration tests for configuration flowing into the engine

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use txguard::config::{AppConfig, ConfigError};
use txguard::notes::{KeywordSentiment, NoteService};
use txguard::store::DocumentStore;
use txguard::transaction::{CallOptions, IsolationLevel, TransactionEngine};

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("txguard.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

fn service(config: &AppConfig) -> NoteService {
    NoteService::new(
        TransactionEngine::new(DocumentStore::new(), config.transaction.clone()),
        Arc::new(KeywordSentiment::new(Duration::ZERO)),
    )
}

#[test]
fn test_file_values_resolve_into_call_options() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[transaction]
default_timeout_ms = 1500
retry_count = 7
default_isolation_level = "serializable"
"#,
    );

    let config = AppConfig::load_with_env(Some(&path), Some(HashMap::new())).unwrap();
    let effective = CallOptions::default().resolve(Some(&config.transaction));
    assert_eq!(effective.timeout, Duration::from_millis(1500));
    assert_eq!(effective.retry_count, 7);
    assert_eq!(effective.isolation, IsolationLevel::Serializable);

    // Explicit call options still win.
    let explicit = CallOptions::new()
        .retry_count(0)
        .isolation(IsolationLevel::ReadCommitted)
        .resolve(Some(&config.transaction));
    assert_eq!(explicit.retry_count, 0);
    assert_eq!(explicit.isolation, IsolationLevel::ReadCommitted);
    assert_eq!(explicit.timeout, Duration::from_millis(1500));
}

#[test]
fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[transaction]\nretry_count = 2\n");

    let vars = HashMap::from([(
        "TXGUARD_TRANSACTION__RETRY_COUNT".to_string(),
        "9".to_string(),
    )]);
    let config = AppConfig::load_with_env(Some(&path), Some(vars)).unwrap();
    assert_eq!(config.transaction.retry_count, Some(9));
}

#[test]
fn test_missing_and_invalid_files() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(matches!(
        AppConfig::load_with_env(Some(&missing), Some(HashMap::new())),
        Err(ConfigError::NotFound(_))
    ));

    let path = write_config(&dir, "[transaction]\ndefault_timeout_ms = 0\n");
    assert!(matches!(
        AppConfig::load_with_env(Some(&path), Some(HashMap::new())),
        Err(ConfigError::Invalid(_))
    ));
}

#[tokio::test]
async fn test_configured_test_retries_replay_writes() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[transaction]\ntest_retries = 2\n");
    let config = AppConfig::load_with_env(Some(&path), Some(HashMap::new())).unwrap();
    let service = service(&config);

    service.create("Replayed", "body").await.unwrap();

    let stats = service.engine().provider().stats();
    assert_eq!(stats.commits, 1);
    assert_eq!(stats.rollbacks, 2);
    assert_eq!(service.list().await.unwrap().len(), 1);
}

#[test]
fn test_rendered_config_loads_back() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "[transaction]\nretry_count = 4\nretry_backoff_ms = 5\n\n[logging]\nlevel = \"debug\"\n",
    );
    let config = AppConfig::load_with_env(Some(&path), Some(HashMap::new())).unwrap();

    let rendered = config.to_toml().unwrap();
    assert_eq!(AppConfig::from_toml(&rendered).unwrap(), config);
}
