//! Integration tests for configuration loading
//!
//! Tests that touch `BIDAUDIT_CONFIG` are marked `#[serial]` so they do not
//! race on the process environment.

use bidaudit_common::config::{AppConfig, CONFIG_PATH_ENV};
use bidaudit_common::Error;
use serial_test::serial;
use std::env;

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("bidaudit.toml");
    std::fs::write(&path, body).expect("Failed to write config file");
    path
}

#[test]
#[serial]
fn test_load_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
        [database]
        host = "mysql.local"
        name = "audit_test"

        [data_hub]
        host = "http://hub.local"
        max_retries = 5

        [[catalog.tender_fields]]
        code = "project_name"
        name = "项目名称"
        "#,
    );

    let config = AppConfig::load(Some(&path)).expect("config should load");

    assert_eq!(config.database.host, "mysql.local");
    assert_eq!(config.database.name, "audit_test");
    assert_eq!(config.data_hub.host.as_deref(), Some("http://hub.local"));
    assert_eq!(config.data_hub.max_retries, 5);
    assert_eq!(config.data_hub.retry_backoff_ms, 1000);
    assert_eq!(config.catalog.tender_fields.len(), 1);
    // Doc types untouched by the file keep their defaults
    assert!(config.catalog.doc_type("business_license").is_some());
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = AppConfig::load(Some(&missing)).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "unexpected error: {:?}", err);
}

#[test]
#[serial]
fn test_config_path_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[server]\nport = 4100\n");

    env::set_var(CONFIG_PATH_ENV, &path);
    let result = AppConfig::load(None);
    env::remove_var(CONFIG_PATH_ENV);

    assert_eq!(result.unwrap().server.port, 4100);
}

#[test]
#[serial]
fn test_duplicate_catalog_codes_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
        [[catalog.tender_fields]]
        code = "budget"
        name = "预算"

        [[catalog.tender_fields]]
        code = "budget"
        name = "预算金额"
        "#,
    );

    let err = AppConfig::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("duplicate tender field code"));
}

#[test]
#[serial]
fn test_zero_poll_interval_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[agent]\npoll_interval_ms = 0\n");

    assert!(AppConfig::load(Some(&path)).is_err());
}
