//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! SeaORM SQLite后端网关测试

use oxpolicy::config::{Config, DatabaseConfig};
use oxpolicy::error::CacheError;
use oxpolicy::gateway::{RecordGateway, SeaOrmGateway};
use oxpolicy::manager::PolicyManager;
use oxpolicy::model::{Record, UserFields};
use oxpolicy::policy::CacheSync;
use secrecy::SecretString;

#[path = "../common/mod.rs"]
mod common;

fn sqlite_config(url: &str) -> DatabaseConfig {
    DatabaseConfig {
        connection_string: SecretString::new(url.to_string().into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_insert_fetch_update_roundtrip() {
    common::setup_logging();
    let gateway = SeaOrmGateway::connect(&sqlite_config("sqlite::memory:"))
        .await
        .unwrap();

    let ann = gateway.insert(UserFields::named("Ann")).await.unwrap();
    let bo = gateway
        .insert(UserFields {
            name: Some("Bo".to_string()),
            email: Some("bo@example.com".to_string()),
            description: None,
        })
        .await
        .unwrap();
    assert_eq!((ann.id, bo.id), (1, 2));
    assert_eq!(gateway.fetch_all().await.unwrap(), vec![ann, bo.clone()]);

    gateway
        .update_by_key(1, UserFields::named("Annie"))
        .await
        .unwrap();
    let rows = gateway.fetch_all().await.unwrap();
    assert_eq!(rows[0], Record::new(1, UserFields::named("Annie")));
    assert_eq!(rows[1], bo);

    let err = gateway
        .update_by_key(99, UserFields::named("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::RecordNotFound(99)));

    gateway.ping().await.unwrap();
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_file_database_persists_across_connections() {
    common::setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("users.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());

    {
        let gateway = SeaOrmGateway::connect(&sqlite_config(&url)).await.unwrap();
        gateway.insert(UserFields::named("Ann")).await.unwrap();
        gateway.close().await.unwrap();
    }

    let gateway = SeaOrmGateway::connect(&sqlite_config(&url)).await.unwrap();
    let rows = gateway.fetch_all().await.unwrap();
    assert_eq!(rows, vec![Record::new(1, UserFields::named("Ann"))]);
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_invalid_table_name_is_rejected() {
    let config = DatabaseConfig {
        table: "users; DROP TABLE users".to_string(),
        ..sqlite_config("sqlite::memory:")
    };
    let err = SeaOrmGateway::connect(&config).await.unwrap_err();
    assert!(matches!(err, CacheError::ConfigError(_)));
}

fn file_backed_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("records.db").display());
    config.database = sqlite_config(&url);
    config
}

#[tokio::test]
async fn test_manager_scenario_against_sqlite() {
    common::setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let manager = PolicyManager::init(file_backed_config(&dir)).await.unwrap();

    let created = manager
        .create("write_through", UserFields::named("Ann"))
        .await
        .unwrap();
    assert_eq!(created.record.id, 1);
    assert_eq!(created.cache, CacheSync::Refreshed);

    let read = manager.read("write_through").await.unwrap();
    assert!(read.hit);

    manager
        .update("write_back", 1, UserFields::named("Annie"))
        .await
        .unwrap();
    let store_view = manager.layer().gateway().fetch_all().await.unwrap();
    assert_eq!(store_view[0].fields.name.as_deref(), Some("Ann"));

    let report = manager.reconcile("write_back").await.unwrap();
    assert_eq!(report.flushed, vec![1]);
    let store_view = manager.layer().gateway().fetch_all().await.unwrap();
    assert_eq!(store_view[0].fields.name.as_deref(), Some("Annie"));

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_records_survive_between_manager_runs() {
    common::setup_logging();
    let dir = tempfile::tempdir().unwrap();

    // 每次命令行调用都是一个新的管理器
    let first = PolicyManager::init(file_backed_config(&dir)).await.unwrap();
    first
        .create("write_through", UserFields::named("Ann"))
        .await
        .unwrap();
    first.shutdown().await.unwrap();

    let second = PolicyManager::init(file_backed_config(&dir)).await.unwrap();
    second
        .update("write_back", 1, UserFields::named("Annie"))
        .await
        .unwrap();
    second.shutdown().await.unwrap();

    let third = PolicyManager::init(file_backed_config(&dir)).await.unwrap();
    let read = third.read("lazy").await.unwrap();
    assert_eq!(read.records, vec![Record::new(1, UserFields::named("Annie"))]);
    third.shutdown().await.unwrap();
}
