//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! Redis缓存存储集成测试（Redis不可用时跳过）

use oxpolicy::backend::{CacheStore, RedisStore};
use oxpolicy::config::RedisConfig;
use oxpolicy::gateway::MemoryGateway;
use oxpolicy::model::UserFields;
use oxpolicy::policy::{CacheLayer, WriteBackCoordinator};
use oxpolicy::serialization::SerializerEnum;
use secrecy::SecretString;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

async fn redis_store() -> Option<RedisStore> {
    common::setup_logging();
    if !common::is_redis_available().await {
        println!("Skipping: Redis is not available");
        return None;
    }
    let config = RedisConfig {
        connection_string: SecretString::new(common::redis_url().into()),
        ..Default::default()
    };
    Some(RedisStore::new(&config).await.expect("connect to redis"))
}

#[tokio::test]
#[serial]
async fn test_get_set_delete() {
    let Some(store) = redis_store().await else {
        return;
    };
    let key = common::unique_name("oxpolicy_test");

    assert_eq!(store.get(&key).await.unwrap(), None);
    store.set(&key, b"value".to_vec(), None).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(b"value".to_vec()));
    store.delete(&key).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[serial]
async fn test_entry_expires() {
    let Some(store) = redis_store().await else {
        return;
    };
    let key = common::unique_name("oxpolicy_ttl");

    store
        .set(&key, b"short".to_vec(), Some(Duration::from_millis(200)))
        .await
        .unwrap();
    assert!(store.get(&key).await.unwrap().is_some());
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[serial]
async fn test_compare_and_swap() {
    let Some(store) = redis_store().await else {
        return;
    };
    let key = common::unique_name("oxpolicy_cas");

    assert!(store
        .compare_and_swap(&key, None, Some(b"a".to_vec()), None)
        .await
        .unwrap());
    assert!(!store
        .compare_and_swap(&key, None, Some(b"b".to_vec()), None)
        .await
        .unwrap());
    assert!(!store
        .compare_and_swap(&key, Some(b"x"), Some(b"b".to_vec()), None)
        .await
        .unwrap());
    assert!(store
        .compare_and_swap(&key, Some(b"a"), Some(b"b".to_vec()), None)
        .await
        .unwrap());
    assert_eq!(store.get(&key).await.unwrap(), Some(b"b".to_vec()));
    assert!(store
        .compare_and_swap(&key, Some(b"b"), None, None)
        .await
        .unwrap());
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[serial]
async fn test_write_back_over_redis() {
    let Some(store) = redis_store().await else {
        return;
    };
    let image = common::unique_name("users");
    let dirty = common::unique_name("dirty");
    let gateway = Arc::new(MemoryGateway::seeded([UserFields::named("Ann")]).await);
    let layer = Arc::new(CacheLayer::new(
        Arc::new(store.clone()),
        gateway.clone(),
        SerializerEnum::default(),
    ));
    let wb = WriteBackCoordinator::new(layer, &common::unique_name("wb_redis"), &image, &dirty);

    wb.update(1, UserFields::named("Annie")).await.unwrap();
    assert!(wb.read_all().await.unwrap().hit);
    let report = wb.reconcile().await.unwrap();
    assert_eq!(report.flushed, vec![1]);
    assert_eq!(store.get(&dirty).await.unwrap(), None);
    assert_eq!(
        gateway.get(1).await.unwrap().fields.name.as_deref(),
        Some("Annie")
    );

    store.delete(&image).await.unwrap();
}
