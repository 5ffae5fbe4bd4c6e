//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 生命周期管理集成测试

use oxpolicy::config::{Config, PolicyConfig};
use oxpolicy::error::CacheError;
use oxpolicy::manager::{PolicyHandle, PolicyManager};
use oxpolicy::model::UserFields;
use oxpolicy::policy::CacheSync;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

fn fast_config() -> Config {
    let mut config = Config::default();
    config.policies.insert(
        "write_back".to_string(),
        PolicyConfig::WriteBack {
            cache_key: "users-3".to_string(),
            dirty_index_key: "user-update-index".to_string(),
            reconcile_interval_ms: 500,
        },
    );
    config
}

#[tokio::test(start_paused = true)]
async fn test_reconcilers_run_until_shutdown() {
    let h = common::harness(&[]).await;
    let manager =
        PolicyManager::with_components(fast_config(), h.store.clone(), h.gateway.clone()).unwrap();
    manager.start_reconcilers().await;
    // 重复启动不会产生第二个任务
    manager.start_reconcilers().await;

    manager
        .create("write_through", UserFields::named("Ann"))
        .await
        .unwrap();
    manager
        .update("write_back", 1, UserFields::named("Annie"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.gateway.update_count(), 1);

    manager
        .update("write_back", 1, UserFields::named("Anna"))
        .await
        .unwrap();
    manager.shutdown().await.unwrap();

    // 关闭时执行最后一轮对账
    assert_eq!(h.gateway.update_count(), 2);
    assert_eq!(
        h.gateway.get(1).await.unwrap().fields.name.as_deref(),
        Some("Anna")
    );
}

#[tokio::test]
async fn test_status_reports_each_policy() {
    let h = common::harness(&["Ann"]).await;
    let manager =
        PolicyManager::with_components(Config::default(), h.store.clone(), h.gateway.clone())
            .unwrap();

    manager.read("lazy").await.unwrap();
    manager
        .update("write_back", 1, UserFields::named("Annie"))
        .await
        .unwrap();

    let status = manager.status().await;
    assert!(status.cache_available);
    assert!(status.store_available);
    assert_eq!(status.policies.len(), 4);

    let lazy = status.policies.iter().find(|p| p.name == "lazy").unwrap();
    assert_eq!(lazy.cached, Some(true));
    let ttl = status.policies.iter().find(|p| p.name == "ttl").unwrap();
    assert_eq!(ttl.cached, Some(false));
    let wb = status.policies.iter().find(|p| p.name == "write_back").unwrap();
    assert_eq!(wb.pending, Some(1));

    h.store.set_available(false);
    let status = manager.status().await;
    assert!(!status.cache_available);
    assert!(status.policies.iter().all(|p| p.cached.is_none()));
}

#[tokio::test]
async fn test_operations_reject_wrong_policy_kind() {
    let h = common::harness(&["Ann"]).await;
    let manager =
        PolicyManager::with_components(Config::default(), h.store.clone(), h.gateway.clone())
            .unwrap();

    let err = manager
        .update("write_through", 1, UserFields::named("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::NotSupported(_)));
    let err = manager.reconcile("ttl").await.unwrap_err();
    assert!(matches!(err, CacheError::NotSupported(_)));

    assert!(matches!(
        manager.policy("write_back").unwrap(),
        PolicyHandle::WriteBack(_)
    ));
    let outcome = manager
        .create("write_through", UserFields::named("Bo"))
        .await
        .unwrap();
    assert_eq!(outcome.cache, CacheSync::Refreshed);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let h = common::harness(&[]).await;
    let mut config = Config::default();
    config.policies.insert(
        "duplicate".to_string(),
        PolicyConfig::CacheAside {
            cache_key: "users".to_string(),
        },
    );
    let err = PolicyManager::with_components(config, h.store.clone(), h.gateway.clone())
        .unwrap_err();
    assert!(matches!(err, CacheError::ConfigError(_)));
}
