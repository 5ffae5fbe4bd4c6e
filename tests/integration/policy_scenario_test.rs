//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 四种策略的端到端场景测试

use oxpolicy::gateway::RecordGateway;
use oxpolicy::model::{Record, UserFields};
use oxpolicy::policy::{
    CacheAsideReader, CacheSync, TtlReader, WriteBackCoordinator, WriteThroughCoordinator,
};
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

#[tokio::test]
async fn test_write_through_then_write_back_scenario() {
    let h = common::harness(&[]).await;
    let wt = WriteThroughCoordinator::new(h.layer.clone(), &common::unique_name("wt"), "users-2");
    let wb = WriteBackCoordinator::new(
        h.layer.clone(),
        &common::unique_name("wb"),
        "users-3",
        "user-update-index",
    );

    let created = wt.create(UserFields::named("Ann")).await.unwrap();
    assert_eq!(created.record, Record::new(1, UserFields::named("Ann")));
    assert_eq!(created.cache, CacheSync::Refreshed);

    let read = wt.read_all().await.unwrap();
    assert!(read.hit);
    assert_eq!(read.records, vec![created.record.clone()]);

    wb.update(1, UserFields::named("Annie")).await.unwrap();
    let read = wb.read_all().await.unwrap();
    assert!(read.hit);
    assert_eq!(read.records, vec![Record::new(1, UserFields::named("Annie"))]);

    // 对账之前后端仍是旧值
    assert_eq!(
        h.gateway.get(1).await.unwrap().fields.name.as_deref(),
        Some("Ann")
    );

    let report = wb.reconcile().await.unwrap();
    assert_eq!(report.flushed, vec![1]);
    assert_eq!(
        h.gateway.get(1).await.unwrap().fields.name.as_deref(),
        Some("Annie")
    );
    assert!(wb.pending().await.unwrap().is_empty());

    // 写穿命名空间不受回写影响
    let read = wt.read_all().await.unwrap();
    assert_eq!(read.records[0].fields.name.as_deref(), Some("Ann"));
}

#[tokio::test]
async fn test_policies_never_share_cached_state() {
    let h = common::harness(&["Ann"]).await;
    let lazy = CacheAsideReader::new(h.layer.clone(), &common::unique_name("lazy"), "users");
    let ttl = TtlReader::new(
        h.layer.clone(),
        &common::unique_name("ttl"),
        "users-4",
        Duration::from_secs(10),
    );
    let wt = WriteThroughCoordinator::new(h.layer.clone(), &common::unique_name("wt"), "users-2");

    assert!(!lazy.read_all().await.unwrap().hit);
    assert!(lazy.read_all().await.unwrap().hit);

    // 旁路缓存已命中，不代表其他策略命中
    assert!(!ttl.read_all().await.unwrap().hit);
    assert!(!wt.read_all().await.unwrap().hit);

    wt.create(UserFields::named("Bo")).await.unwrap();
    let lazy_read = lazy.read_all().await.unwrap();
    assert!(lazy_read.hit);
    assert_eq!(lazy_read.records.len(), 1);
    assert_eq!(wt.read_all().await.unwrap().records.len(), 2);
}

#[tokio::test]
async fn test_cache_aside_stays_stale_until_invalidated() {
    let h = common::harness(&["Ann"]).await;
    let lazy = CacheAsideReader::new(h.layer.clone(), &common::unique_name("lazy"), "users");

    lazy.read_all().await.unwrap();
    h.gateway.update_by_key(1, UserFields::named("Annie")).await.unwrap();

    let stale = lazy.read_all().await.unwrap();
    assert!(stale.hit);
    assert_eq!(stale.records[0].fields.name.as_deref(), Some("Ann"));

    lazy.invalidate().await.unwrap();
    let fresh = lazy.read_all().await.unwrap();
    assert!(!fresh.hit);
    assert_eq!(fresh.records[0].fields.name.as_deref(), Some("Annie"));
}

#[tokio::test]
async fn test_reads_degrade_when_cache_is_offline() {
    let h = common::harness(&["Ann", "Bo"]).await;
    let lazy = CacheAsideReader::new(h.layer.clone(), &common::unique_name("lazy"), "users");

    h.store.set_available(false);
    let read = lazy.read_all().await.unwrap();
    assert!(read.degraded);
    assert!(!read.hit);
    assert_eq!(read.records.len(), 2);
    assert_eq!(read.message(), "Data from store");

    // 缓存恢复后第一次读取仍是未命中（降级期间不回填）
    h.store.set_available(true);
    assert!(!lazy.read_all().await.unwrap().hit);
    assert!(lazy.read_all().await.unwrap().hit);
}

#[tokio::test]
async fn test_store_failure_on_miss_is_fatal() {
    let h = common::harness(&["Ann"]).await;
    let lazy = CacheAsideReader::new(h.layer.clone(), &common::unique_name("lazy"), "users");

    h.gateway.set_available(false);
    let err = lazy.read_all().await.unwrap_err();
    assert!(err.is_store_unavailable());
}

#[tokio::test]
async fn test_write_through_with_offline_cache_is_durable_but_stale() {
    let h = common::harness(&[]).await;
    let wt = WriteThroughCoordinator::new(h.layer.clone(), &common::unique_name("wt"), "users-2");

    h.store.set_available(false);
    let outcome = wt.create(UserFields::named("Ann")).await.unwrap();
    match &outcome.cache {
        CacheSync::Stale { reason } => assert!(reason.contains("cache offline")),
        other => panic!("expected stale cache, got {:?}", other),
    }
    assert_eq!(h.gateway.fetch_all().await.unwrap(), vec![outcome.record]);
}

#[tokio::test]
async fn test_write_back_with_offline_cache_fails() {
    let h = common::harness(&["Ann"]).await;
    let wb = WriteBackCoordinator::new(
        h.layer.clone(),
        &common::unique_name("wb"),
        "users-3",
        "user-update-index",
    );

    h.store.set_available(false);
    let err = wb.update(1, UserFields::named("Annie")).await.unwrap_err();
    assert!(err.is_cache_unavailable());
    assert_eq!(h.gateway.update_count(), 0);
}
