//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! TTL策略集成测试（使用暂停的时钟）

use oxpolicy::gateway::RecordGateway;
use oxpolicy::model::UserFields;
use oxpolicy::policy::{TtlReader, WriteThroughCoordinator};
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let h = common::harness(&["Ann"]).await;
    let ttl = TtlReader::new(
        h.layer.clone(),
        &common::unique_name("ttl"),
        "users-4",
        Duration::from_secs(10),
    );

    let first = ttl.read_all().await.unwrap();
    assert!(!first.hit);

    h.gateway.update_by_key(1, UserFields::named("Annie")).await.unwrap();

    tokio::time::advance(Duration::from_millis(9_900)).await;
    let cached = ttl.read_all().await.unwrap();
    assert!(cached.hit);
    assert_eq!(cached.records[0].fields.name.as_deref(), Some("Ann"));

    tokio::time::advance(Duration::from_millis(200)).await;
    let refreshed = ttl.read_all().await.unwrap();
    assert!(!refreshed.hit);
    assert_eq!(refreshed.records[0].fields.name.as_deref(), Some("Annie"));

    // 重新回填后再次获得完整的TTL
    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(ttl.read_all().await.unwrap().hit);
}

#[tokio::test(start_paused = true)]
async fn test_other_namespaces_do_not_expire() {
    let h = common::harness(&["Ann"]).await;
    let ttl = TtlReader::new(
        h.layer.clone(),
        &common::unique_name("ttl"),
        "users-4",
        Duration::from_secs(10),
    );
    let wt = WriteThroughCoordinator::new(h.layer.clone(), &common::unique_name("wt"), "users-2");

    ttl.read_all().await.unwrap();
    wt.read_all().await.unwrap();

    tokio::time::advance(Duration::from_secs(3600)).await;
    assert!(!ttl.read_all().await.unwrap().hit);
    assert!(wt.read_all().await.unwrap().hit);
}

#[tokio::test(start_paused = true)]
async fn test_ttl_reader_reports_its_ttl() {
    let h = common::harness(&[]).await;
    let ttl = TtlReader::new(h.layer.clone(), "ttl_report", "users-4", Duration::from_secs(10));
    assert_eq!(ttl.ttl(), Some(Duration::from_secs(10)));
    assert_eq!(ttl.spec().cache_key, "users-4");
}
