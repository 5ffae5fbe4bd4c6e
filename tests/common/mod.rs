//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

#![allow(dead_code)]

use async_trait::async_trait;
use oxpolicy::backend::{CacheStore, MemoryStore};
use oxpolicy::error::{CacheError, Result};
use oxpolicy::gateway::MemoryGateway;
use oxpolicy::model::UserFields;
use oxpolicy::policy::CacheLayer;
use oxpolicy::serialization::SerializerEnum;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 生成唯一的策略名称，避免全局指标在测试之间串扰
pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// 内存缓存 + 内存后端组成的测试环境
pub struct Harness {
    pub store: Arc<ToggleStore>,
    pub gateway: Arc<MemoryGateway>,
    pub layer: Arc<CacheLayer>,
}

pub async fn harness(seed: &[&str]) -> Harness {
    setup_logging();
    let store = Arc::new(ToggleStore::new());
    let gateway = Arc::new(MemoryGateway::seeded(seed.iter().map(|n| UserFields::named(*n))).await);
    let layer = Arc::new(CacheLayer::new(
        store.clone(),
        gateway.clone(),
        SerializerEnum::default(),
    ));
    Harness {
        store,
        gateway,
        layer,
    }
}

/// 可以整体切换为不可用的缓存存储
pub struct ToggleStore {
    pub inner: MemoryStore,
    available: AtomicBool,
}

impl ToggleStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(1000),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::CacheUnavailable("cache offline".to_string()))
        }
    }
}

#[async_trait]
impl CacheStore for ToggleStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<Vec<u8>>,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        self.check()?;
        self.inner.compare_and_swap(key, expected, new, ttl).await
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

/// 检查Redis是否可用
pub async fn is_redis_available() -> bool {
    let url = redis_url();
    let Ok(client) = redis::Client::open(url.as_str()) else {
        return false;
    };
    match tokio::time::timeout(
        Duration::from_secs(2),
        client.get_multiplexed_async_connection(),
    )
    .await
    {
        Ok(Ok(mut conn)) => {
            let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            pong.is_ok()
        }
        _ => false,
    }
}

pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}
