//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内缓存存储的实现，基于Moka。

use super::CacheStore;
use crate::error::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// 进程内缓存存储
///
/// 值: (数据, 过期时间)。过期在读取时判定并顺带移除。
/// 所有写操作经由同一把写锁串行化，使比较并交换具备原子性。
#[derive(Debug)]
pub struct MemoryStore {
    cache: Cache<String, (Vec<u8>, Option<Instant>)>,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    /// 创建新的进程内缓存存储
    ///
    /// # 参数
    ///
    /// * `capacity` - 最大条目数
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(capacity).build(),
            write_lock: Mutex::new(()),
        }
    }

    fn is_live(expire_at: Option<Instant>) -> bool {
        expire_at.map_or(true, |deadline| Instant::now() < deadline)
    }

    /// 读取未过期的值，不移除过期条目
    async fn peek(&self, key: &str) -> Option<Vec<u8>> {
        match self.cache.get(key).await {
            Some((bytes, expire_at)) if Self::is_live(expire_at) => Some(bytes),
            _ => None,
        }
    }

    /// 持写锁移除过期条目
    ///
    /// 持锁后重新检查期限，期间写入的新值不会被删除
    async fn evict_expired(&self, key: &str) {
        let _guard = self.write_lock.lock().await;
        if let Some((_, expire_at)) = self.cache.get(key).await {
            if !Self::is_live(expire_at) {
                self.cache.remove(key).await;
                debug!("memory get: key={}, expired=true, removed", key);
            }
        }
    }

    async fn insert(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let expire_at = ttl.map(|ttl| Instant::now() + ttl);
        self.cache.insert(key.to_string(), (value, expire_at)).await;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = match self.cache.get(key).await {
            Some((bytes, expire_at)) if Self::is_live(expire_at) => Some(bytes),
            Some(_) => {
                self.evict_expired(key).await;
                None
            }
            None => None,
        };
        debug!("memory get: key={}, found={}", key, value.is_some());
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.insert(key, value, ttl).await;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.cache.remove(key).await;
        Ok(())
    }

    #[instrument(skip(self, expected, new), level = "debug")]
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<Vec<u8>>,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let current = self.peek(key).await;
        if current.as_deref() != expected {
            debug!("memory cas: key={}, swapped=false", key);
            return Ok(false);
        }

        match new {
            Some(value) => self.insert(key, value, ttl).await,
            None => {
                self.cache.remove(key).await;
            }
        }
        debug!("memory cas: key={}, swapped=true", key);
        Ok(true)
    }
}
