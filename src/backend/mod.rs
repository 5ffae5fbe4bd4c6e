//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存存储接口及其实现：进程内（Moka）与Redis。

pub mod memory;
pub mod redis_store;
pub mod redis_provider;

use crate::config::{CacheBackendType, CacheStoreConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// 缓存存储特征
///
/// 字节值的键值存储，支持可选的逐键过期。
/// 过期的条目对 `get` 而言等同于不存在，无需显式删除。
/// 它是“是否已缓存”的唯一事实来源，策略层不另行维护命中记录。
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 获取缓存值，不存在或已过期时返回None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 设置缓存值
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 缓存值
    /// * `ttl` - 过期时长，None表示永不过期
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// 删除缓存项
    async fn delete(&self, key: &str) -> Result<()>;

    /// 原子比较并交换
    ///
    /// 仅当当前值与 `expected` 相同（`None` 表示当前不存在）时写入 `new`；
    /// `new` 为 `None` 时删除该键。返回是否写入成功。
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<Vec<u8>>,
        ttl: Option<Duration>,
    ) -> Result<bool>;

    /// 检查存储是否可用
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// 关闭存储，释放连接
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// 根据配置创建缓存存储
pub async fn connect(config: &CacheStoreConfig) -> Result<Arc<dyn CacheStore>> {
    match config.backend {
        CacheBackendType::Memory => Ok(Arc::new(MemoryStore::new(config.memory.max_capacity))),
        CacheBackendType::Redis => Ok(Arc::new(RedisStore::new(&config.redis).await?)),
    }
}
