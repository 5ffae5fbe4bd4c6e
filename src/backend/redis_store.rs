//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的缓存存储实现。

use super::redis_provider::{DefaultRedisProvider, RedisProvider};
use super::CacheStore;
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// 原子比较并交换脚本
///
/// ARGV[1]: 是否期望存在（"1"/"0"）；ARGV[2]: 期望值；
/// ARGV[3]: 是否删除（"1"/"0"）；ARGV[4]: 新值；ARGV[5]: 过期毫秒数（"0"表示不过期）
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
local matches
if ARGV[1] == '1' then
    matches = (current ~= false) and (current == ARGV[2])
else
    matches = (current == false)
end
if not matches then
    return 0
end
if ARGV[3] == '1' then
    redis.call('DEL', KEYS[1])
elseif ARGV[5] ~= '0' then
    redis.call('SET', KEYS[1], ARGV[4], 'PX', ARGV[5])
else
    redis.call('SET', KEYS[1], ARGV[4])
end
return 1
"#;

/// Redis缓存存储
///
/// 每条命令都受 `command_timeout_ms` 约束，超时视为缓存不可用
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    command_timeout_ms: u64,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout_ms", &self.command_timeout_ms)
            .finish()
    }
}

impl RedisStore {
    /// 创建新的Redis缓存存储
    #[instrument(skip(config), level = "info", name = "init_redis_store")]
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        Self::new_with_provider(config, Arc::new(DefaultRedisProvider)).await
    }

    /// 使用指定的连接提供者创建Redis缓存存储
    pub async fn new_with_provider(
        config: &RedisConfig,
        provider: Arc<dyn RedisProvider>,
    ) -> Result<Self> {
        let (_client, manager) = provider.connect(config).await?;
        debug!("RedisStore connected");
        Ok(Self {
            manager,
            command_timeout_ms: config.command_timeout_ms,
        })
    }

    /// 获取命令超时时间（毫秒）
    pub fn command_timeout_ms(&self) -> u64 {
        self.command_timeout_ms
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(Duration::from_millis(self.command_timeout_ms), fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(CacheError::CacheUnavailable(format!(
                "Redis {} timed out after {}ms",
                op, self.command_timeout_ms
            ))),
        }
    }
}

fn ttl_millis(ttl: Option<Duration>) -> u64 {
    // PX 不接受0，亚毫秒TTL向上取整
    ttl.map(|d| d.as_millis().max(1) as u64).unwrap_or(0)
}

#[async_trait]
impl CacheStore for RedisStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = self.bounded("GET", conn.get(key)).await?;
        debug!("redis get: key={}, found={}", key, value.is_some());
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        let px = ttl_millis(ttl);
        if px > 0 {
            cmd.arg("PX").arg(px);
        }
        let _: () = self.bounded("SET", cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = self.bounded("DEL", conn.del(key)).await?;
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
        let script = redis::Script::new(CAS_SCRIPT);
        let mut invocation = script.key(key);
        invocation
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or_default())
            .arg(if new.is_none() { "1" } else { "0" })
            .arg(new.unwrap_or_default())
            .arg(ttl_millis(ttl));

        let mut conn = self.manager.clone();
        let swapped: i32 = self
            .bounded("CAS", invocation.invoke_async(&mut conn))
            .await?;
        debug!("redis cas: key={}, swapped={}", key, swapped == 1);
        Ok(swapped == 1)
    }

    #[instrument(skip(self), level = "debug")]
    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: String = self
            .bounded("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}
