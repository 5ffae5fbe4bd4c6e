//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存策略层
//!
//! 所有策略共享同一套读写骨架（[`CacheLayer`]），差异只体现在
//! [`PolicySpec`] 上：缓存键命名空间、回填时的过期时长和写入模式。
//! 四个入口（旁路、写穿、回写、TTL）只是对骨架的薄封装。

pub mod cache_aside;
pub mod ttl;
pub mod write_back;
pub mod write_through;

use crate::backend::CacheStore;
use crate::config::PolicyConfig;
use crate::error::{CacheError, Result};
use crate::gateway::RecordGateway;
use crate::metrics::GLOBAL_METRICS;
use crate::model::{DirtyIndex, Record};
use crate::serialization::{Serializer, SerializerEnum};
use crate::utils::redaction::redact_cache_key;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub use cache_aside::CacheAsideReader;
pub use ttl::TtlReader;
pub use write_back::{ReconcileReport, WriteBackCoordinator};
pub use write_through::WriteThroughCoordinator;

/// 比较并交换的默认最大尝试次数
pub const DEFAULT_MAX_CAS_ATTEMPTS: usize = 16;

/// 写入模式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// 只读策略
    ReadOnly,
    /// 同步写穿：先写后端，再刷新缓存镜像
    Through,
    /// 异步回写：先写缓存并标记为脏，由对账任务落盘
    Back { dirty_index_key: String },
}

/// 策略描述
///
/// 每个策略独占自己的缓存键，策略之间从不共享缓存状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySpec {
    /// 策略名称（用于日志和指标）
    pub name: String,
    /// 缓存镜像所在的键
    pub cache_key: String,
    /// 回填缓存时使用的过期时长，None表示永不过期
    pub population_ttl: Option<Duration>,
    /// 写入模式
    pub write_mode: WriteMode,
}

impl PolicySpec {
    pub fn cache_aside(name: impl Into<String>, cache_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache_key: cache_key.into(),
            population_ttl: None,
            write_mode: WriteMode::ReadOnly,
        }
    }

    pub fn write_through(name: impl Into<String>, cache_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache_key: cache_key.into(),
            population_ttl: None,
            write_mode: WriteMode::Through,
        }
    }

    pub fn write_back(
        name: impl Into<String>,
        cache_key: impl Into<String>,
        dirty_index_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cache_key: cache_key.into(),
            population_ttl: None,
            write_mode: WriteMode::Back {
                dirty_index_key: dirty_index_key.into(),
            },
        }
    }

    pub fn ttl(name: impl Into<String>, cache_key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            cache_key: cache_key.into(),
            population_ttl: Some(ttl),
            write_mode: WriteMode::ReadOnly,
        }
    }

    /// 从配置构建策略描述
    pub fn from_config(name: &str, config: &PolicyConfig) -> Self {
        match config {
            PolicyConfig::CacheAside { cache_key } => Self::cache_aside(name, cache_key.as_str()),
            PolicyConfig::WriteThrough { cache_key } => {
                Self::write_through(name, cache_key.as_str())
            }
            PolicyConfig::WriteBack {
                cache_key,
                dirty_index_key,
                ..
            } => Self::write_back(name, cache_key.as_str(), dirty_index_key.as_str()),
            PolicyConfig::Ttl {
                cache_key,
                ttl_secs,
            } => Self::ttl(name, cache_key.as_str(), Duration::from_secs(*ttl_secs)),
        }
    }

    /// 回写策略的脏索引键
    pub fn dirty_index_key(&self) -> Option<&str> {
        match &self.write_mode {
            WriteMode::Back { dirty_index_key } => Some(dirty_index_key),
            _ => None,
        }
    }
}

/// 读取结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadOutcome {
    pub records: Vec<Record>,
    /// 是否命中缓存
    pub hit: bool,
    /// 缓存不可用、直接读取后端
    pub degraded: bool,
}

impl ReadOutcome {
    /// 响应消息
    pub fn message(&self) -> &'static str {
        if self.hit {
            "Data from cache"
        } else {
            "Data from store"
        }
    }
}

/// 写入后缓存镜像的同步状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CacheSync {
    /// 缓存镜像已反映本次写入
    Refreshed,
    /// 写入已持久化，但缓存镜像未能刷新，直到下一次回填前都是旧数据
    Stale { reason: String },
}

/// 写入结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteOutcome {
    pub record: Record,
    pub cache: CacheSync,
}

/// 通用缓存层
///
/// 持有注入的缓存存储、后端存储网关和序列化器
pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
    gateway: Arc<dyn RecordGateway>,
    serializer: SerializerEnum,
    max_cas_attempts: usize,
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("serializer", &self.serializer)
            .field("max_cas_attempts", &self.max_cas_attempts)
            .finish()
    }
}

/// 解码后的缓存镜像：原始字节（用于比较并交换）和记录序列
struct Image {
    expected: Option<Vec<u8>>,
    records: Vec<Record>,
}

impl CacheLayer {
    pub fn new(
        store: Arc<dyn CacheStore>,
        gateway: Arc<dyn RecordGateway>,
        serializer: SerializerEnum,
    ) -> Self {
        Self {
            store,
            gateway,
            serializer,
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
        }
    }

    /// 设置比较并交换的最大尝试次数
    pub fn with_max_cas_attempts(mut self, attempts: usize) -> Self {
        self.max_cas_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn RecordGateway> {
        &self.gateway
    }

    pub fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }

    /// 读取并解码缓存值
    ///
    /// 不存在返回 `Ok(None)`；内容损坏返回 `Serialization` 错误
    pub(crate) async fn load<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<(Vec<u8>, T)>> {
        match self.store.get(key).await? {
            Some(bytes) => {
                let value = self.serializer.deserialize(&bytes)?;
                Ok(Some((bytes, value)))
            }
            None => Ok(None),
        }
    }

    /// 旁路读取骨架
    ///
    /// 1. 读缓存，命中则直接返回；
    /// 2. 未命中（或缓存损坏、不可用）时读取后端；
    /// 3. 尽力回填缓存，回填失败不影响本次返回。
    ///
    /// 回填只在键仍然缺失（或仍是同一份损坏内容）时写入，
    /// 避免用旧数据覆盖并发写入的新镜像。
    #[instrument(skip(self, spec), level = "debug", fields(policy = %spec.name, key = %redact_cache_key(&spec.cache_key)))]
    pub async fn read_through(&self, spec: &PolicySpec) -> Result<ReadOutcome> {
        let key = spec.cache_key.as_str();
        let mut degraded = false;
        let mut corrupt: Option<Vec<u8>> = None;

        match self.store.get(key).await {
            Ok(Some(bytes)) => match self.serializer.deserialize::<Vec<Record>>(&bytes) {
                Ok(records) => {
                    debug!("cache hit: {} records", records.len());
                    GLOBAL_METRICS.record_request(&spec.name, "read", "hit");
                    return Ok(ReadOutcome {
                        records,
                        hit: true,
                        degraded: false,
                    });
                }
                Err(e) => {
                    warn!("corrupt cache entry treated as miss: {}", e);
                    corrupt = Some(bytes);
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!("cache unavailable, reading backing store directly: {}", e);
                degraded = true;
            }
        }

        let fetched = if degraded {
            self.gateway.fetch_all().await
        } else {
            self.fetch_for(spec).await
        };
        let records = fetched.map_err(|e| {
            GLOBAL_METRICS.record_request(&spec.name, "read", "error");
            e
        })?;

        if degraded {
            GLOBAL_METRICS.record_request(&spec.name, "read", "degraded");
        } else {
            GLOBAL_METRICS.record_request(&spec.name, "read", "miss");
            self.populate(spec, corrupt.as_deref(), &records).await;
        }

        Ok(ReadOutcome {
            records,
            hit: false,
            degraded,
        })
    }

    async fn populate(&self, spec: &PolicySpec, expected: Option<&[u8]>, records: &[Record]) {
        let bytes = match self.serializer.serialize(&records) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to serialize cache image: {}", e);
                return;
            }
        };

        match self
            .store
            .compare_and_swap(&spec.cache_key, expected, Some(bytes), spec.population_ttl)
            .await
        {
            Ok(true) => debug!(
                "populated cache with {} records, ttl={:?}",
                records.len(),
                spec.population_ttl
            ),
            Ok(false) => debug!("cache entry changed concurrently, skip population"),
            Err(e) => warn!("failed to populate cache: {}", e),
        }
    }

    async fn load_image(&self, spec: &PolicySpec) -> Result<Image> {
        match self.store.get(&spec.cache_key).await? {
            Some(bytes) => match self.serializer.deserialize::<Vec<Record>>(&bytes) {
                Ok(records) => Ok(Image {
                    expected: Some(bytes),
                    records,
                }),
                Err(e) => {
                    warn!("corrupt cache entry, reseeding from backing store: {}", e);
                    Ok(Image {
                        expected: Some(bytes),
                        records: self.fetch_for(spec).await?,
                    })
                }
            },
            None => Ok(Image {
                expected: None,
                records: self.fetch_for(spec).await?,
            }),
        }
    }

    /// 从后端读取用于重建镜像的全部记录
    ///
    /// 回写策略会把脏索引中尚未落盘的字段覆盖上去，
    /// 镜像被淘汰或损坏后重建时读到的仍是最新写入。
    async fn fetch_for(&self, spec: &PolicySpec) -> Result<Vec<Record>> {
        let mut records = self.gateway.fetch_all().await?;
        if let Some(dirty_index_key) = spec.dirty_index_key() {
            match self.load::<DirtyIndex>(dirty_index_key).await {
                Ok(Some((_, index))) => {
                    let applied = index.overlay(&mut records);
                    if applied > 0 {
                        debug!("reseeded image with {} staged records", applied);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("dirty index unreadable, reseeding from backing store only: {}", e),
            }
        }
        Ok(records)
    }

    /// 以比较并交换的方式修改缓存镜像
    ///
    /// 镜像缺失或损坏时先从后端全量重建，再交给 `mutate` 修改。
    /// 并发修改导致交换失败时重新读取并重试，重试耗尽返回 `Contention`。
    /// 成功时返回 `mutate` 的结果以及写入的新镜像字节。
    pub(crate) async fn modify_image<T, F>(
        &self,
        spec: &PolicySpec,
        mut mutate: F,
    ) -> Result<(T, Vec<u8>)>
    where
        F: FnMut(&mut Vec<Record>) -> Result<T> + Send,
        T: Send,
    {
        for attempt in 1..=self.max_cas_attempts {
            let mut image = self.load_image(spec).await?;
            let out = mutate(&mut image.records)?;
            let bytes = self.serializer.serialize(&image.records)?;

            if self
                .store
                .compare_and_swap(
                    &spec.cache_key,
                    image.expected.as_deref(),
                    Some(bytes.clone()),
                    spec.population_ttl,
                )
                .await?
            {
                return Ok((out, bytes));
            }
            debug!("cache image changed concurrently, attempt {}", attempt);
            tokio::task::yield_now().await;
        }

        Err(CacheError::Contention(format!(
            "cache entry '{}' changed {} times in a row",
            redact_cache_key(&spec.cache_key),
            self.max_cas_attempts
        )))
    }

    /// 以比较并交换的方式修改任意可序列化的缓存值
    ///
    /// `mutate` 接收当前值（不存在为None，损坏为Err），返回新值，None表示删除
    pub(crate) async fn modify_value<V, F>(&self, key: &str, mut mutate: F) -> Result<()>
    where
        V: Serialize + serde::de::DeserializeOwned + Send,
        F: FnMut(Option<Result<V>>) -> Result<Option<V>> + Send,
    {
        for attempt in 1..=self.max_cas_attempts {
            let current = self.store.get(key).await?;
            let decoded = current
                .as_deref()
                .map(|bytes| self.serializer.deserialize::<V>(bytes));
            let new = match mutate(decoded)? {
                Some(value) => Some(self.serializer.serialize(&value)?),
                None => None,
            };

            if self
                .store
                .compare_and_swap(key, current.as_deref(), new, None)
                .await?
            {
                return Ok(());
            }
            debug!("value '{}' changed concurrently, attempt {}", key, attempt);
            tokio::task::yield_now().await;
        }

        Err(CacheError::Contention(format!(
            "cache entry '{}' changed {} times in a row",
            redact_cache_key(key),
            self.max_cas_attempts
        )))
    }
}
