//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 带过期时间的缓存读取器。

use super::{CacheLayer, PolicySpec, ReadOutcome};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// TTL缓存读取器
///
/// 与旁路缓存相同，但回填时总是带上固定的过期时长。
/// 过期后的第一次读取必然未命中并重新回填。
#[derive(Debug, Clone)]
pub struct TtlReader {
    layer: Arc<CacheLayer>,
    spec: PolicySpec,
}

impl TtlReader {
    pub fn new(layer: Arc<CacheLayer>, name: &str, cache_key: &str, ttl: Duration) -> Self {
        Self::from_spec(layer, PolicySpec::ttl(name, cache_key, ttl))
    }

    pub fn from_spec(layer: Arc<CacheLayer>, spec: PolicySpec) -> Self {
        Self { layer, spec }
    }

    pub fn spec(&self) -> &PolicySpec {
        &self.spec
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.spec.population_ttl
    }

    /// 读取全部记录
    #[instrument(skip(self), level = "info", fields(policy = %self.spec.name, ttl = ?self.spec.population_ttl))]
    pub async fn read_all(&self) -> Result<ReadOutcome> {
        self.layer.read_through(&self.spec).await
    }
}
