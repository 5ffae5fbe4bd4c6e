//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 旁路缓存（懒加载）读取器。

use super::{CacheLayer, PolicySpec, ReadOutcome};
use crate::error::Result;
use std::sync::Arc;
use tracing::instrument;

/// 旁路缓存读取器
///
/// 未命中时从后端读取全部记录并永久缓存，之后的读取在没有失效的情况下都会命中
#[derive(Debug, Clone)]
pub struct CacheAsideReader {
    layer: Arc<CacheLayer>,
    spec: PolicySpec,
}

impl CacheAsideReader {
    pub fn new(layer: Arc<CacheLayer>, name: &str, cache_key: &str) -> Self {
        Self::from_spec(layer, PolicySpec::cache_aside(name, cache_key))
    }

    pub fn from_spec(layer: Arc<CacheLayer>, spec: PolicySpec) -> Self {
        Self { layer, spec }
    }

    pub fn spec(&self) -> &PolicySpec {
        &self.spec
    }

    /// 读取全部记录
    #[instrument(skip(self), level = "info", fields(policy = %self.spec.name))]
    pub async fn read_all(&self) -> Result<ReadOutcome> {
        self.layer.read_through(&self.spec).await
    }

    /// 失效缓存镜像，下一次读取将重新加载
    pub async fn invalidate(&self) -> Result<()> {
        self.layer.store().delete(&self.spec.cache_key).await
    }
}
