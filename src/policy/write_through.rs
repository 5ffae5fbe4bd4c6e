//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 同步写穿协调器。

use super::{CacheLayer, CacheSync, PolicySpec, ReadOutcome, WriteOutcome};
use crate::error::Result;
use crate::metrics::GLOBAL_METRICS;
use crate::model::{position_of, UserFields};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 写穿协调器
///
/// 先写后端，再立即把新记录并入缓存镜像：镜像存在时追加，
/// 缺失时从后端全量重建。创建返回后，同一键上的读取必然命中且包含新记录。
#[derive(Debug, Clone)]
pub struct WriteThroughCoordinator {
    layer: Arc<CacheLayer>,
    spec: PolicySpec,
}

impl WriteThroughCoordinator {
    pub fn new(layer: Arc<CacheLayer>, name: &str, cache_key: &str) -> Self {
        Self::from_spec(layer, PolicySpec::write_through(name, cache_key))
    }

    pub fn from_spec(layer: Arc<CacheLayer>, spec: PolicySpec) -> Self {
        Self { layer, spec }
    }

    pub fn spec(&self) -> &PolicySpec {
        &self.spec
    }

    /// 创建记录
    ///
    /// 后端写入失败直接返回错误；后端写入成功而缓存刷新失败时，
    /// 返回的 [`CacheSync::Stale`] 会说明原因，写入本身仍然有效。
    #[instrument(skip(self, fields), level = "info", fields(policy = %self.spec.name))]
    pub async fn create(&self, fields: UserFields) -> Result<WriteOutcome> {
        let record = self.layer.gateway().insert(fields).await.map_err(|e| {
            GLOBAL_METRICS.record_request(&self.spec.name, "create", "error");
            e
        })?;
        info!("Inserted record id={}", record.id);

        let inserted = record.clone();
        let refreshed = self
            .layer
            .modify_image(&self.spec, move |records| {
                // 全量重建的镜像已经包含新记录
                if position_of(records, inserted.id).is_none() {
                    records.push(inserted.clone());
                }
                Ok(())
            })
            .await;

        let cache = match refreshed {
            Ok(_) => {
                GLOBAL_METRICS.record_request(&self.spec.name, "create", "ok");
                CacheSync::Refreshed
            }
            Err(e) => {
                warn!(
                    "Record id={} is durable but the cache image is stale: {}",
                    record.id, e
                );
                GLOBAL_METRICS.record_request(&self.spec.name, "create", "stale");
                CacheSync::Stale {
                    reason: e.to_string(),
                }
            }
        };

        Ok(WriteOutcome { record, cache })
    }

    /// 读取全部记录（不带过期时间回填）
    #[instrument(skip(self), level = "info", fields(policy = %self.spec.name))]
    pub async fn read_all(&self) -> Result<ReadOutcome> {
        self.layer.read_through(&self.spec).await
    }
}
