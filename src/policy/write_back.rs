//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 异步回写协调器和对账逻辑。
//!
//! 写入顺序：先以比较并交换写入缓存镜像，再把字段暂存进脏索引并递增修订号。
//! 对账只读取脏索引快照，按其中的字段逐条落盘，之后只移除修订号未变化的条目。
//! 缓存镜像只负责可见性，被淘汰或重建不会丢失任何暂存的更新。

use super::{CacheLayer, PolicySpec, ReadOutcome};
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::model::{position_of, DirtyIndex, Record, UserFields};
use crate::serialization::Serializer;
use crate::utils::redaction::redact_cache_key;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 单轮对账的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// 成功落盘的标识符
    pub flushed: Vec<i64>,
    /// 落盘失败、保留到下一轮的标识符
    pub failed: Vec<i64>,
    /// 后端中已不存在而被丢弃的标识符
    pub orphaned: Vec<i64>,
    /// 本轮结束后脏索引中剩余的条目数
    pub remaining: usize,
    /// 本轮被跳过的原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    /// 已有一轮对账在进行，本次未执行
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub busy: bool,
}

impl ReconcileReport {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn busy() -> Self {
        Self {
            busy: true,
            ..Default::default()
        }
    }

    /// 本轮是否没有做任何事
    pub fn is_noop(&self) -> bool {
        self.flushed.is_empty() && self.failed.is_empty() && self.orphaned.is_empty()
    }
}

/// 回写协调器
///
/// 更新立即对同一键上的读取可见，持久化推迟到下一次 [`reconcile`](Self::reconcile)。
#[derive(Debug, Clone)]
pub struct WriteBackCoordinator {
    layer: Arc<CacheLayer>,
    spec: PolicySpec,
    dirty_index_key: String,
}

impl WriteBackCoordinator {
    pub fn new(layer: Arc<CacheLayer>, name: &str, cache_key: &str, dirty_index_key: &str) -> Self {
        Self {
            layer,
            spec: PolicySpec::write_back(name, cache_key, dirty_index_key),
            dirty_index_key: dirty_index_key.to_string(),
        }
    }

    /// 从策略描述构建，描述必须是回写模式
    pub fn from_spec(layer: Arc<CacheLayer>, spec: PolicySpec) -> Result<Self> {
        let dirty_index_key = spec
            .dirty_index_key()
            .ok_or_else(|| {
                CacheError::ConfigError(format!("policy '{}' is not a write-back policy", spec.name))
            })?
            .to_string();
        Ok(Self {
            layer,
            spec,
            dirty_index_key,
        })
    }

    pub fn spec(&self) -> &PolicySpec {
        &self.spec
    }

    pub fn dirty_index_key(&self) -> &str {
        &self.dirty_index_key
    }

    /// 读取全部记录
    #[instrument(skip(self), level = "info", fields(policy = %self.spec.name))]
    pub async fn read_all(&self) -> Result<ReadOutcome> {
        self.layer.read_through(&self.spec).await
    }

    /// 当前暂存（尚未落盘）的脏索引
    pub async fn pending(&self) -> Result<DirtyIndex> {
        Ok(self
            .layer
            .load::<DirtyIndex>(&self.dirty_index_key)
            .await?
            .map(|(_, index)| index)
            .unwrap_or_default())
    }

    /// 更新记录
    ///
    /// 整体替换该记录的字段。镜像缺失时先从后端重建；
    /// 标识符不在镜像中时返回 `RecordNotFound`。
    /// 标记脏索引失败时撤销镜像修改并返回错误，不会留下无人落盘的更新。
    #[instrument(skip(self, fields), level = "info", fields(policy = %self.spec.name))]
    pub async fn update(&self, id: i64, fields: UserFields) -> Result<Record> {
        let updated = Record::new(id, fields);
        let replacement = updated.fields.clone();

        let result = self
            .layer
            .modify_image(&self.spec, move |records| {
                let pos = position_of(records, id).ok_or(CacheError::RecordNotFound(id))?;
                Ok(std::mem::replace(&mut records[pos].fields, replacement.clone()))
            })
            .await;
        let (previous, image) = match result {
            Ok(out) => out,
            Err(e) => {
                GLOBAL_METRICS.record_request(&self.spec.name, "update", "error");
                return Err(e);
            }
        };

        if let Err(e) = self.mark_dirty(&updated, &image).await {
            warn!("Failed to stage record id={} for write-back: {}", id, e);
            self.revert(id, &updated.fields, previous).await;
            GLOBAL_METRICS.record_request(&self.spec.name, "update", "error");
            return Err(e);
        }

        debug!("Staged record id={} for write-back", id);
        GLOBAL_METRICS.record_request(&self.spec.name, "update", "ok");
        Ok(updated)
    }

    async fn mark_dirty(&self, updated: &Record, image: &[u8]) -> Result<()> {
        let mut size = 0;
        self.layer
            .modify_value::<DirtyIndex, _>(&self.dirty_index_key, |current| {
                let mut index = match current {
                    None => DirtyIndex::new(),
                    Some(Ok(index)) => index,
                    Some(Err(e)) => self.rebuild_index(image, e)?,
                };
                index.stage(updated.id, updated.fields.clone());
                size = index.len();
                Ok(Some(index))
            })
            .await?;
        GLOBAL_METRICS.set_dirty_index_size(&self.spec.name, size);
        Ok(())
    }

    /// 脏索引损坏时无法得知哪些条目尚未落盘，以镜像中的全部记录重新暂存
    fn rebuild_index(&self, image: &[u8], cause: CacheError) -> Result<DirtyIndex> {
        let records: Vec<Record> = self.layer.serializer().deserialize(image)?;
        warn!(
            "Corrupt dirty index '{}', staging all {} records: {}",
            redact_cache_key(&self.dirty_index_key),
            records.len(),
            cause
        );
        let mut index = DirtyIndex::new();
        for record in records {
            index.stage(record.id, record.fields);
        }
        Ok(index)
    }

    /// 撤销尚未暂存成功的镜像修改
    ///
    /// 只有镜像中该记录仍是本次写入的值时才恢复，不覆盖其他写入者
    async fn revert(&self, id: i64, written: &UserFields, previous: UserFields) {
        let result = self
            .layer
            .modify_image(&self.spec, |records| {
                if let Some(pos) = position_of(records, id) {
                    if &records[pos].fields == written {
                        records[pos].fields = previous.clone();
                    }
                }
                Ok(())
            })
            .await;
        if let Err(e) = result {
            warn!("Failed to revert cache image for id={}: {}", id, e);
        }
    }

    /// 执行一轮对账
    ///
    /// 按脏索引快照中暂存的字段落盘，不读取缓存镜像。
    /// 脏索引损坏或不可用时跳过本轮（记录日志，不是错误），下一次定时触发时重试。
    /// 单条记录落盘失败不影响其余记录。
    #[instrument(skip(self), level = "info", fields(policy = %self.spec.name))]
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let snapshot = match self.layer.load::<DirtyIndex>(&self.dirty_index_key).await {
            Ok(Some((_, index))) => index,
            Ok(None) => {
                GLOBAL_METRICS.set_dirty_index_size(&self.spec.name, 0);
                return Ok(ReconcileReport::default());
            }
            Err(e) => return Ok(self.skip(format!("dirty index unreadable: {}", e))),
        };

        let mut report = ReconcileReport::default();
        for (id, staged) in snapshot.iter() {
            match self
                .layer
                .gateway()
                .update_by_key(id, staged.fields.clone())
                .await
            {
                Ok(()) => report.flushed.push(id),
                Err(CacheError::RecordNotFound(_)) => {
                    warn!("Dropping staged id={} absent from backing store", id);
                    report.orphaned.push(id);
                }
                Err(e) => {
                    warn!("Failed to flush id={}, retained for next pass: {}", id, e);
                    report.failed.push(id);
                }
            }
        }

        let settled: Vec<(i64, u64)> = snapshot
            .iter()
            .filter(|(id, _)| report.flushed.contains(id) || report.orphaned.contains(id))
            .map(|(id, staged)| (id, staged.revision))
            .collect();
        let mut remaining = 0;
        self.layer
            .modify_value::<DirtyIndex, _>(&self.dirty_index_key, |current| {
                let mut index = match current {
                    None => {
                        remaining = 0;
                        return Ok(None);
                    }
                    Some(Ok(index)) => index,
                    Some(Err(e)) => return Err(e),
                };
                for (id, revision) in &settled {
                    index.clear_if_unchanged(*id, *revision);
                }
                remaining = index.len();
                // 清空后删除整个键
                Ok(if index.is_empty() { None } else { Some(index) })
            })
            .await?;
        report.remaining = remaining;

        GLOBAL_METRICS.record_reconcile(&self.spec.name, "flushed", report.flushed.len() as u64);
        GLOBAL_METRICS.record_reconcile(&self.spec.name, "failed", report.failed.len() as u64);
        GLOBAL_METRICS.record_reconcile(&self.spec.name, "orphaned", report.orphaned.len() as u64);
        GLOBAL_METRICS.set_dirty_index_size(&self.spec.name, remaining);

        if !report.is_noop() {
            info!(
                "Reconciled: flushed={}, failed={}, orphaned={}, remaining={}",
                report.flushed.len(),
                report.failed.len(),
                report.orphaned.len(),
                remaining
            );
        }
        Ok(report)
    }

    fn skip(&self, reason: String) -> ReconcileReport {
        warn!("Skipping reconcile pass: {}", reason);
        GLOBAL_METRICS.record_reconcile(&self.spec.name, "skipped", 1);
        ReconcileReport::skipped(reason)
    }
}
