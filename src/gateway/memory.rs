//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 进程内后端存储网关，用于演示和测试。

use super::RecordGateway;
use crate::error::{CacheError, Result};
use crate::model::{Record, UserFields};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, UserFields>,
}

/// 进程内记录表
///
/// 标识符从1开始顺序分配。可通过 `set_available(false)` 模拟存储故障。
#[derive(Debug)]
pub struct MemoryGateway {
    table: Mutex<Table>,
    available: AtomicBool,
    updates: AtomicU64,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                next_id: 1,
                rows: BTreeMap::new(),
            }),
            available: AtomicBool::new(true),
            updates: AtomicU64::new(0),
        }
    }

    /// 以给定字段预置记录
    pub async fn seeded(rows: impl IntoIterator<Item = UserFields>) -> Self {
        let gateway = Self::new();
        {
            let mut table = gateway.table.lock().await;
            for fields in rows {
                let id = table.next_id;
                table.next_id += 1;
                table.rows.insert(id, fields);
            }
        }
        gateway
    }

    /// 切换可用状态
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 成功执行的 update_by_key 次数
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    /// 直接读取单条记录，绕过缓存
    pub async fn get(&self, id: i64) -> Option<Record> {
        let table = self.table.lock().await;
        table
            .rows
            .get(&id)
            .map(|fields| Record::new(id, fields.clone()))
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::StoreUnavailable(
                "in-memory store is offline".to_string(),
            ))
        }
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordGateway for MemoryGateway {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        self.check_available()?;
        let table = self.table.lock().await;
        Ok(table
            .rows
            .iter()
            .map(|(id, fields)| Record::new(*id, fields.clone()))
            .collect())
    }

    async fn insert(&self, fields: UserFields) -> Result<Record> {
        self.check_available()?;
        let mut table = self.table.lock().await;
        let id = table.next_id;
        table.next_id += 1;
        table.rows.insert(id, fields.clone());
        debug!("memory gateway insert: id={}", id);
        Ok(Record::new(id, fields))
    }

    async fn update_by_key(&self, id: i64, fields: UserFields) -> Result<()> {
        self.check_available()?;
        let mut table = self.table.lock().await;
        match table.rows.get_mut(&id) {
            Some(row) => {
                *row = fields;
                self.updates.fetch_add(1, Ordering::SeqCst);
                debug!("memory gateway update: id={}", id);
                Ok(())
            }
            None => Err(CacheError::RecordNotFound(id)),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
