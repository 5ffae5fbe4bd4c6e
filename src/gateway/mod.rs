//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了后端存储网关接口及其实现。

pub mod memory;
pub mod sql;

use crate::error::Result;
use crate::model::{Record, UserFields};
use async_trait::async_trait;

pub use self::memory::MemoryGateway;
pub use self::sql::SeaOrmGateway;

/// 后端存储网关特征
///
/// 对权威存储执行读写。每个调用在存储端各自原子，调用之间没有事务；
/// 网关内部不做重试，失败以 `StoreUnavailable` 返回给调用方。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordGateway: Send + Sync {
    /// 读取全部记录（按标识符升序）
    async fn fetch_all(&self) -> Result<Vec<Record>>;

    /// 插入记录，返回带有新分配标识符的记录
    async fn insert(&self, fields: UserFields) -> Result<Record>;

    /// 按标识符整体覆盖记录字段
    ///
    /// 标识符不存在时返回 `RecordNotFound`
    async fn update_by_key(&self, id: i64, fields: UserFields) -> Result<()>;

    /// 检查存储是否可用
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// 关闭连接
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
