//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存策略层的错误类型和处理机制。

use thiserror::Error;

/// 缓存策略层错误类型枚举
///
/// 区分后端存储、缓存存储、记录缺失和数据损坏等情况，
/// 各策略据此决定是降级、上报还是跳过
#[derive(Error, Debug)]
pub enum CacheError {
    /// 后端存储不可用（连接失败、执行出错或超时）
    #[error("Backing store unavailable: {0}")]
    StoreUnavailable(String),

    /// 缓存存储不可用（连接失败、执行出错或超时）
    #[error("Cache store unavailable: {0}")]
    CacheUnavailable(String),

    /// 目标记录不存在
    #[error("Record not found: id={0}")]
    RecordNotFound(i64),

    /// 序列化/反序列化错误（缓存内容损坏）
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 比较并交换重试次数耗尽
    #[error("Cache entry contention: {0}")]
    Contention(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 操作不支持
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl CacheError {
    /// 是否为缓存存储故障
    pub fn is_cache_unavailable(&self) -> bool {
        matches!(self, CacheError::CacheUnavailable(_))
    }

    /// 是否为后端存储故障
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, CacheError::StoreUnavailable(_))
    }

    /// 是否为缓存内容损坏
    pub fn is_serialization(&self) -> bool {
        matches!(self, CacheError::Serialization(_))
    }
}

impl From<sea_orm::DbErr> for CacheError {
    fn from(e: sea_orm::DbErr) -> Self {
        CacheError::StoreUnavailable(e.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::CacheUnavailable(e.to_string())
    }
}

/// 缓存策略操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
