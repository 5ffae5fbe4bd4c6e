//! oxpolicy - 缓存一致性策略库
//!
//! 在客户端、缓存存储（Moka或Redis）和权威后端存储（SQL）之间实现四种策略：
//! 旁路缓存、同步写穿、异步回写（周期对账）和带过期时间的缓存。
//! 每个策略独占自己的缓存键命名空间。

#![doc(html_root_url = "https://docs.rs/oxpolicy/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod manager;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod serialization;
pub mod sync;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use backend::{CacheStore, MemoryStore, RedisStore};
pub use config::Config;
pub use error::{CacheError, Result};
pub use gateway::{MemoryGateway, RecordGateway, SeaOrmGateway};
pub use manager::{PolicyHandle, PolicyManager};
pub use model::{DirtyIndex, Record, StagedUpdate, UserFields};
pub use policy::{
    CacheAsideReader, CacheLayer, CacheSync, PolicySpec, ReadOutcome, ReconcileReport, TtlReader,
    WriteBackCoordinator, WriteOutcome, WriteThroughCoordinator,
};
pub use sync::Reconciler;

/// oxpolicy 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
