//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了策略管理器，负责连接存储、构建策略和管理后台对账任务。

use crate::backend::{self, CacheStore};
use crate::config::{Config, PolicyConfig};
use crate::error::{CacheError, Result};
use crate::gateway::{RecordGateway, SeaOrmGateway};
use crate::model::{Record, UserFields};
use crate::policy::{
    CacheAsideReader, CacheLayer, PolicySpec, ReadOutcome, ReconcileReport, TtlReader,
    WriteBackCoordinator, WriteOutcome, WriteThroughCoordinator,
};
use crate::serialization::SerializerEnum;
use crate::sync::Reconciler;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// 已构建的策略
#[derive(Debug, Clone)]
pub enum PolicyHandle {
    CacheAside(CacheAsideReader),
    WriteThrough(WriteThroughCoordinator),
    WriteBack(Reconciler),
    Ttl(TtlReader),
}

impl PolicyHandle {
    fn build(layer: &Arc<CacheLayer>, name: &str, config: &PolicyConfig) -> Result<Self> {
        let spec = PolicySpec::from_config(name, config);
        Ok(match config {
            PolicyConfig::CacheAside { .. } => {
                PolicyHandle::CacheAside(CacheAsideReader::from_spec(layer.clone(), spec))
            }
            PolicyConfig::WriteThrough { .. } => {
                PolicyHandle::WriteThrough(WriteThroughCoordinator::from_spec(layer.clone(), spec))
            }
            PolicyConfig::WriteBack { .. } => PolicyHandle::WriteBack(Reconciler::new(
                WriteBackCoordinator::from_spec(layer.clone(), spec)?,
            )),
            PolicyConfig::Ttl { .. } => {
                PolicyHandle::Ttl(TtlReader::from_spec(layer.clone(), spec))
            }
        })
    }

    pub fn spec(&self) -> &PolicySpec {
        match self {
            PolicyHandle::CacheAside(p) => p.spec(),
            PolicyHandle::WriteThrough(p) => p.spec(),
            PolicyHandle::WriteBack(p) => p.coordinator().spec(),
            PolicyHandle::Ttl(p) => p.spec(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PolicyHandle::CacheAside(_) => "cache_aside",
            PolicyHandle::WriteThrough(_) => "write_through",
            PolicyHandle::WriteBack(_) => "write_back",
            PolicyHandle::Ttl(_) => "ttl",
        }
    }

    /// 读取全部记录
    pub async fn read_all(&self) -> Result<ReadOutcome> {
        match self {
            PolicyHandle::CacheAside(p) => p.read_all().await,
            PolicyHandle::WriteThrough(p) => p.read_all().await,
            PolicyHandle::WriteBack(p) => p.coordinator().read_all().await,
            PolicyHandle::Ttl(p) => p.read_all().await,
        }
    }
}

/// 单个策略的状态
#[derive(Debug, Clone, Serialize)]
pub struct PolicyStatus {
    pub name: String,
    pub kind: &'static str,
    pub cache_key: String,
    /// 缓存镜像是否存在，缓存不可用时为None
    pub cached: Option<bool>,
    /// 回写策略尚未落盘的记录数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<usize>,
}

/// 整体状态
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub service_name: String,
    pub checked_at: DateTime<Utc>,
    pub cache_available: bool,
    pub store_available: bool,
    pub policies: Vec<PolicyStatus>,
}

/// 策略管理器
///
/// 持有注入的缓存存储和后端存储网关，不使用任何全局连接
pub struct PolicyManager {
    config: Config,
    layer: Arc<CacheLayer>,
    policies: BTreeMap<String, PolicyHandle>,
    token: CancellationToken,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl std::fmt::Debug for PolicyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyManager")
            .field("service_name", &self.config.global.service_name)
            .field("policies", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PolicyManager {
    /// 根据配置连接后端存储和缓存存储，构建所有策略并启动对账任务
    #[instrument(skip(config), level = "info", fields(policy_count = config.policies.len()))]
    pub async fn init(config: Config) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;

        let gateway: Arc<dyn RecordGateway> = Arc::new(SeaOrmGateway::connect(&config.database).await?);
        let store = match backend::connect(&config.cache).await {
            Ok(store) => store,
            Err(e) => {
                let _ = gateway.close().await;
                return Err(e);
            }
        };

        let manager = Self::with_components(config, store, gateway)?;
        manager.start_reconcilers().await;
        Ok(manager)
    }

    /// 使用外部提供的存储构建管理器（不启动对账任务）
    pub fn with_components(
        config: Config,
        store: Arc<dyn CacheStore>,
        gateway: Arc<dyn RecordGateway>,
    ) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;

        let layer = Arc::new(CacheLayer::new(
            store,
            gateway,
            SerializerEnum::from_config(&config.global),
        ));

        let mut policies = BTreeMap::new();
        for (name, policy_config) in &config.policies {
            let handle = PolicyHandle::build(&layer, name, policy_config)?;
            info!(
                "Configured policy '{}' ({}) on key '{}'",
                name,
                handle.kind(),
                policy_config.cache_key()
            );
            policies.insert(name.clone(), handle);
        }

        Ok(Self {
            config,
            layer,
            policies,
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// 为每个回写策略启动定时对账任务，重复调用不会重复启动
    pub async fn start_reconcilers(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() || self.token.is_cancelled() {
            return;
        }
        for (name, handle) in &self.policies {
            let PolicyHandle::WriteBack(reconciler) = handle else {
                continue;
            };
            let Some(period) = self
                .config
                .policies
                .get(name)
                .and_then(PolicyConfig::reconcile_interval)
            else {
                continue;
            };
            match reconciler.spawn(period, self.token.child_token()) {
                Ok(task) => tasks.push((name.clone(), task)),
                Err(e) => warn!("Reconciler for policy {} not started: {}", name, e),
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layer(&self) -> &Arc<CacheLayer> {
        &self.layer
    }

    pub fn policies(&self) -> impl Iterator<Item = (&String, &PolicyHandle)> {
        self.policies.iter()
    }

    /// 按名称获取策略
    pub fn policy(&self, name: &str) -> Result<&PolicyHandle> {
        self.policies
            .get(name)
            .ok_or_else(|| CacheError::ConfigError(format!("Policy '{}' not found", name)))
    }

    pub fn write_through(&self, name: &str) -> Result<&WriteThroughCoordinator> {
        match self.policy(name)? {
            PolicyHandle::WriteThrough(p) => Ok(p),
            other => Err(self.wrong_kind(name, other, "create")),
        }
    }

    pub fn write_back(&self, name: &str) -> Result<&Reconciler> {
        match self.policy(name)? {
            PolicyHandle::WriteBack(p) => Ok(p),
            other => Err(self.wrong_kind(name, other, "update")),
        }
    }

    fn wrong_kind(&self, name: &str, handle: &PolicyHandle, op: &str) -> CacheError {
        CacheError::NotSupported(format!(
            "Policy '{}' ({}) does not support {}",
            name,
            handle.kind(),
            op
        ))
    }

    /// 通过指定策略读取全部记录
    pub async fn read(&self, name: &str) -> Result<ReadOutcome> {
        self.policy(name)?.read_all().await
    }

    /// 通过写穿策略创建记录
    pub async fn create(&self, name: &str, fields: UserFields) -> Result<WriteOutcome> {
        self.write_through(name)?.create(fields).await
    }

    /// 通过回写策略更新记录
    pub async fn update(&self, name: &str, id: i64, fields: UserFields) -> Result<Record> {
        self.write_back(name)?.coordinator().update(id, fields).await
    }

    /// 立即执行一轮对账
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileReport> {
        self.write_back(name)?.run_once().await
    }

    /// 汇总缓存、后端和各策略的状态
    pub async fn status(&self) -> ManagerStatus {
        let cache_available = self.layer.store().ping().await.is_ok();
        let store_available = self.layer.gateway().ping().await.is_ok();

        let mut policies = Vec::with_capacity(self.policies.len());
        for (name, handle) in &self.policies {
            let spec = handle.spec();
            let cached = self
                .layer
                .store()
                .get(&spec.cache_key)
                .await
                .ok()
                .map(|v| v.is_some());
            let pending = match handle {
                PolicyHandle::WriteBack(r) => r.coordinator().pending().await.ok().map(|i| i.len()),
                _ => None,
            };
            policies.push(PolicyStatus {
                name: name.clone(),
                kind: handle.kind(),
                cache_key: spec.cache_key.clone(),
                cached,
                pending,
            });
        }

        ManagerStatus {
            service_name: self.config.global.service_name.clone(),
            checked_at: Utc::now(),
            cache_available,
            store_available,
            policies,
        }
    }

    /// 优雅关闭
    ///
    /// 停止所有对账任务，对每个回写策略执行最后一轮对账，
    /// 然后关闭缓存存储和后端存储。
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down policy manager...");
        self.token.cancel();

        let mut errors = Vec::new();
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                warn!("Reconciler task for '{}' ended abnormally: {}", name, e);
                errors.push(format!("{}: {}", name, e));
            }
        }

        for (name, handle) in &self.policies {
            let PolicyHandle::WriteBack(reconciler) = handle else {
                continue;
            };
            match reconciler.run_once().await {
                Ok(report) if report.remaining > 0 || report.skipped.is_some() => warn!(
                    "Policy '{}' still has unflushed records after final pass: {:?}",
                    name, report
                ),
                Ok(_) => info!("Policy '{}' flushed", name),
                Err(e) => {
                    warn!("Final reconcile for '{}' failed: {}", name, e);
                    errors.push(format!("{}: {}", name, e));
                }
            }
        }

        if let Err(e) = self.layer.store().shutdown().await {
            errors.push(format!("cache store: {}", e));
        }
        if let Err(e) = self.layer.gateway().close().await {
            errors.push(format!("backing store: {}", e));
        }

        if errors.is_empty() {
            info!("Policy manager shut down");
            Ok(())
        } else {
            Err(CacheError::ShutdownError(errors.join(", ")))
        }
    }
}
