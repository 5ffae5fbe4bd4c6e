//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了回写策略的定时对账任务。

use crate::error::{CacheError, Result};
use crate::policy::{ReconcileReport, WriteBackCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 对账器
///
/// 同一时刻最多只有一轮对账在进行：定时触发的一轮在上一轮结束前不会开始，
/// 手动触发遇到正在进行的一轮时立即返回 `busy`。
#[derive(Debug, Clone)]
pub struct Reconciler {
    coordinator: WriteBackCoordinator,
    in_flight: Arc<Mutex<()>>,
}

impl Reconciler {
    pub fn new(coordinator: WriteBackCoordinator) -> Self {
        Self {
            coordinator,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn coordinator(&self) -> &WriteBackCoordinator {
        &self.coordinator
    }

    /// 执行一轮对账
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!(
                "Reconcile pass already running for policy {}",
                self.coordinator.spec().name
            );
            return Ok(ReconcileReport::busy());
        };
        self.coordinator.reconcile().await
    }

    /// 启动定时对账任务
    ///
    /// 第一轮在一个周期之后执行；错过的触发直接跳过，不会补跑。
    /// 取消 `token` 后任务在当前一轮结束时退出。周期为零时返回 `ConfigError`。
    pub fn spawn(&self, period: Duration, token: CancellationToken) -> Result<JoinHandle<()>> {
        if period.is_zero() {
            return Err(CacheError::ConfigError(format!(
                "reconcile interval for policy '{}' must be greater than zero",
                self.coordinator.spec().name
            )));
        }
        let reconciler = self.clone();
        Ok(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                "Reconciler started for policy {} every {:?}",
                reconciler.coordinator.spec().name,
                period
            );
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = reconciler.run_once().await {
                            warn!(
                                "Reconcile pass failed for policy {}: {}",
                                reconciler.coordinator.spec().name,
                                e
                            );
                        }
                    }
                }
            }
            info!(
                "Reconciler stopped for policy {}",
                reconciler.coordinator.spec().name
            );
        }))
    }
}
