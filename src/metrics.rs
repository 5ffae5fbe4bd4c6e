//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了策略层的指标收集功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{span, Level};

/// 指标收集器
///
/// 用于收集各策略的命中、写入和对账统计
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "policy:op:result"
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 对账统计
    /// key: "policy:outcome"（flushed/failed/orphaned/skipped）
    pub reconcile_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 当前脏索引大小
    pub dirty_index_size: Arc<Mutex<HashMap<String, usize>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `policy` - 策略名称
    /// * `op` - 操作类型（read/create/update）
    /// * `result` - 操作结果（hit/miss/degraded/ok/stale/error）
    pub fn record_request(&self, policy: &str, op: &str, result: &str) {
        let span = span!(Level::TRACE, "policy_request", policy, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}", policy, op, result);
        if let Ok(mut map) = self.requests_total.lock() {
            *map.entry(key).or_insert(0) += 1;
        }
    }

    /// 记录对账结果
    pub fn record_reconcile(&self, policy: &str, outcome: &str, count: u64) {
        if count == 0 {
            return;
        }
        let key = format!("{}:{}", policy, outcome);
        if let Ok(mut map) = self.reconcile_total.lock() {
            *map.entry(key).or_insert(0) += count;
        }
    }

    /// 设置脏索引大小
    pub fn set_dirty_index_size(&self, policy: &str, size: usize) {
        if let Ok(mut map) = self.dirty_index_size.lock() {
            map.insert(policy.to_string(), size);
        }
    }

    /// 读取某个请求计数
    pub fn request_count(&self, policy: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}", policy, op, result);
        self.requests_total
            .lock()
            .map(|map| map.get(&key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// 读取某个对账计数
    pub fn reconcile_count(&self, policy: &str, outcome: &str) -> u64 {
        let key = format!("{}:{}", policy, outcome);
        self.reconcile_total
            .lock()
            .map(|map| map.get(&key).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为Prometheus文本格式
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut output = String::new();

    if let Ok(reqs) = metrics.requests_total.lock() {
        for (k, v) in reqs.iter() {
            let parts: Vec<&str> = k.split(':').collect();
            if parts.len() == 3 {
                output.push_str(&format!(
                    "policy_requests_total{{policy=\"{}\", op=\"{}\", result=\"{}\"}} {}\n",
                    parts[0], parts[1], parts[2], v
                ));
            }
        }
    }
    if let Ok(reconciled) = metrics.reconcile_total.lock() {
        for (k, v) in reconciled.iter() {
            if let Some((policy, outcome)) = k.split_once(':') {
                output.push_str(&format!(
                    "policy_reconcile_total{{policy=\"{}\", outcome=\"{}\"}} {}\n",
                    policy, outcome, v
                ));
            }
        }
    }
    if let Ok(dirty) = metrics.dirty_index_size.lock() {
        for (k, v) in dirty.iter() {
            output.push_str(&format!(
                "policy_dirty_index_size{{policy=\"{}\"}} {}\n",
                k, v
            ));
        }
    }
    output
}
