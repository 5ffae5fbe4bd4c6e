//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了状态查询命令的实现。

use super::{Response, StatusArgs};
use crate::manager::PolicyManager;
use crate::metrics::get_metrics_string;
use anyhow::Result;

pub async fn execute(manager: &PolicyManager, args: &StatusArgs) -> Result<()> {
    let status = manager.status().await;
    let message = if status.cache_available && status.store_available {
        "Healthy"
    } else {
        "Degraded"
    };
    Response::new(message, status).print()?;

    if args.prometheus {
        print!("{}", get_metrics_string());
    }
    Ok(())
}
