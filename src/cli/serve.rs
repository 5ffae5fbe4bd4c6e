//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了常驻服务命令的实现。

use crate::manager::PolicyManager;
use anyhow::{Context, Result};
use tracing::info;

pub async fn execute(manager: &PolicyManager) -> Result<()> {
    let names: Vec<_> = manager.policies().map(|(name, _)| name.as_str()).collect();
    info!("Serving policies: {}", names.join(", "));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, stopping");
    Ok(())
}
