//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了记录读写与对账命令的实现。

use super::{CreateArgs, ReadArgs, Response, UpdateArgs};
use crate::manager::PolicyManager;
use crate::policy::CacheSync;
use anyhow::Result;
use tracing::warn;

pub async fn read(manager: &PolicyManager, args: &ReadArgs) -> Result<()> {
    let outcome = manager.read(&args.policy).await?;
    if outcome.degraded {
        warn!("Cache unavailable, data served from the backing store");
    }
    Response::new(outcome.message(), outcome.records).print()
}

pub async fn create(manager: &PolicyManager, args: CreateArgs) -> Result<()> {
    let outcome = manager.create(&args.policy, args.fields.into()).await?;
    if let CacheSync::Stale { reason } = &outcome.cache {
        warn!("Record is durable but the cache is stale: {}", reason);
    }
    Response::new("Data inserted", outcome).print()
}

pub async fn update(manager: &PolicyManager, args: UpdateArgs) -> Result<()> {
    let record = manager
        .update(&args.policy, args.id, args.fields.into())
        .await?;
    Response::new("Data updated", record).print()
}

pub async fn reconcile(manager: &PolicyManager, args: &ReadArgs) -> Result<()> {
    let report = manager.reconcile(&args.policy).await?;
    let message = if report.busy {
        "Reconcile already running"
    } else if report.skipped.is_some() {
        "Reconcile skipped"
    } else {
        "Reconciled"
    };
    Response::new(message, report).print()
}
