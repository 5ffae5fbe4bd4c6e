//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了后台同步任务。

pub mod reconciler;

pub use reconciler::Reconciler;
