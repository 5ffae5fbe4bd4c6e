//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志和链路追踪的初始化。

use crate::config::GlobalConfig;
use crate::error::{CacheError, Result};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{self as sdktrace, TracerProvider as SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// 初始化日志与链路追踪
///
/// 过滤表达式优先取 `RUST_LOG` 环境变量，否则使用配置中的 `log_filter`。
/// 日志输出到标准错误，标准输出留给命令行的JSON结果。
/// 配置了 `otlp_endpoint` 时通过OTLP批量导出span，否则只挂接本地tracer。
///
/// 全局订阅者已经存在时（例如测试中重复初始化）静默返回。
pub fn init_tracing(global_config: &GlobalConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&global_config.log_filter))
        .map_err(|e| CacheError::ConfigError(format!("Invalid log filter: {}", e)))?;

    let resource = Resource::new(vec![KeyValue::new(
        "service.name",
        global_config.service_name.clone(),
    )]);

    let tracer = match &global_config.otlp_endpoint {
        Some(endpoint) => opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint.clone()),
            )
            .with_trace_config(sdktrace::config().with_resource(resource))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .map_err(|e| CacheError::ConfigError(format!("Failed to init OTLP: {}", e)))?,
        None => {
            let provider = SdkTracerProvider::builder()
                .with_config(sdktrace::config().with_resource(resource))
                .build();
            global::set_tracer_provider(provider.clone());
            provider.tracer(global_config.service_name.clone())
        }
    };

    let _ = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init();
    Ok(())
}

/// 刷新并关闭全局tracer provider
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}
