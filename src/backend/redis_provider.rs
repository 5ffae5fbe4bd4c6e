//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis连接提供者接口和默认实现。

use crate::{
    config::RedisConfig,
    error::{CacheError, Result},
    utils::redaction::redact_connection_string,
};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use tokio::time::{timeout, Duration};

/// Redis连接提供者
///
/// 将连接建立与缓存存储解耦，便于替换连接方式
#[async_trait]
pub trait RedisProvider: Send + Sync {
    async fn connect(&self, config: &RedisConfig) -> Result<(Client, ConnectionManager)>;
}

pub struct DefaultRedisProvider;

impl DefaultRedisProvider {
    /// 根据配置组装最终的连接字符串（TLS、密码）
    pub fn connection_url(config: &RedisConfig) -> String {
        let raw = config.connection_string.expose_secret();
        let mut url = if config.enable_tls && !raw.starts_with("rediss://") {
            raw.replace("redis://", "rediss://")
        } else {
            raw.to_string()
        };

        if let Some(password) = &config.password {
            if !url.contains('@') {
                if let Some(pos) = url.find("://") {
                    url.insert_str(pos + 3, &format!(":{}@", password.expose_secret()));
                }
            }
        }
        url
    }
}

#[async_trait]
impl RedisProvider for DefaultRedisProvider {
    async fn connect(&self, config: &RedisConfig) -> Result<(Client, ConnectionManager)> {
        let connection_string = Self::connection_url(config);

        let client = Client::open(connection_string.as_str())?;
        let manager = match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(CacheError::CacheUnavailable(format!(
                    "Connection timed out after {}ms. Target: {}",
                    config.connection_timeout_ms,
                    redact_connection_string(&connection_string)
                )));
            }
        };
        Ok((client, manager))
    }
}
