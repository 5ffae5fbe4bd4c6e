//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了策略层的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;

/// 基线回写对账周期（毫秒）
pub const DEFAULT_RECONCILE_INTERVAL_MS: u64 = 5000;
/// 基线TTL（秒）
pub const DEFAULT_TTL_SECS: u64 = 10;

const MAX_TTL_SECS: u64 = 86400 * 30;

/// 默认后端存储：当前目录下的SQLite文件，不存在时创建
///
/// 命令行的每次调用都是独立进程，数据需要跨调用保留
pub const DEFAULT_DATABASE_URL: &str = "sqlite://oxpolicy.db?mode=rwc";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheStoreConfig,
    /// 策略名称 -> 策略配置
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyConfig>,
}

/// 全局配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 服务名称，用于日志和链路追踪
    pub service_name: String,
    /// 日志过滤表达式（EnvFilter 语法）
    pub log_filter: String,
    /// 序列化类型
    pub serialization: SerializationType,
    /// 是否对缓存镜像启用gzip压缩
    pub compress: bool,
    /// OTLP 收集器端点，未设置时只输出本地日志
    pub otlp_endpoint: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            service_name: "oxpolicy".to_string(),
            log_filter: "info".to_string(),
            serialization: SerializationType::Json,
            compress: false,
            otlp_endpoint: None,
        }
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationType {
    /// JSON序列化
    #[default]
    Json,
}

/// 后端存储配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 连接字符串（sqlite/mysql/postgres）
    pub connection_string: SecretString,
    /// 记录表名
    pub table: String,
    /// 连接池最大连接数
    pub max_connections: u32,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 单次命令超时时间（毫秒）
    pub command_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new(DEFAULT_DATABASE_URL.to_string().into()),
            table: "users".to_string(),
            max_connections: 5,
            connection_timeout_ms: 5000,
            command_timeout_ms: 5000,
        }
    }
}

/// 缓存存储类型
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendType {
    /// 进程内缓存（Moka）
    #[default]
    Memory,
    /// Redis
    Redis,
}

/// 缓存存储配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct CacheStoreConfig {
    pub backend: CacheBackendType,
    pub memory: MemoryConfig,
    pub redis: RedisConfig,
}

/// 进程内缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct MemoryConfig {
    /// 最大条目数
    pub max_capacity: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

/// Redis配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// Redis 密码（可选）
    pub password: Option<SecretString>,
    /// 是否启用 TLS
    pub enable_tls: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            password: None,
            enable_tls: false,
        }
    }
}

/// 策略配置
///
/// 每个策略独占自己的缓存键命名空间
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// 旁路缓存：未命中时加载并永久缓存
    CacheAside { cache_key: String },
    /// 同步写穿
    WriteThrough { cache_key: String },
    /// 异步回写 + 周期对账
    WriteBack {
        cache_key: String,
        dirty_index_key: String,
        #[serde(default = "default_reconcile_interval_ms")]
        reconcile_interval_ms: u64,
    },
    /// 带过期时间的旁路缓存
    Ttl {
        cache_key: String,
        #[serde(default = "default_ttl_secs")]
        ttl_secs: u64,
    },
}

fn default_reconcile_interval_ms() -> u64 {
    DEFAULT_RECONCILE_INTERVAL_MS
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

impl PolicyConfig {
    pub fn cache_key(&self) -> &str {
        match self {
            PolicyConfig::CacheAside { cache_key }
            | PolicyConfig::WriteThrough { cache_key }
            | PolicyConfig::WriteBack { cache_key, .. }
            | PolicyConfig::Ttl { cache_key, .. } => cache_key,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PolicyConfig::CacheAside { .. } => "cache_aside",
            PolicyConfig::WriteThrough { .. } => "write_through",
            PolicyConfig::WriteBack { .. } => "write_back",
            PolicyConfig::Ttl { .. } => "ttl",
        }
    }

    /// 对账周期，仅回写策略有值
    pub fn reconcile_interval(&self) -> Option<Duration> {
        match self {
            PolicyConfig::WriteBack {
                reconcile_interval_ms,
                ..
            } => Some(Duration::from_millis(*reconcile_interval_ms)),
            _ => None,
        }
    }
}

impl Default for Config {
    /// 基线配置：四个策略各自独立的命名空间
    fn default() -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(
            "lazy".to_string(),
            PolicyConfig::CacheAside {
                cache_key: "users".to_string(),
            },
        );
        policies.insert(
            "write_through".to_string(),
            PolicyConfig::WriteThrough {
                cache_key: "users-2".to_string(),
            },
        );
        policies.insert(
            "write_back".to_string(),
            PolicyConfig::WriteBack {
                cache_key: "users-3".to_string(),
                dirty_index_key: "user-update-index".to_string(),
                reconcile_interval_ms: DEFAULT_RECONCILE_INTERVAL_MS,
            },
        );
        policies.insert(
            "ttl".to_string(),
            PolicyConfig::Ttl {
                cache_key: "users-4".to_string(),
                ttl_secs: DEFAULT_TTL_SECS,
            },
        );
        Self {
            config_version: Some(CONFIG_VERSION),
            global: GlobalConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheStoreConfig::default(),
            policies,
        }
    }
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CacheError::ConfigError(e.to_string()))
    }

    /// 从TOML文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// 验证配置
    ///
    /// 检查版本、超时范围、表名，以及所有策略的缓存键互不相同
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.service_name.is_empty() {
            return Err("Global service_name cannot be empty".to_string());
        }

        // 后端存储
        if self.database.connection_string.expose_secret().is_empty() {
            return Err("Database connection_string cannot be empty".to_string());
        }
        validate_identifier(&self.database.table)?;
        if self.database.max_connections == 0 {
            return Err("Database max_connections cannot be zero".to_string());
        }
        if !(100..=30000).contains(&self.database.connection_timeout_ms) {
            return Err("Database connection_timeout_ms must be between 100 and 30000 ms".to_string());
        }
        if !(100..=60000).contains(&self.database.command_timeout_ms) {
            return Err("Database command_timeout_ms must be between 100 and 60000 ms".to_string());
        }

        // 缓存存储
        match self.cache.backend {
            CacheBackendType::Memory => {
                if self.cache.memory.max_capacity == 0 {
                    return Err("Memory cache max_capacity cannot be zero".to_string());
                }
            }
            CacheBackendType::Redis => {
                if !(100..=30000).contains(&self.cache.redis.connection_timeout_ms) {
                    return Err(
                        "Redis connection_timeout_ms must be between 100 and 30000 ms".to_string(),
                    );
                }
                if !(100..=60000).contains(&self.cache.redis.command_timeout_ms) {
                    return Err(
                        "Redis command_timeout_ms must be between 100 and 60000 ms".to_string(),
                    );
                }
            }
        }

        // 策略
        if self.policies.is_empty() {
            return Err("At least one policy must be configured".to_string());
        }

        let mut keys = HashSet::new();
        for (name, policy) in &self.policies {
            if name.is_empty() || name.len() > 64 {
                return Err(format!(
                    "Policy name '{}' must be between 1 and 64 characters",
                    name
                ));
            }
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(format!(
                    "Policy name '{}' may only contain letters, digits, '_' and '-'",
                    name
                ));
            }

            let cache_key = policy.cache_key();
            if cache_key.is_empty() {
                return Err(format!("Policy '{}' cache_key cannot be empty", name));
            }
            if !keys.insert(cache_key.to_string()) {
                return Err(format!(
                    "Policy '{}' cache_key '{}' is already used by another policy",
                    name, cache_key
                ));
            }

            match policy {
                PolicyConfig::WriteBack {
                    dirty_index_key,
                    reconcile_interval_ms,
                    ..
                } => {
                    if dirty_index_key.is_empty() {
                        return Err(format!("Policy '{}' dirty_index_key cannot be empty", name));
                    }
                    if !keys.insert(dirty_index_key.clone()) {
                        return Err(format!(
                            "Policy '{}' dirty_index_key '{}' collides with another key",
                            name, dirty_index_key
                        ));
                    }
                    if !(100..=3_600_000).contains(reconcile_interval_ms) {
                        return Err(format!(
                            "Policy '{}' reconcile_interval_ms must be between 100 and 3600000 ms",
                            name
                        ));
                    }
                }
                PolicyConfig::Ttl { ttl_secs, .. } => {
                    if *ttl_secs == 0 {
                        return Err(format!("Policy '{}' TTL cannot be zero", name));
                    }
                    if *ttl_secs > MAX_TTL_SECS {
                        return Err(format!("Policy '{}' TTL cannot exceed 30 days", name));
                    }
                }
                PolicyConfig::CacheAside { .. } | PolicyConfig::WriteThrough { .. } => {}
            }
        }

        Ok(())
    }
}

/// 验证SQL标识符是否安全
///
/// 只允许字母、数字、下划线，且不能以数字开头
pub fn validate_identifier(identifier: &str) -> std::result::Result<(), String> {
    if identifier.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if identifier.len() > 64 {
        return Err(format!(
            "Identifier '{}' exceeds maximum length of 64 characters",
            identifier
        ));
    }

    let mut chars = identifier.chars();
    let first = chars
        .next()
        .ok_or_else(|| "Invalid identifier: empty".to_string())?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(format!(
            "Invalid identifier '{}': must start with a letter or underscore",
            identifier
        ));
    }

    if chars.any(|c| !c.is_ascii_alphanumeric() && c != '_') {
        return Err(format!(
            "Invalid identifier '{}': only alphanumeric characters and underscores are allowed",
            identifier
        ));
    }

    let reserved_keywords = [
        "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TABLE", "INDEX",
        "WHERE", "FROM", "JOIN", "UNION", "ORDER", "GROUP", "USER",
    ];
    if reserved_keywords.contains(&identifier.to_uppercase().as_str()) {
        return Err(format!(
            "Invalid identifier '{}': reserved keyword",
            identifier
        ));
    }

    Ok(())
}
