//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 基于Sea-ORM的后端存储网关，支持SQLite、MySQL和PostgreSQL。

use super::RecordGateway;
use crate::config::{validate_identifier, DatabaseConfig};
use crate::error::{CacheError, Result};
use crate::model::{Record, UserFields};
use crate::utils::redaction::redact_connection_string;
use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, Value,
};
use secrecy::ExposeSecret;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

/// 数据库类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// 从URL字符串解析数据库类型
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseType::PostgreSQL
        } else if url.starts_with("mysql://") {
            DatabaseType::MySQL
        } else {
            DatabaseType::SQLite
        }
    }
}

/// 确保SQLite文件数据库的父目录存在
fn ensure_sqlite_directory(url: &str) -> Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Sea-ORM后端存储网关
///
/// 使用原始SQL语句操作单张记录表：
/// `id` 自增主键，`name`、`email`、`description` 三个可空文本列
#[derive(Debug, Clone)]
pub struct SeaOrmGateway {
    connection: DatabaseConnection,
    table: String,
    command_timeout: Duration,
}

impl SeaOrmGateway {
    /// 连接数据库并确保表存在
    #[instrument(skip(config), level = "info", name = "init_sea_orm_gateway")]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        validate_identifier(&config.table).map_err(CacheError::ConfigError)?;

        let url = config.connection_string.expose_secret().to_string();
        let db_type = DatabaseType::from_url(&url);
        if db_type == DatabaseType::SQLite {
            ensure_sqlite_directory(&url)?;
        }

        let mut opt = ConnectOptions::new(url.clone());
        opt.connect_timeout(Duration::from_millis(config.connection_timeout_ms))
            .sqlx_logging(false);
        if db_type == DatabaseType::SQLite {
            // 内存库每个连接都是独立的数据库，只能使用单连接
            opt.max_connections(1).min_connections(1);
        } else {
            opt.max_connections(config.max_connections).min_connections(1);
        }

        let connection = Database::connect(opt).await.map_err(|e| {
            CacheError::StoreUnavailable(format!(
                "Failed to connect to {}: {}",
                redact_connection_string(&url),
                e
            ))
        })?;
        info!(
            "Connected backing store {} ({:?})",
            redact_connection_string(&url),
            db_type
        );

        let gateway = Self {
            connection,
            table: config.table.clone(),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        };
        gateway.ensure_schema().await?;
        Ok(gateway)
    }

    /// 使用已建立的连接创建网关（不创建表）
    pub fn from_connection(
        connection: DatabaseConnection,
        table: &str,
        command_timeout: Duration,
    ) -> Result<Self> {
        validate_identifier(table).map_err(CacheError::ConfigError)?;
        Ok(Self {
            connection,
            table: table.to_string(),
            command_timeout,
        })
    }

    fn backend(&self) -> DatabaseBackend {
        self.connection.get_database_backend()
    }

    /// 第n个（从1开始）参数占位符
    fn placeholder(&self, n: usize) -> String {
        match self.backend() {
            DatabaseBackend::Postgres => format!("${}", n),
            _ => "?".to_string(),
        }
    }

    /// 创建记录表（如不存在）
    pub async fn ensure_schema(&self) -> Result<()> {
        let sql = match self.backend() {
            DatabaseBackend::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, email TEXT, description TEXT)",
                self.table
            ),
            DatabaseBackend::MySql => format!(
                "CREATE TABLE IF NOT EXISTS {} (id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY, name VARCHAR(255), email VARCHAR(255), description TEXT)",
                self.table
            ),
            DatabaseBackend::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {} (id BIGSERIAL PRIMARY KEY, name TEXT, email TEXT, description TEXT)",
                self.table
            ),
        };
        debug!("Ensuring schema: {}", sql);
        self.bounded("ensure_schema", async move {
            self.connection
                .execute(Statement::from_string(self.backend(), sql))
                .await
        })
        .await?;
        Ok(())
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sea_orm::DbErr>>,
    {
        match timeout(self.command_timeout, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(CacheError::StoreUnavailable(format!(
                "{} timed out after {}ms",
                op,
                self.command_timeout.as_millis()
            ))),
        }
    }

    fn field_values(fields: &UserFields) -> Vec<Value> {
        vec![
            Value::from(fields.name.clone()),
            Value::from(fields.email.clone()),
            Value::from(fields.description.clone()),
        ]
    }

    fn row_to_record(row: &QueryResult) -> Result<Record> {
        let id: i64 = row.try_get("", "id")?;
        Ok(Record::new(
            id,
            UserFields {
                name: row.try_get("", "name")?,
                email: row.try_get("", "email")?,
                description: row.try_get("", "description")?,
            },
        ))
    }
}

#[async_trait]
impl RecordGateway for SeaOrmGateway {
    #[instrument(skip(self), level = "debug", fields(table = %self.table))]
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT id, name, email, description FROM {} ORDER BY id",
            self.table
        );
        let rows = self
            .bounded("fetch_all", async move {
                self.connection
                    .query_all(Statement::from_string(self.backend(), sql))
                    .await
            })
            .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    #[instrument(skip(self, fields), level = "debug", fields(table = %self.table))]
    async fn insert(&self, fields: UserFields) -> Result<Record> {
        let values = Self::field_values(&fields);
        let placeholders = (1..=3)
            .map(|n| self.placeholder(n))
            .collect::<Vec<_>>()
            .join(", ");

        let id = match self.backend() {
            DatabaseBackend::Postgres => {
                let sql = format!(
                    "INSERT INTO {} (name, email, description) VALUES ({}) RETURNING id",
                    self.table, placeholders
                );
                let row = self
                    .bounded("insert", async move {
                        self.connection
                            .query_one(Statement::from_sql_and_values(
                                self.backend(),
                                sql,
                                values,
                            ))
                            .await
                    })
                    .await?
                    .ok_or_else(|| {
                        CacheError::StoreUnavailable("INSERT returned no id".to_string())
                    })?;
                row.try_get::<i64>("", "id")?
            }
            backend => {
                let sql = format!(
                    "INSERT INTO {} (name, email, description) VALUES ({})",
                    self.table, placeholders
                );
                let result = self
                    .bounded("insert", async move {
                        self.connection
                            .execute(Statement::from_sql_and_values(backend, sql, values))
                            .await
                    })
                    .await?;
                result.last_insert_id() as i64
            }
        };

        debug!("Inserted record id={}", id);
        Ok(Record::new(id, fields))
    }

    #[instrument(skip(self, fields), level = "debug", fields(table = %self.table))]
    async fn update_by_key(&self, id: i64, fields: UserFields) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET name = {}, email = {}, description = {} WHERE id = {}",
            self.table,
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.placeholder(4)
        );
        let mut values = Self::field_values(&fields);
        values.push(Value::from(id));

        let result = self
            .bounded("update_by_key", async move {
                self.connection
                    .execute(Statement::from_sql_and_values(self.backend(), sql, values))
                    .await
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(CacheError::RecordNotFound(id));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.connection.ping()).await
    }

    async fn close(&self) -> Result<()> {
        // 关闭共享连接池，克隆句柄指向同一个池
        self.connection.clone().close().await?;
        Ok(())
    }
}
