use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use standings_config::DatabaseConfig;
use standings_errors::{StandingsError, StandingsResult};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::schema::SCHEMA_STATEMENTS;
use super::sqlite::{
    SqliteAuditLogRepository, SqliteJobRepository, SqliteMatchRepository,
    SqliteSnapshotRepository, SqliteStandingsRepository,
};
use crate::repositories::Repositories;

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> StandingsResult<Self> {
        let in_memory = config.url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        // 文件库使用 WAL，读写互不阻塞
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // 每个 :memory: 连接都是一个独立的库，只能用单连接
        let max_connections = if in_memory { 1 } else { config.max_connections };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(config.min_connections.min(max_connections))
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800))
            .connect_with(options)
            .await
            .map_err(|e| StandingsError::StorageUnavailable(format!("连接数据库失败: {e}")))?;

        info!("已连接数据库: {}", config.url);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 创建表和索引，可重复执行
    pub async fn migrate(&self) -> StandingsResult<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!("数据库结构已就绪");
        Ok(())
    }

    pub async fn health_check(&self) -> StandingsResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn repositories(&self) -> Repositories {
        Repositories {
            jobs: Arc::new(SqliteJobRepository::new(self.pool.clone())),
            snapshots: Arc::new(SqliteSnapshotRepository::new(self.pool.clone())),
            standings: Arc::new(SqliteStandingsRepository::new(self.pool.clone())),
            audit_logs: Arc::new(SqliteAuditLogRepository::new(self.pool.clone())),
            matches: Arc::new(SqliteMatchRepository::new(self.pool.clone())),
        }
    }
}
