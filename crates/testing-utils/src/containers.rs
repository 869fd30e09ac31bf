//! 临时 SQLite 数据库
//!
//! 每个测试拿到独立的数据库文件，目录随结构体一起删除。

use standings_config::DatabaseConfig;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct SqliteTestDatabase {
    // 保持目录存活，drop 时删除
    _dir: TempDir,
    path: PathBuf,
}

impl SqliteTestDatabase {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("standings_test.db");
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }

    /// 指向该文件的数据库配置，连接池大小按需调整
    pub fn config(&self, max_connections: u32) -> DatabaseConfig {
        DatabaseConfig {
            url: self.url(),
            max_connections,
            min_connections: 1,
            ..DatabaseConfig::default()
        }
    }
}
