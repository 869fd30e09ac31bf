//! 内存仓储实现
//!
//! 用于测试和 `database.url = "memory://"` 的零配置运行，进程退出后数据丢失

pub mod audit_logs;
pub mod jobs;
pub mod matches;
pub mod snapshots;
pub mod standings;

pub use audit_logs::InMemoryAuditLogRepository;
pub use jobs::InMemoryJobRepository;
pub use matches::InMemoryMatchRepository;
pub use snapshots::InMemorySnapshotRepository;
pub use standings::InMemoryStandingsRepository;
