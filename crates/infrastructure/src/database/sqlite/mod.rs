pub mod sqlite_audit_log_repository;
pub mod sqlite_job_repository;
pub mod sqlite_match_repository;
pub mod sqlite_snapshot_repository;
pub mod sqlite_standings_repository;

pub use sqlite_audit_log_repository::SqliteAuditLogRepository;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_match_repository::SqliteMatchRepository;
pub use sqlite_snapshot_repository::SqliteSnapshotRepository;
pub use sqlite_standings_repository::SqliteStandingsRepository;
