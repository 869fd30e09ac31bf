pub mod manager;
pub mod schema;
pub mod sqlite;

pub use manager::DatabaseManager;
pub use sqlite::{
    SqliteAuditLogRepository, SqliteJobRepository, SqliteMatchRepository,
    SqliteSnapshotRepository, SqliteStandingsRepository,
};
