use standings_domain::repositories::{
    AuditLogRepository, JobRepository, MatchRepository, SnapshotRepository, StandingsRepository,
};
use std::sync::Arc;

use crate::memory::{
    InMemoryAuditLogRepository, InMemoryJobRepository, InMemoryMatchRepository,
    InMemorySnapshotRepository, InMemoryStandingsRepository,
};

/// 一组仓储，上层服务只依赖 trait 对象
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobRepository>,
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub standings: Arc<dyn StandingsRepository>,
    pub audit_logs: Arc<dyn AuditLogRepository>,
    pub matches: Arc<dyn MatchRepository>,
}

/// 内存仓储，同时保留具体类型以便测试写入参考数据
#[derive(Clone, Default)]
pub struct InMemoryRepositories {
    pub jobs: Arc<InMemoryJobRepository>,
    pub snapshots: Arc<InMemorySnapshotRepository>,
    pub standings: Arc<InMemoryStandingsRepository>,
    pub audit_logs: Arc<InMemoryAuditLogRepository>,
    pub matches: Arc<InMemoryMatchRepository>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repositories(&self) -> Repositories {
        Repositories {
            jobs: self.jobs.clone(),
            snapshots: self.snapshots.clone(),
            standings: self.standings.clone(),
            audit_logs: self.audit_logs.clone(),
            matches: self.matches.clone(),
        }
    }
}

impl From<&InMemoryRepositories> for Repositories {
    fn from(memory: &InMemoryRepositories) -> Self {
        memory.repositories()
    }
}
