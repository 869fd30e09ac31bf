use std::sync::Arc;

use chrono::Utc;
use standings_domain::{
    Actor, AuditAction, AuditLogEntry, AuditLogRepository, StandingsKey,
};
use standings_errors::StandingsResult;
use tracing::{debug, instrument};

/// 待写入的审计记录
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub key: StandingsKey,
    pub job_id: Option<i64>,
    pub action: AuditAction,
    pub before_hash: String,
    pub after_hash: String,
    pub actor: Actor,
    pub details: Option<String>,
}

impl AuditRecord {
    pub fn new(key: StandingsKey, action: AuditAction, actor: Actor) -> Self {
        Self {
            key,
            job_id: None,
            action,
            before_hash: String::new(),
            after_hash: String::new(),
            actor,
            details: None,
        }
    }

    pub fn for_job(mut self, job_id: Option<i64>) -> Self {
        self.job_id = job_id;
        self
    }

    pub fn hashes(mut self, before_hash: impl Into<String>, after_hash: impl Into<String>) -> Self {
        self.before_hash = before_hash.into();
        self.after_hash = after_hash.into();
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// 审计日志，只追加
pub struct AuditLogger {
    repository: Arc<dyn AuditLogRepository>,
}

impl AuditLogger {
    pub fn new(repository: Arc<dyn AuditLogRepository>) -> Self {
        Self { repository }
    }

    #[instrument(skip(self, record), fields(
        league_id = record.key.league_id,
        season_id = record.key.season_id,
        job_id = record.job_id,
        action = record.action.as_str(),
    ))]
    pub async fn log(&self, record: AuditRecord) -> StandingsResult<AuditLogEntry> {
        let entry = AuditLogEntry {
            id: 0,
            created_at: Utc::now(),
            job_id: record.job_id,
            league_id: record.key.league_id,
            season_id: record.key.season_id,
            action: record.action,
            before_hash: record.before_hash,
            after_hash: record.after_hash,
            actor: record.actor,
            details: record.details,
        };

        let entry = self.repository.append(&entry).await?;
        debug!("写入审计记录 {}", entry.id);
        Ok(entry)
    }

    /// 某个 (联赛, 赛季) 最近的审计记录，新的在前
    pub async fn history(
        &self,
        key: StandingsKey,
        limit: i64,
    ) -> StandingsResult<Vec<AuditLogEntry>> {
        self.repository.list_for_key(key, limit).await
    }

    pub async fn for_job(&self, job_id: i64) -> StandingsResult<Vec<AuditLogEntry>> {
        self.repository.list_for_job(job_id).await
    }
}
