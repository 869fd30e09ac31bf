use async_trait::async_trait;
use chrono::{DateTime, Utc};
use standings_domain::{
    entities::AuditLogEntry, repositories::AuditLogRepository, value_objects::StandingsKey,
};
use standings_errors::StandingsResult;
use tokio::sync::Mutex;

#[derive(Default)]
struct AuditStore {
    next_id: i64,
    entries: Vec<AuditLogEntry>,
}

/// 只追加，按 ID 升序存放
#[derive(Default)]
pub struct InMemoryAuditLogRepository {
    store: Mutex<AuditStore>,
}

impl InMemoryAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append(&self, entry: &AuditLogEntry) -> StandingsResult<AuditLogEntry> {
        let mut store = self.store.lock().await;
        store.next_id += 1;
        let mut entry = entry.clone();
        entry.id = store.next_id;
        store.entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_for_key(
        &self,
        key: StandingsKey,
        limit: i64,
    ) -> StandingsResult<Vec<AuditLogEntry>> {
        let store = self.store.lock().await;
        Ok(store
            .entries
            .iter()
            .rev()
            .filter(|entry| entry.league_id == key.league_id && entry.season_id == key.season_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_for_job(&self, job_id: i64) -> StandingsResult<Vec<AuditLogEntry>> {
        let store = self.store.lock().await;
        Ok(store
            .entries
            .iter()
            .filter(|entry| entry.job_id == Some(job_id))
            .cloned()
            .collect())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>, limit: i64) -> StandingsResult<u64> {
        let mut store = self.store.lock().await;
        let mut remaining = limit.max(0) as u64;
        let mut deleted = 0;
        store.entries.retain(|entry| {
            if remaining > 0 && entry.created_at < cutoff {
                remaining -= 1;
                deleted += 1;
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }

    async fn count(&self, since: Option<DateTime<Utc>>) -> StandingsResult<i64> {
        let store = self.store.lock().await;
        Ok(store
            .entries
            .iter()
            .filter(|entry| since.is_none_or(|since| entry.created_at >= since))
            .count() as i64)
    }
}
