use async_trait::async_trait;
use chrono::{DateTime, Utc};
use standings_domain::{
    entities::Snapshot, repositories::SnapshotRepository, value_objects::StandingsKey,
};
use standings_errors::StandingsResult;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Default)]
struct SnapshotStore {
    next_id: i64,
    snapshots: BTreeMap<i64, Snapshot>,
}

#[derive(Default)]
pub struct InMemorySnapshotRepository {
    store: Mutex<SnapshotStore>,
}

impl InMemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保留调用方给定的 ID（非 0 时）和时间戳
    pub async fn insert(&self, mut snapshot: Snapshot) -> Snapshot {
        let mut store = self.store.lock().await;
        if snapshot.id == 0 {
            store.next_id += 1;
            snapshot.id = store.next_id;
        } else {
            store.next_id = store.next_id.max(snapshot.id);
        }
        store.snapshots.insert(snapshot.id, snapshot.clone());
        snapshot
    }

    /// 测试专用：模拟存储层损坏
    pub async fn overwrite_payload(&self, id: i64, payload: &str) {
        if let Some(snapshot) = self.store.lock().await.snapshots.get_mut(&id) {
            snapshot.payload = payload.to_string();
        }
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn create(&self, snapshot: &Snapshot) -> StandingsResult<Snapshot> {
        let mut snapshot = snapshot.clone();
        snapshot.id = 0;
        Ok(self.insert(snapshot).await)
    }

    async fn get_by_id(&self, id: i64) -> StandingsResult<Option<Snapshot>> {
        Ok(self.store.lock().await.snapshots.get(&id).cloned())
    }

    async fn latest_for(&self, key: StandingsKey) -> StandingsResult<Option<Snapshot>> {
        let store = self.store.lock().await;
        Ok(store
            .snapshots
            .values()
            .rev()
            .find(|snapshot| snapshot.key() == key)
            .cloned())
    }

    async fn latest_for_job(
        &self,
        key: StandingsKey,
        job_id: i64,
    ) -> StandingsResult<Option<Snapshot>> {
        let store = self.store.lock().await;
        Ok(store
            .snapshots
            .values()
            .rev()
            .find(|snapshot| snapshot.key() == key && snapshot.job_id == Some(job_id))
            .cloned())
    }

    async fn list_for(&self, key: StandingsKey, limit: i64) -> StandingsResult<Vec<Snapshot>> {
        let store = self.store.lock().await;
        Ok(store
            .snapshots
            .values()
            .rev()
            .filter(|snapshot| snapshot.key() == key)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn delete_expired(
        &self,
        cutoff: DateTime<Utc>,
        keep_latest: i64,
        limit: i64,
    ) -> StandingsResult<u64> {
        let mut store = self.store.lock().await;

        // 按 ID 倒序遍历，每个 key 前 keep_latest 个受保护
        let mut seen: HashMap<StandingsKey, i64> = HashMap::new();
        let mut expired = Vec::new();
        for snapshot in store.snapshots.values().rev() {
            let recency = seen.entry(snapshot.key()).or_insert(0);
            *recency += 1;
            if *recency > keep_latest && snapshot.created_at < cutoff {
                expired.push(snapshot.id);
            }
        }
        expired.sort_unstable();
        expired.truncate(limit.max(0) as usize);

        for id in &expired {
            store.snapshots.remove(id);
        }
        Ok(expired.len() as u64)
    }

    async fn count(&self, since: Option<DateTime<Utc>>) -> StandingsResult<i64> {
        let store = self.store.lock().await;
        Ok(store
            .snapshots
            .values()
            .filter(|snapshot| since.is_none_or(|since| snapshot.created_at >= since))
            .count() as i64)
    }
}
