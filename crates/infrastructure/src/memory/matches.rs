use async_trait::async_trait;
use standings_domain::{
    entities::MatchSet, repositories::MatchRepository, value_objects::StandingsKey,
};
use standings_errors::StandingsResult;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// 内存中的比赛参考数据，未登记的 (联赛, 赛季) 视为空
#[derive(Default)]
pub struct InMemoryMatchRepository {
    sets: Mutex<HashMap<StandingsKey, MatchSet>>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换某个 (联赛, 赛季) 的全部比赛数据，相当于外部系统的一次写入
    pub async fn put(&self, key: StandingsKey, match_set: MatchSet) {
        self.sets.lock().await.insert(key, match_set);
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn load_match_set(&self, key: StandingsKey) -> StandingsResult<MatchSet> {
        Ok(self
            .sets
            .lock()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }
}
