use async_trait::async_trait;
use chrono::{DateTime, Utc};
use standings_domain::{
    entities::{StandingsEntry, StandingsTable},
    repositories::StandingsRepository,
    value_objects::StandingsKey,
};
use standings_errors::{StandingsError, StandingsResult};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryStandingsRepository {
    tables: Mutex<HashMap<StandingsKey, StandingsTable>>,
}

impl InMemoryStandingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StandingsRepository for InMemoryStandingsRepository {
    async fn get(&self, key: StandingsKey) -> StandingsResult<StandingsTable> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(&key)
            .cloned()
            .unwrap_or_else(|| StandingsTable::empty(key)))
    }

    async fn compare_and_commit(
        &self,
        key: StandingsKey,
        expected_version: i64,
        entries: &[StandingsEntry],
        job_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> StandingsResult<StandingsTable> {
        let mut tables = self.tables.lock().await;
        let actual = tables.get(&key).map_or(0, |table| table.version);
        if actual != expected_version {
            return Err(StandingsError::VersionConflict {
                league_id: key.league_id,
                season_id: key.season_id,
                expected: expected_version,
                actual,
            });
        }

        let table = StandingsTable {
            league_id: key.league_id,
            season_id: key.season_id,
            version: expected_version + 1,
            entries: entries.to_vec(),
            updated_at: Some(now),
            job_id,
        };
        tables.insert(key, table.clone());
        Ok(table)
    }

    async fn count(&self, since: Option<DateTime<Utc>>) -> StandingsResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .values()
            .filter(|table| {
                since.is_none_or(|since| table.updated_at.is_some_and(|at| at >= since))
            })
            .count() as i64)
    }
}
