use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use standings_domain::{
    entities::{StandingsEntry, StandingsTable},
    repositories::StandingsRepository,
    value_objects::StandingsKey,
};
use standings_errors::{StandingsError, StandingsResult};
use tracing::{debug, instrument};

pub struct SqliteStandingsRepository {
    pool: SqlitePool,
}

impl SqliteStandingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_table(row: &sqlx::sqlite::SqliteRow) -> StandingsResult<StandingsTable> {
        let entries: String = row.try_get("entries")?;
        Ok(StandingsTable {
            league_id: row.try_get("league_id")?,
            season_id: row.try_get("season_id")?,
            version: row.try_get("version")?,
            entries: serde_json::from_str(&entries)?,
            updated_at: row.try_get("updated_at")?,
            job_id: row.try_get("job_id")?,
        })
    }

    async fn current_version(&self, key: StandingsKey) -> StandingsResult<i64> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM standings WHERE league_id = $1 AND season_id = $2",
        )
        .bind(key.league_id)
        .bind(key.season_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(version.unwrap_or(0))
    }
}

#[async_trait]
impl StandingsRepository for SqliteStandingsRepository {
    async fn get(&self, key: StandingsKey) -> StandingsResult<StandingsTable> {
        let row = sqlx::query(
            "SELECT league_id, season_id, version, entries, updated_at, job_id \
             FROM standings WHERE league_id = $1 AND season_id = $2",
        )
        .bind(key.league_id)
        .bind(key.season_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_table(&row),
            None => Ok(StandingsTable::empty(key)),
        }
    }

    #[instrument(skip(self, entries, now), fields(
        league_id = key.league_id,
        season_id = key.season_id,
        job_id = ?job_id,
    ))]
    async fn compare_and_commit(
        &self,
        key: StandingsKey,
        expected_version: i64,
        entries: &[StandingsEntry],
        job_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> StandingsResult<StandingsTable> {
        let payload = serde_json::to_string(entries)?;

        // 整张表一条语句写入，不存在部分写入
        let result = if expected_version == 0 {
            sqlx::query(
                "INSERT INTO standings (league_id, season_id, version, entries, updated_at, job_id) \
                 VALUES ($1, $2, 1, $3, $4, $5) \
                 ON CONFLICT (league_id, season_id) DO NOTHING",
            )
            .bind(key.league_id)
            .bind(key.season_id)
            .bind(&payload)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE standings SET version = version + 1, entries = $1, updated_at = $2, \
                     job_id = $3 \
                 WHERE league_id = $4 AND season_id = $5 AND version = $6",
            )
            .bind(&payload)
            .bind(now)
            .bind(job_id)
            .bind(key.league_id)
            .bind(key.season_id)
            .bind(expected_version)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(StandingsError::VersionConflict {
                league_id: key.league_id,
                season_id: key.season_id,
                expected: expected_version,
                actual: self.current_version(key).await?,
            });
        }

        debug!("提交积分榜: {} 版本 {}", key, expected_version + 1);
        Ok(StandingsTable {
            league_id: key.league_id,
            season_id: key.season_id,
            version: expected_version + 1,
            entries: entries.to_vec(),
            updated_at: Some(now),
            job_id,
        })
    }

    async fn count(&self, since: Option<DateTime<Utc>>) -> StandingsResult<i64> {
        let count: i64 = match since {
            Some(since) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM standings WHERE updated_at >= $1")
                    .bind(since)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM standings")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }
}
