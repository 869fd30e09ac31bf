use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use standings_domain::{
    entities::Snapshot, repositories::SnapshotRepository, value_objects::StandingsKey,
};
use standings_errors::StandingsResult;
use tracing::{debug, instrument};

const SNAPSHOT_COLUMNS: &str =
    "id, league_id, season_id, job_id, standings_version, created_at, size, payload, checksum";

pub struct SqliteSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> StandingsResult<Snapshot> {
        Ok(Snapshot {
            id: row.try_get("id")?,
            league_id: row.try_get("league_id")?,
            season_id: row.try_get("season_id")?,
            job_id: row.try_get("job_id")?,
            standings_version: row.try_get("standings_version")?,
            created_at: row.try_get("created_at")?,
            size: row.try_get("size")?,
            payload: row.try_get("payload")?,
            checksum: row.try_get("checksum")?,
        })
    }
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    #[instrument(skip(self, snapshot), fields(
        league_id = snapshot.league_id,
        season_id = snapshot.season_id,
        job_id = ?snapshot.job_id,
    ))]
    async fn create(&self, snapshot: &Snapshot) -> StandingsResult<Snapshot> {
        let row = sqlx::query(&format!(
            "INSERT INTO snapshots (league_id, season_id, job_id, standings_version, created_at, \
                 size, payload, checksum) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {SNAPSHOT_COLUMNS}"
        ))
        .bind(snapshot.league_id)
        .bind(snapshot.season_id)
        .bind(snapshot.job_id)
        .bind(snapshot.standings_version)
        .bind(snapshot.created_at)
        .bind(snapshot.size)
        .bind(&snapshot.payload)
        .bind(&snapshot.checksum)
        .fetch_one(&self.pool)
        .await?;

        let created = Self::row_to_snapshot(&row)?;
        debug!("创建快照成功: ID {}", created.id);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> StandingsResult<Option<Snapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_snapshot).transpose()
    }

    async fn latest_for(&self, key: StandingsKey) -> StandingsResult<Option<Snapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots \
             WHERE league_id = $1 AND season_id = $2 \
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(key.league_id)
        .bind(key.season_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_snapshot).transpose()
    }

    async fn latest_for_job(
        &self,
        key: StandingsKey,
        job_id: i64,
    ) -> StandingsResult<Option<Snapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots \
             WHERE league_id = $1 AND season_id = $2 AND job_id = $3 \
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(key.league_id)
        .bind(key.season_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_snapshot).transpose()
    }

    async fn list_for(&self, key: StandingsKey, limit: i64) -> StandingsResult<Vec<Snapshot>> {
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots \
             WHERE league_id = $1 AND season_id = $2 \
             ORDER BY id DESC LIMIT $3"
        ))
        .bind(key.league_id)
        .bind(key.season_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_snapshot).collect()
    }

    #[instrument(skip(self))]
    async fn delete_expired(
        &self,
        cutoff: DateTime<Utc>,
        keep_latest: i64,
        limit: i64,
    ) -> StandingsResult<u64> {
        let result = sqlx::query(
            "DELETE FROM snapshots WHERE id IN ( \
                 SELECT id FROM ( \
                     SELECT id, created_at, ROW_NUMBER() OVER ( \
                         PARTITION BY league_id, season_id ORDER BY id DESC \
                     ) AS recency \
                     FROM snapshots \
                 ) \
                 WHERE recency > $1 AND created_at < $2 \
                 ORDER BY id ASC \
                 LIMIT $3)",
        )
        .bind(keep_latest)
        .bind(cutoff)
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self, since: Option<DateTime<Utc>>) -> StandingsResult<i64> {
        let count: i64 = match since {
            Some(since) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM snapshots WHERE created_at >= $1")
                    .bind(since)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }
}
