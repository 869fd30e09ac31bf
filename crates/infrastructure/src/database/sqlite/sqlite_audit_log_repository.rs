use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use standings_domain::{
    entities::AuditLogEntry, repositories::AuditLogRepository, value_objects::StandingsKey,
};
use standings_errors::StandingsResult;
use tracing::instrument;

const AUDIT_COLUMNS: &str =
    "id, created_at, job_id, league_id, season_id, action, before_hash, after_hash, actor, details";

pub struct SqliteAuditLogRepository {
    pool: SqlitePool,
}

impl SqliteAuditLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> StandingsResult<AuditLogEntry> {
        Ok(AuditLogEntry {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
            job_id: row.try_get("job_id")?,
            league_id: row.try_get("league_id")?,
            season_id: row.try_get("season_id")?,
            action: row.try_get("action")?,
            before_hash: row.try_get("before_hash")?,
            after_hash: row.try_get("after_hash")?,
            actor: row.try_get("actor")?,
            details: row.try_get("details")?,
        })
    }
}

#[async_trait]
impl AuditLogRepository for SqliteAuditLogRepository {
    #[instrument(skip(self, entry), fields(
        job_id = ?entry.job_id,
        action = entry.action.as_str(),
    ))]
    async fn append(&self, entry: &AuditLogEntry) -> StandingsResult<AuditLogEntry> {
        let row = sqlx::query(&format!(
            "INSERT INTO audit_logs (created_at, job_id, league_id, season_id, action, \
                 before_hash, after_hash, actor, details) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {AUDIT_COLUMNS}"
        ))
        .bind(entry.created_at)
        .bind(entry.job_id)
        .bind(entry.league_id)
        .bind(entry.season_id)
        .bind(entry.action)
        .bind(&entry.before_hash)
        .bind(&entry.after_hash)
        .bind(entry.actor)
        .bind(&entry.details)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_entry(&row)
    }

    async fn list_for_key(
        &self,
        key: StandingsKey,
        limit: i64,
    ) -> StandingsResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs \
             WHERE league_id = $1 AND season_id = $2 \
             ORDER BY id DESC LIMIT $3"
        ))
        .bind(key.league_id)
        .bind(key.season_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn list_for_job(&self, job_id: i64) -> StandingsResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE job_id = $1 ORDER BY id ASC"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>, limit: i64) -> StandingsResult<u64> {
        let result = sqlx::query(
            "DELETE FROM audit_logs WHERE id IN ( \
                 SELECT id FROM audit_logs WHERE created_at < $1 ORDER BY id ASC LIMIT $2)",
        )
        .bind(cutoff)
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self, since: Option<DateTime<Utc>>) -> StandingsResult<i64> {
        let count: i64 = match since {
            Some(since) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE created_at >= $1")
                    .bind(since)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }
}
