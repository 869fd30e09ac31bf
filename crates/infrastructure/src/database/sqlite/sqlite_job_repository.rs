use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use standings_domain::{
    entities::{EnqueueOutcome, EnqueueRequest, Job, JobFilter, JobResult, JobStatus},
    repositories::JobRepository,
    value_objects::StandingsKey,
};
use standings_errors::{StandingsError, StandingsResult};
use tracing::{debug, instrument, warn};

const JOB_COLUMNS: &str = "id, league_id, season_id, priority, status, attempts, reasons, \
     rerun_requested, worker_id, lease_expires_at, available_at, created_at, started_at, \
     completed_at, last_error, result";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> StandingsResult<Job> {
        let reasons: String = row.try_get("reasons")?;
        let result: Option<String> = row.try_get("result")?;
        Ok(Job {
            id: row.try_get("id")?,
            league_id: row.try_get("league_id")?,
            season_id: row.try_get("season_id")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            attempts: row.try_get("attempts")?,
            reasons: serde_json::from_str(&reasons)?,
            rerun_requested: row.try_get("rerun_requested")?,
            worker_id: row.try_get("worker_id")?,
            lease_expires_at: row.try_get("lease_expires_at")?,
            available_at: row.try_get("available_at")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            last_error: row.try_get("last_error")?,
            result: result.map(|r| serde_json::from_str(&r)).transpose()?,
        })
    }

    /// 条件更新没有命中时，区分任务不存在和状态不符
    async fn transition_error(&self, id: i64, to: JobStatus) -> StandingsError {
        match self.get_by_id(id).await {
            Ok(Some(job)) => StandingsError::invalid_transition(id, job.status, to),
            Ok(None) => StandingsError::job_not_found(id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, request), fields(
        league_id = request.league_id,
        season_id = request.season_id,
        priority = request.priority,
    ))]
    async fn upsert_active(
        &self,
        request: &EnqueueRequest,
        now: DateTime<Utc>,
    ) -> StandingsResult<EnqueueOutcome> {
        // 放进独立任务，调用方被取消时事务仍会提交或回滚
        let pool = self.pool.clone();
        let request = request.clone();
        tokio::spawn(async move { upsert_immediate(&pool, &request, now).await })
            .await
            .map_err(|e| StandingsError::Internal(format!("入队事务异常退出: {e}")))?
    }

    async fn get_by_id(&self, id: i64) -> StandingsResult<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn list(&self, filter: &JobFilter) -> StandingsResult<Vec<Job>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE 1 = 1"));

        if let Some(league_id) = filter.league_id {
            builder.push(" AND league_id = ").push_bind(league_id);
        }
        if let Some(season_id) = filter.season_id {
            builder.push(" AND season_id = ").push_bind(season_id);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }

        // SQLite 中 LIMIT -1 表示不限制
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(-1))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_job).collect()
    }

    async fn find_next_pending(&self, now: DateTime<Utc>) -> StandingsResult<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status = 'PENDING' AND available_at <= $1 \
             ORDER BY priority DESC, created_at ASC, id ASC \
             LIMIT 1"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    #[instrument(skip(self, lease_expires_at, now))]
    async fn try_claim(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StandingsResult<Option<Job>> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET status = 'PROCESSING', worker_id = $1, lease_expires_at = $2, \
                 started_at = $3 \
             WHERE id = $4 AND status = 'PENDING' \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(worker_id)
        .bind(lease_expires_at)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn renew_lease(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
    ) -> StandingsResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET lease_expires_at = $1 \
             WHERE id = $2 AND status = 'PROCESSING' AND worker_id = $3",
        )
        .bind(lease_expires_at)
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_processing_for_key(&self, key: StandingsKey) -> StandingsResult<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE league_id = $1 AND season_id = $2 AND status = 'PROCESSING'"
        ))
        .bind(key.league_id)
        .bind(key.season_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self, result, now))]
    async fn mark_completed(
        &self,
        id: i64,
        result: &JobResult,
        now: DateTime<Utc>,
    ) -> StandingsResult<Job> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET status = 'COMPLETED', completed_at = $1, result = $2, \
                 lease_expires_at = NULL, last_error = NULL \
             WHERE id = $3 AND status = 'PROCESSING' \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .bind(serde_json::to_string(result)?)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_job(&row),
            None => Err(self.transition_error(id, JobStatus::Completed).await),
        }
    }

    #[instrument(skip(self, error, available_at))]
    async fn mark_retry(
        &self,
        id: i64,
        attempts: i32,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> StandingsResult<Job> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET status = 'PENDING', attempts = $1, last_error = $2, \
                 available_at = $3, worker_id = NULL, lease_expires_at = NULL, \
                 started_at = NULL, rerun_requested = 0 \
             WHERE id = $4 AND status = 'PROCESSING' \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(attempts)
        .bind(error)
        .bind(available_at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_job(&row),
            None => Err(self.transition_error(id, JobStatus::Pending).await),
        }
    }

    #[instrument(skip(self, error, now))]
    async fn mark_failed(
        &self,
        id: i64,
        attempts: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> StandingsResult<Job> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET status = 'FAILED', attempts = $1, last_error = $2, \
                 completed_at = $3, lease_expires_at = NULL \
             WHERE id = $4 AND status = 'PROCESSING' \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(attempts)
        .bind(error)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_job(&row),
            None => Err(self.transition_error(id, JobStatus::Failed).await),
        }
    }

    async fn find_expired_leases(&self, now: DateTime<Utc>) -> StandingsResult<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status = 'PROCESSING' AND lease_expires_at < $1 \
             ORDER BY lease_expires_at ASC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self))]
    async fn delete_pending(&self, id: i64) -> StandingsResult<()> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND status = 'PENDING'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(match self.get_by_id(id).await? {
                Some(job) => StandingsError::invalid_transition(id, job.status, "CANCELLED"),
                None => StandingsError::job_not_found(id),
            });
        }

        debug!("取消待处理任务: ID {}", id);
        Ok(())
    }

    async fn delete_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StandingsResult<u64> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE id IN ( \
                 SELECT id FROM jobs \
                 WHERE status IN ('COMPLETED', 'FAILED') AND completed_at < $1 \
                 ORDER BY completed_at ASC \
                 LIMIT $2)",
        )
        .bind(cutoff)
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// 在 BEGIN IMMEDIATE 事务中查找并合并或插入。
/// 写锁在读取之前取得，并发入队不会因为读锁升级失败而报 SQLITE_BUSY
async fn upsert_immediate(
    pool: &SqlitePool,
    request: &EnqueueRequest,
    now: DateTime<Utc>,
) -> StandingsResult<EnqueueOutcome> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    let outcome = match upsert_in(&mut conn, request, now).await {
        Ok(outcome) => outcome,
        Err(e) => {
            rollback(&mut conn).await;
            return Err(e);
        }
    };

    if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
        rollback(&mut conn).await;
        return Err(e.into());
    }
    Ok(outcome)
}

async fn rollback(conn: &mut SqliteConnection) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        warn!("回滚入队事务失败: {}", e);
    }
}

async fn upsert_in(
    conn: &mut SqliteConnection,
    request: &EnqueueRequest,
    now: DateTime<Utc>,
) -> StandingsResult<EnqueueOutcome> {
    let existing = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs \
         WHERE league_id = $1 AND season_id = $2 AND status IN ('PENDING', 'PROCESSING') \
         LIMIT 1"
    ))
    .bind(request.league_id)
    .bind(request.season_id)
    .fetch_optional(&mut *conn)
    .await?;

    let outcome = match existing {
        Some(row) => {
            let mut job = SqliteJobRepository::row_to_job(&row)?;
            let previous_status = job.status;
            job.coalesce(request);

            let updated = sqlx::query(
                "UPDATE jobs SET priority = $1, reasons = $2, rerun_requested = $3 \
                 WHERE id = $4 AND status = $5",
            )
            .bind(job.priority)
            .bind(serde_json::to_string(&job.reasons)?)
            .bind(job.rerun_requested)
            .bind(job.id)
            .bind(previous_status)
            .execute(&mut *conn)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(StandingsError::LockConflict { job_id: job.id });
            }

            debug!("合并入队请求到任务 {}", job.id);
            EnqueueOutcome {
                job,
                created: false,
            }
        }
        None => {
            let job = Job::new(request, now);
            let row = sqlx::query(&format!(
                "INSERT INTO jobs (league_id, season_id, priority, status, attempts, reasons, \
                     rerun_requested, available_at, created_at) \
                 VALUES ($1, $2, $3, $4, 0, $5, 0, $6, $7) \
                 RETURNING {JOB_COLUMNS}"
            ))
            .bind(job.league_id)
            .bind(job.season_id)
            .bind(job.priority)
            .bind(job.status)
            .bind(serde_json::to_string(&job.reasons)?)
            .bind(job.available_at)
            .bind(job.created_at)
            .fetch_one(&mut *conn)
            .await?;

            let job = SqliteJobRepository::row_to_job(&row)?;
            debug!("创建重算任务 {}", job.id);
            EnqueueOutcome { job, created: true }
        }
    };

    Ok(outcome)
}
