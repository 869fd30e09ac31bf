use std::sync::Arc;

use chrono::{Duration, Utc};
use standings_config::QueueConfig;
use standings_domain::{
    Actor, AuditAction, EnqueueOutcome, EnqueueRequest, Job, JobFilter, JobRepository, JobResult,
    JobStatus, StandingsKey,
};
use standings_errors::{StandingsError, StandingsResult};
use tracing::{debug, error, info, instrument, warn};

use crate::audit_logger::{AuditLogger, AuditRecord};
use crate::retry_service::{retry_transient, RetryDecision, RetryPolicy};
use crate::snapshot_manager::SnapshotManager;

/// 入队遇到瞬时错误（例如两个请求同时创建任务撞上唯一索引）时的尝试次数
const ENQUEUE_ATTEMPTS: u32 = 3;

/// 持久化的重算任务队列
///
/// 状态机：`PENDING -> PROCESSING -> {COMPLETED | PENDING(重试) | FAILED}`。
/// 同一 (联赛, 赛季) 最多只有一个非终态任务，领取是条件更新，因此同一时刻最多一个 worker 在重算。
pub struct JobQueue {
    jobs: Arc<dyn JobRepository>,
    snapshots: Arc<SnapshotManager>,
    audit: Arc<AuditLogger>,
    retry_policy: RetryPolicy,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        snapshots: Arc<SnapshotManager>,
        audit: Arc<AuditLogger>,
        config: QueueConfig,
    ) -> Self {
        Self {
            jobs,
            snapshots,
            audit,
            retry_policy: RetryPolicy::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// 请求重算某个 (联赛, 赛季)，已有非终态任务时合并进去
    #[instrument(skip(self, reason))]
    pub async fn enqueue(
        &self,
        league_id: i64,
        season_id: i64,
        priority: i32,
        reason: &str,
    ) -> StandingsResult<EnqueueOutcome> {
        if league_id <= 0 || season_id <= 0 {
            return Err(StandingsError::validation_error(format!(
                "联赛和赛季 ID 必须为正数: {league_id}/{season_id}"
            )));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(StandingsError::validation_error("入队原因不能为空"));
        }

        let request = EnqueueRequest::new(league_id, season_id, priority, reason);
        let outcome = retry_transient("入队", ENQUEUE_ATTEMPTS, || {
            self.jobs.upsert_active(&request, Utc::now())
        })
        .await?;

        let created = if outcome.created { "true" } else { "false" };
        metrics::counter!("standings_jobs_enqueued_total", "created" => created).increment(1);

        if outcome.created {
            info!("创建重算任务 {} ({}, 原因: {})", outcome.job.id, request.key(), reason);
        } else {
            info!(
                "请求合并到已有任务 {} (状态 {}, 优先级 {})",
                outcome.job.id, outcome.job.status, outcome.job.priority
            );
        }
        Ok(outcome)
    }

    /// 以配置的强制优先级入队
    pub async fn force_enqueue(
        &self,
        league_id: i64,
        season_id: i64,
        reason: &str,
    ) -> StandingsResult<EnqueueOutcome> {
        self.enqueue(league_id, season_id, self.config.force_priority, reason)
            .await
    }

    /// 领取优先级最高、最早创建的可执行任务
    ///
    /// 没有可领取的任务返回 `Ok(None)`；被其他 worker 抢先返回 `LockConflict`，调用方重新 dequeue 即可。
    #[instrument(skip(self))]
    pub async fn dequeue(&self, worker_id: &str) -> StandingsResult<Option<Job>> {
        let now = Utc::now();
        let Some(candidate) = self.jobs.find_next_pending(now).await? else {
            return Ok(None);
        };

        let lease_expires_at = now + Duration::seconds(self.config.lease_seconds as i64);
        let Some(job) = self
            .jobs
            .try_claim(candidate.id, worker_id, lease_expires_at, now)
            .await?
        else {
            debug!("任务 {} 已被其他 worker 领取", candidate.id);
            return Err(StandingsError::LockConflict {
                job_id: candidate.id,
            });
        };

        if let Err(e) = self.assert_single_writer(job.key()).await {
            error!("领取任务 {} 后发现不变量被破坏: {}", job.id, e);
            self.fail_fatal(job.id, &e).await?;
            return Err(e);
        }

        debug!("worker {} 领取任务 {} ({})", worker_id, job.id, job.key());
        Ok(Some(job))
    }

    /// 同一 (联赛, 赛季) 不允许同时存在两个 PROCESSING 任务
    pub async fn assert_single_writer(&self, key: StandingsKey) -> StandingsResult<()> {
        let processing = self.jobs.find_processing_for_key(key).await?;
        if processing.len() > 1 {
            let ids: Vec<i64> = processing.iter().map(|job| job.id).collect();
            return Err(StandingsError::InvariantViolation(format!(
                "{key} 同时有多个处理中的任务: {ids:?}"
            )));
        }
        Ok(())
    }

    /// 延长租约，返回 `false` 表示任务已不再由该 worker 持有
    pub async fn renew_lease(&self, job_id: i64, worker_id: &str) -> StandingsResult<bool> {
        let lease_expires_at = Utc::now() + Duration::seconds(self.config.lease_seconds as i64);
        let renewed = self
            .jobs
            .renew_lease(job_id, worker_id, lease_expires_at)
            .await?;
        if renewed {
            debug!("任务 {} 租约延长到 {}", job_id, lease_expires_at);
        } else {
            warn!("任务 {} 的租约已不属于 worker {}", job_id, worker_id);
        }
        Ok(renewed)
    }

    /// PROCESSING -> COMPLETED；处理期间收到过新的入队请求时再排一个后续任务
    ///
    /// 后续任务入队失败不会让这次完成返回错误。
    #[instrument(skip(self, result))]
    pub async fn complete(&self, job_id: i64, result: &JobResult) -> StandingsResult<Job> {
        let job = self.jobs.mark_completed(job_id, result, Utc::now()).await?;

        metrics::counter!("standings_jobs_completed_total").increment(1);
        if let Some(duration) = job.duration_seconds() {
            metrics::histogram!("standings_job_duration_seconds").record(duration);
        }
        info!("任务 {} 完成，积分榜版本 {}", job.id, result.standings_version);

        if job.rerun_requested {
            self.enqueue_follow_up(&job).await;
        }

        Ok(job)
    }

    /// 记录一次失败
    ///
    /// 致命错误直接终止；其他错误在预算内回到 PENDING 并退避，预算用尽后终止。
    /// 终止时回滚到该任务保存的快照并写入审计。返回迁移后的任务。
    #[instrument(skip(self, failure), fields(error_code = failure.code()))]
    pub async fn fail(&self, job_id: i64, failure: &StandingsError) -> StandingsResult<Job> {
        if failure.is_fatal() {
            return self.fail_fatal(job_id, failure).await;
        }

        let job = self.processing_job(job_id).await?;
        let attempts = job.attempts + 1;
        self.apply_failure(job, attempts, &failure.to_string()).await
    }

    /// 不经过重试直接进入 FAILED
    #[instrument(skip(self, failure), fields(error_code = failure.code()))]
    pub async fn fail_fatal(&self, job_id: i64, failure: &StandingsError) -> StandingsResult<Job> {
        let job = self.processing_job(job_id).await?;
        let attempts = job.attempts + 1;
        self.terminate(job, attempts, &failure.to_string()).await
    }

    /// 回收租约过期的任务，过期计为一次失败
    pub async fn reclaim(&self) -> StandingsResult<Vec<Job>> {
        let now = Utc::now();
        let expired = self.jobs.find_expired_leases(now).await?;
        let mut reclaimed = Vec::with_capacity(expired.len());

        for job in expired {
            let job_id = job.id;
            warn!(
                "任务 {} 的租约已于 {:?} 过期 (worker {:?})",
                job_id, job.lease_expires_at, job.worker_id
            );
            let attempts = job.attempts + 1;
            match self.apply_failure(job, attempts, "租约过期").await {
                Ok(job) => {
                    metrics::counter!("standings_jobs_reclaimed_total").increment(1);
                    reclaimed.push(job);
                }
                // worker 在扫描之后刚好完成了任务
                Err(StandingsError::InvalidTransition { .. }) => {
                    debug!("任务 {} 在回收前已离开 PROCESSING", job_id);
                }
                Err(e) => return Err(e),
            }
        }

        if !reclaimed.is_empty() {
            info!("回收了 {} 个租约过期的任务", reclaimed.len());
        }
        Ok(reclaimed)
    }

    /// 取消 PENDING 任务，其他状态返回 `InvalidTransition`
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: i64) -> StandingsResult<()> {
        self.jobs.delete_pending(job_id).await?;
        info!("任务 {} 已取消", job_id);
        Ok(())
    }

    pub async fn get(&self, job_id: i64) -> StandingsResult<Job> {
        self.jobs
            .get_by_id(job_id)
            .await?
            .ok_or_else(|| StandingsError::job_not_found(job_id))
    }

    pub async fn list(&self, filter: &JobFilter) -> StandingsResult<Vec<Job>> {
        self.jobs.list(filter).await
    }

    async fn processing_job(&self, job_id: i64) -> StandingsResult<Job> {
        let job = self.get(job_id).await?;
        if job.status != JobStatus::Processing {
            return Err(StandingsError::invalid_transition(
                job_id,
                job.status,
                JobStatus::Failed,
            ));
        }
        Ok(job)
    }

    async fn apply_failure(&self, job: Job, attempts: i32, error: &str) -> StandingsResult<Job> {
        match self.retry_policy.decide(attempts, Utc::now()) {
            RetryDecision::Retry { available_at } => {
                let job = self
                    .jobs
                    .mark_retry(job.id, attempts, error, available_at)
                    .await?;
                metrics::counter!("standings_jobs_failed_total", "terminal" => "false")
                    .increment(1);
                warn!(
                    "任务 {} 第 {} 次失败，{} 之后重试: {}",
                    job.id, attempts, available_at, error
                );
                Ok(job)
            }
            RetryDecision::Exhausted => self.terminate(job, attempts, error).await,
        }
    }

    /// 回滚积分榜、写入审计，最后进入 FAILED
    ///
    /// 回滚期间任务仍是 PROCESSING，同一 key 的新任务不会被领取。
    async fn terminate(&self, job: Job, attempts: i32, error: &str) -> StandingsResult<Job> {
        let key = job.key();
        let before_hash = match self.snapshots.current(key).await {
            Ok(table) => table.state_hash(),
            Err(e) => {
                warn!("读取 {} 当前积分榜失败: {}", key, e);
                String::new()
            }
        };

        let (after_hash, details) = match self.snapshots.rollback_for_job(key, job.id).await {
            Ok(Some(table)) => (
                table.state_hash(),
                format!("{error}; 已回滚到版本 {}", table.version),
            ),
            Ok(None) => (before_hash.clone(), error.to_string()),
            Err(rollback_error) => {
                error!("任务 {} 回滚失败: {}", job.id, rollback_error);
                (
                    before_hash.clone(),
                    format!("{error}; 回滚失败: {rollback_error}"),
                )
            }
        };

        self.audit
            .log(
                AuditRecord::new(key, AuditAction::JobFailed, Actor::System)
                    .for_job(Some(job.id))
                    .hashes(before_hash, after_hash)
                    .details(details),
            )
            .await?;

        let failed = self
            .jobs
            .mark_failed(job.id, attempts, error, Utc::now())
            .await?;
        metrics::counter!("standings_jobs_failed_total", "terminal" => "true").increment(1);
        error!("任务 {} 最终失败 (共 {} 次): {}", job.id, attempts, error);

        if failed.rerun_requested {
            self.enqueue_follow_up(&failed).await;
        }
        Ok(failed)
    }

    /// 为处理期间收到新请求的终态任务排入后续任务
    ///
    /// 原任务已经离开 PROCESSING，入队失败只记录，不改变原任务的结果。
    async fn enqueue_follow_up(&self, job: &Job) {
        match self
            .enqueue(job.league_id, job.season_id, job.priority, "rerun_requested")
            .await
        {
            Ok(follow_up) => info!(
                "任务 {} 处理期间有新请求，已排入后续任务 {}",
                job.id, follow_up.job.id
            ),
            Err(e) => {
                metrics::counter!("standings_follow_up_enqueue_failed_total").increment(1);
                error!(
                    "任务 {} 的后续任务入队失败，{} 需要重新触发重算: {}",
                    job.id,
                    job.key(),
                    e
                );
            }
        }
    }
}
