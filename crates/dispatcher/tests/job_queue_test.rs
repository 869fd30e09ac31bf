use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use standings_config::{BackoffConfig, QueueConfig};
use standings_dispatcher::{AuditLogger, JobQueue, SnapshotManager};
use standings_domain::{
    AuditAction, AuditLogRepository, EnqueueOutcome, EnqueueRequest, JobFilter, JobRepository,
    JobResult, JobStatus, StandingsEntry, StandingsKey, StandingsRepository, StandingsTable,
};
use standings_errors::{StandingsError, StandingsResult};
use standings_infrastructure::{InMemoryJobRepository, InMemoryRepositories, InMemoryStandingsRepository};
use standings_testing_utils::{FailingJobRepository, InjectedFailure, StandingsEntryBuilder};

fn queue_config(max_retries: u32) -> QueueConfig {
    QueueConfig {
        max_retries,
        backoff: BackoffConfig {
            base_delay_seconds: 0,
            max_delay_seconds: 0,
            multiplier: 1.0,
            jitter_factor: 0.0,
        },
        ..QueueConfig::default()
    }
}

struct Harness {
    memory: InMemoryRepositories,
    queue: Arc<JobQueue>,
    snapshots: Arc<SnapshotManager>,
}

fn harness(config: QueueConfig) -> Harness {
    let memory = InMemoryRepositories::new();
    let repos = memory.repositories();
    let audit = Arc::new(AuditLogger::new(repos.audit_logs.clone()));
    let snapshots = Arc::new(SnapshotManager::new(
        repos.snapshots.clone(),
        repos.standings.clone(),
        audit.clone(),
    ));
    let queue = Arc::new(JobQueue::new(repos.jobs.clone(), snapshots.clone(), audit, config));
    Harness {
        memory,
        queue,
        snapshots,
    }
}

fn result(version: i64) -> JobResult {
    JobResult {
        snapshot_id: None,
        standings_version: version,
        before_hash: String::new(),
        after_hash: String::new(),
        warnings: vec![],
    }
}

#[tokio::test]
async fn test_enqueue_coalesces_into_active_job() {
    let h = harness(queue_config(3));

    let first = h.queue.enqueue(1, 2024, 5, "match_result_updated").await.unwrap();
    let second = h.queue.enqueue(1, 2024, 10, "manual_trigger").await.unwrap();
    let third = h.queue.enqueue(1, 2024, 1, "late_edit").await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.job.id, third.job.id);
    assert_eq!(third.job.priority, 10);
    assert_eq!(third.job.reasons.len(), 3);
    assert_eq!(h.memory.jobs.count().await, 1);
}

#[tokio::test]
async fn test_enqueue_rejects_invalid_requests() {
    let h = harness(queue_config(3));
    let err = h.queue.enqueue(0, 2024, 5, "x").await.unwrap_err();
    assert!(matches!(err, StandingsError::ValidationError(_)));
    let err = h.queue.enqueue(1, 2024, 5, "   ").await.unwrap_err();
    assert!(matches!(err, StandingsError::ValidationError(_)));
}

#[tokio::test]
async fn test_force_enqueue_uses_force_priority() {
    let h = harness(queue_config(3));
    let outcome = h.queue.force_enqueue(1, 2024, "ops").await.unwrap();
    assert_eq!(outcome.job.priority, 100);
}

#[tokio::test]
async fn test_dequeue_orders_by_priority_then_age() {
    let h = harness(queue_config(3));
    let oldest_normal = h.queue.enqueue(1, 2024, 5, "a").await.unwrap().job;
    let newer_normal = h.queue.enqueue(2, 2024, 5, "b").await.unwrap().job;
    let urgent = h.queue.enqueue(3, 2024, 100, "c").await.unwrap().job;

    let order: Vec<i64> = [
        h.queue.dequeue("w").await.unwrap().unwrap().id,
        h.queue.dequeue("w").await.unwrap().unwrap().id,
        h.queue.dequeue("w").await.unwrap().unwrap().id,
    ]
    .to_vec();
    assert_eq!(order, vec![urgent.id, oldest_normal.id, newer_normal.id]);
    assert!(h.queue.dequeue("w").await.unwrap().is_none());
}

#[tokio::test]
async fn test_dequeue_sets_lease() {
    let h = harness(queue_config(3));
    h.queue.enqueue(1, 2024, 5, "a").await.unwrap();
    let job = h.queue.dequeue("worker-1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.worker_id.as_deref(), Some("worker-1"));
    let lease = job.lease_expires_at.unwrap();
    assert!(lease > Utc::now() + chrono::Duration::seconds(100));
}

#[tokio::test]
async fn test_concurrent_dequeue_claims_once() {
    let h = harness(queue_config(3));
    h.queue.enqueue(1, 2024, 5, "a").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let queue = h.queue.clone();
        handles.push(tokio::spawn(async move { queue.dequeue(&format!("w{i}")).await }));
    }

    let mut claimed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(Some(_)) => claimed += 1,
            Ok(None) => {}
            Err(StandingsError::LockConflict { .. }) => {}
            Err(e) => panic!("意外的错误: {e}"),
        }
    }
    assert_eq!(claimed, 1);
}

#[tokio::test]
async fn test_single_writer_under_concurrent_enqueue_and_dequeue() {
    let h = harness(queue_config(3));
    let key = StandingsKey::new(7, 2024);
    let repos = h.memory.repositories();

    let mut handles = Vec::new();
    for i in 0..20 {
        let queue = h.queue.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                queue.enqueue(7, 2024, i, "edit").await.map(|_| ())
            } else {
                match queue.dequeue(&format!("w{i}")).await {
                    Ok(_) | Err(StandingsError::LockConflict { .. }) => Ok(()),
                    Err(e) => Err(e),
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
        let processing = repos.jobs.find_processing_for_key(key).await.unwrap();
        assert!(processing.len() <= 1);
    }

    let active: Vec<_> = repos
        .jobs
        .list(&JobFilter::for_key(key))
        .await
        .unwrap()
        .into_iter()
        .filter(|job| !job.is_terminal())
        .collect();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn test_complete_spawns_follow_up_for_rerun() {
    let h = harness(queue_config(3));
    h.queue.enqueue(1, 2024, 5, "first").await.unwrap();
    let job = h.queue.dequeue("w").await.unwrap().unwrap();

    // 处理中收到新的比分修改
    let coalesced = h.queue.enqueue(1, 2024, 10, "second").await.unwrap();
    assert!(!coalesced.created);
    assert_eq!(coalesced.job.id, job.id);
    assert!(coalesced.job.rerun_requested);

    let completed = h.queue.complete(job.id, &result(1)).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert_eq!(completed.result.as_ref().unwrap().standings_version, 1);

    let follow_up = h.queue.dequeue("w").await.unwrap().unwrap();
    assert_ne!(follow_up.id, job.id);
    assert_eq!(follow_up.priority, 10);
}

#[tokio::test]
async fn test_complete_without_rerun_leaves_queue_empty() {
    let h = harness(queue_config(3));
    h.queue.enqueue(1, 2024, 5, "first").await.unwrap();
    let job = h.queue.dequeue("w").await.unwrap().unwrap();
    h.queue.complete(job.id, &result(1)).await.unwrap();
    assert!(h.queue.dequeue("w").await.unwrap().is_none());

    // 已完成的任务不能再完成
    let err = h.queue.complete(job.id, &result(2)).await.unwrap_err();
    assert!(matches!(err, StandingsError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_retry_budget_ends_in_failed() {
    let h = harness(queue_config(2));
    let job_id = h.queue.enqueue(1, 2024, 5, "a").await.unwrap().job.id;

    let mut executions = 0;
    loop {
        let Some(job) = h.queue.dequeue("w").await.unwrap() else {
            break;
        };
        executions += 1;
        assert!(executions <= 10, "任务不应无限重试");
        let failed = h
            .queue
            .fail(job.id, &StandingsError::Timeout("读取比赛超时".to_string()))
            .await
            .unwrap();
        if failed.status == JobStatus::Failed {
            break;
        }
        assert_eq!(failed.status, JobStatus::Pending);
    }

    assert_eq!(executions, 3);
    let job = h.queue.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert!(job.last_error.unwrap().contains("读取比赛超时"));

    let audit = h.memory.audit_logs.list_for_job(job_id).await.unwrap();
    assert!(audit.iter().any(|entry| entry.action == AuditAction::JobFailed));
}

#[tokio::test]
async fn test_backoff_delays_next_attempt() {
    let config = QueueConfig {
        backoff: BackoffConfig {
            base_delay_seconds: 60,
            max_delay_seconds: 300,
            multiplier: 2.0,
            jitter_factor: 0.0,
        },
        ..QueueConfig::default()
    };
    let h = harness(config);
    h.queue.enqueue(1, 2024, 5, "a").await.unwrap();
    let job = h.queue.dequeue("w").await.unwrap().unwrap();

    let retried = h
        .queue
        .fail(job.id, &StandingsError::Timeout("x".to_string()))
        .await
        .unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert!(retried.available_at > Utc::now() + chrono::Duration::seconds(50));
    assert!(h.queue.dequeue("w").await.unwrap().is_none());
}

#[tokio::test]
async fn test_fatal_failure_rolls_back_and_skips_retry() {
    let h = harness(queue_config(3));
    let key = StandingsKey::new(1, 2024);
    let repos = h.memory.repositories();
    let before = vec![StandingsEntryBuilder::new(1, "A").record(1, 0, 0, 2, 0).rank(1).build()];
    let broken = vec![StandingsEntryBuilder::new(1, "A").record(0, 0, 1, 0, 2).rank(1).build()];

    repos
        .standings
        .compare_and_commit(key, 0, &before, None, Utc::now())
        .await
        .unwrap();

    h.queue.enqueue(1, 2024, 5, "a").await.unwrap();
    let job = h.queue.dequeue("w").await.unwrap().unwrap();
    h.snapshots.snapshot(key, Some(job.id)).await.unwrap();
    repos
        .standings
        .compare_and_commit(key, 1, &broken, Some(job.id), Utc::now())
        .await
        .unwrap();

    let failed = h
        .queue
        .fail(
            job.id,
            &StandingsError::InvariantViolation("积分榜行数与球队数不一致".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts, 1);
    assert!(failed.last_error.unwrap().contains("积分榜行数"));

    let current = repos.standings.get(key).await.unwrap();
    assert_eq!(current.entries, before);

    let audit = repos.audit_logs.list_for_job(job.id).await.unwrap();
    let actions: Vec<AuditAction> = audit.iter().map(|entry| entry.action).collect();
    assert_eq!(actions, vec![AuditAction::RolledBack, AuditAction::JobFailed]);
    assert_eq!(audit[1].after_hash, current.state_hash());
}

#[tokio::test]
async fn test_fail_requires_processing() {
    let h = harness(queue_config(3));
    let job = h.queue.enqueue(1, 2024, 5, "a").await.unwrap().job;
    let err = h
        .queue
        .fail(job.id, &StandingsError::Timeout("x".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, StandingsError::InvalidTransition { .. }));

    let err = h
        .queue
        .fail(999, &StandingsError::Timeout("x".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, StandingsError::JobNotFound { id: 999 }));
}

#[tokio::test]
async fn test_cancel_only_pending_jobs() {
    let h = harness(queue_config(3));
    let pending = h.queue.enqueue(1, 2024, 5, "a").await.unwrap().job;
    h.queue.cancel(pending.id).await.unwrap();
    assert!(matches!(
        h.queue.get(pending.id).await.unwrap_err(),
        StandingsError::JobNotFound { .. }
    ));

    h.queue.enqueue(2, 2024, 5, "b").await.unwrap();
    let processing = h.queue.dequeue("w").await.unwrap().unwrap();
    let err = h.queue.cancel(processing.id).await.unwrap_err();
    assert!(matches!(err, StandingsError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_list_filters_by_key_and_status() {
    let h = harness(queue_config(3));
    h.queue.enqueue(1, 2024, 5, "a").await.unwrap();
    h.queue.enqueue(2, 2024, 5, "b").await.unwrap();
    h.queue.dequeue("w").await.unwrap();

    let all = h.queue.list(&JobFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let pending = h
        .queue
        .list(&JobFilter::default().with_status(JobStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    let league_two = h
        .queue
        .list(&JobFilter::for_key(StandingsKey::new(2, 2024)))
        .await
        .unwrap();
    assert_eq!(league_two.len(), 1);
}

#[tokio::test]
async fn test_complete_survives_failed_follow_up() {
    let memory = InMemoryRepositories::new();
    let repos = memory.repositories();
    let jobs = Arc::new(FailingJobRepository::new(repos.jobs.clone()));
    let audit = Arc::new(AuditLogger::new(repos.audit_logs.clone()));
    let snapshots = Arc::new(SnapshotManager::new(
        repos.snapshots.clone(),
        repos.standings.clone(),
        audit.clone(),
    ));
    let queue = JobQueue::new(jobs.clone(), snapshots, audit, queue_config(3));

    queue.enqueue(1, 2024, 5, "first").await.unwrap();
    let job = queue.dequeue("w").await.unwrap().unwrap();
    queue.enqueue(1, 2024, 5, "second").await.unwrap();

    // 后续任务的每次入队尝试都失败
    jobs.fail_upserts(3, InjectedFailure::Transient("database is locked".to_string()));
    let completed = queue.complete(job.id, &result(1)).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(jobs.upsert_count(), 5);

    let stored = queue.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(queue.dequeue("w").await.unwrap().is_none());
}

#[tokio::test]
async fn test_follow_up_enqueue_retries_transient_errors() {
    let memory = InMemoryRepositories::new();
    let repos = memory.repositories();
    let jobs = Arc::new(FailingJobRepository::new(repos.jobs.clone()));
    let audit = Arc::new(AuditLogger::new(repos.audit_logs.clone()));
    let snapshots = Arc::new(SnapshotManager::new(
        repos.snapshots.clone(),
        repos.standings.clone(),
        audit.clone(),
    ));
    let queue = JobQueue::new(jobs.clone(), snapshots, audit, queue_config(3));

    queue.enqueue(1, 2024, 5, "first").await.unwrap();
    let job = queue.dequeue("w").await.unwrap().unwrap();
    queue.enqueue(1, 2024, 8, "second").await.unwrap();

    jobs.fail_upserts(2, InjectedFailure::Transient("database is locked".to_string()));
    queue.complete(job.id, &result(1)).await.unwrap();

    let follow_up = queue.dequeue("w").await.unwrap().unwrap();
    assert_ne!(follow_up.id, job.id);
    assert_eq!(follow_up.priority, 8);
}

/// 在回滚写入积分榜时模拟一个并发的入队请求，并记录此时任务的状态
struct InterleavingStandings {
    inner: Arc<InMemoryStandingsRepository>,
    jobs: Arc<InMemoryJobRepository>,
    watched_job: i64,
    seen: Mutex<Vec<(JobStatus, EnqueueOutcome)>>,
}

#[async_trait]
impl StandingsRepository for InterleavingStandings {
    async fn get(&self, key: StandingsKey) -> StandingsResult<StandingsTable> {
        self.inner.get(key).await
    }

    async fn compare_and_commit(
        &self,
        key: StandingsKey,
        expected_version: i64,
        entries: &[StandingsEntry],
        job_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> StandingsResult<StandingsTable> {
        if job_id == Some(self.watched_job) {
            let status = self.jobs.get_by_id(self.watched_job).await?.map(|job| job.status);
            let request = EnqueueRequest::new(key.league_id, key.season_id, 5, "late_edit");
            let outcome = self.jobs.upsert_active(&request, now).await?;
            if let Some(status) = status {
                self.seen.lock().unwrap().push((status, outcome));
            }
        }
        self.inner
            .compare_and_commit(key, expected_version, entries, job_id, now)
            .await
    }

    async fn count(&self, since: Option<DateTime<Utc>>) -> StandingsResult<i64> {
        self.inner.count(since).await
    }
}

#[tokio::test]
async fn test_terminal_failure_rolls_back_while_job_is_still_processing() {
    let memory = InMemoryRepositories::new();
    let repos = memory.repositories();
    let key = StandingsKey::new(1, 2024);
    let before = vec![StandingsEntryBuilder::new(1, "A").record(1, 0, 0, 2, 0).rank(1).build()];
    let broken = vec![StandingsEntryBuilder::new(1, "A").record(0, 0, 1, 0, 2).rank(1).build()];
    memory
        .standings
        .compare_and_commit(key, 0, &before, None, Utc::now())
        .await
        .unwrap();

    let first = memory
        .jobs
        .upsert_active(&EnqueueRequest::new(1, 2024, 5, "a"), Utc::now())
        .await
        .unwrap()
        .job;
    let standings = Arc::new(InterleavingStandings {
        inner: memory.standings.clone(),
        jobs: memory.jobs.clone(),
        watched_job: first.id,
        seen: Mutex::new(Vec::new()),
    });
    let audit = Arc::new(AuditLogger::new(repos.audit_logs.clone()));
    let snapshots = Arc::new(SnapshotManager::new(
        repos.snapshots.clone(),
        standings.clone(),
        audit.clone(),
    ));
    let queue = JobQueue::new(repos.jobs.clone(), snapshots.clone(), audit, queue_config(3));

    let job = queue.dequeue("w").await.unwrap().unwrap();
    assert_eq!(job.id, first.id);
    snapshots.snapshot(key, Some(job.id)).await.unwrap();
    memory
        .standings
        .compare_and_commit(key, 1, &broken, Some(job.id), Utc::now())
        .await
        .unwrap();

    let failed = queue
        .fail(job.id, &StandingsError::InvariantViolation("积分榜损坏".to_string()))
        .await
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);

    // 回滚写入时任务仍是 PROCESSING，并发的入队合并进了这个任务
    let seen = standings.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, JobStatus::Processing);
    assert!(!seen[0].1.created);
    assert_eq!(seen[0].1.job.id, job.id);

    let current = memory.standings.get(key).await.unwrap();
    assert_eq!(current.entries, before);
    assert_eq!(current.version, 3);

    let audit = memory.audit_logs.list_for_job(job.id).await.unwrap();
    let actions: Vec<AuditAction> = audit.iter().map(|entry| entry.action).collect();
    assert_eq!(actions, vec![AuditAction::RolledBack, AuditAction::JobFailed]);

    // 合并进来的请求在任务终止后排成新任务
    let follow_up = queue.dequeue("w").await.unwrap().unwrap();
    assert_ne!(follow_up.id, job.id);
    assert_eq!(follow_up.reasons.last().map(String::as_str), Some("rerun_requested"));
}

#[tokio::test]
async fn test_terminal_failure_restores_the_failing_jobs_own_snapshot() {
    let h = harness(queue_config(3));
    let key = StandingsKey::new(1, 2024);
    let repos = h.memory.repositories();
    let before = vec![StandingsEntryBuilder::new(1, "A").record(1, 0, 0, 2, 0).rank(1).build()];
    let broken = vec![StandingsEntryBuilder::new(1, "A").record(0, 0, 1, 0, 2).rank(1).build()];
    repos
        .standings
        .compare_and_commit(key, 0, &before, None, Utc::now())
        .await
        .unwrap();

    h.queue.enqueue(1, 2024, 5, "a").await.unwrap();
    let job = h.queue.dequeue("w").await.unwrap().unwrap();
    h.snapshots.snapshot(key, Some(job.id)).await.unwrap();
    repos
        .standings
        .compare_and_commit(key, 1, &broken, Some(job.id), Utc::now())
        .await
        .unwrap();
    // 之后出现一个不属于该任务的更新快照
    let foreign = h.snapshots.snapshot(key, None).await.unwrap();
    assert_eq!(h.snapshots.latest(key).await.unwrap().unwrap().id, foreign.id);

    h.queue
        .fail_fatal(job.id, &StandingsError::StorageUnavailable("磁盘故障".to_string()))
        .await
        .unwrap();

    let current = repos.standings.get(key).await.unwrap();
    assert_eq!(current.entries, before);
}
