use std::sync::Arc;
use std::time::Duration;

use standings_config::{BackoffConfig, QueueConfig};
use standings_dispatcher::{AuditLogger, JobQueue, LeaseRecoveryService, SnapshotManager};
use standings_domain::JobStatus;
use standings_infrastructure::InMemoryRepositories;
use tokio::sync::broadcast;

fn build_queue(config: QueueConfig) -> (InMemoryRepositories, Arc<JobQueue>) {
    let memory = InMemoryRepositories::new();
    let repos = memory.repositories();
    let audit = Arc::new(AuditLogger::new(repos.audit_logs.clone()));
    let snapshots = Arc::new(SnapshotManager::new(
        repos.snapshots.clone(),
        repos.standings.clone(),
        audit.clone(),
    ));
    let queue = Arc::new(JobQueue::new(repos.jobs.clone(), snapshots, audit, config));
    (memory, queue)
}

fn expiring_queue(max_retries: u32) -> (InMemoryRepositories, Arc<JobQueue>) {
    build_queue(QueueConfig {
        // 领取后租约立即过期，模拟 worker 崩溃
        lease_seconds: 0,
        max_retries,
        backoff: BackoffConfig {
            base_delay_seconds: 0,
            max_delay_seconds: 0,
            multiplier: 1.0,
            jitter_factor: 0.0,
        },
        ..QueueConfig::default()
    })
}

#[tokio::test]
async fn test_expired_lease_is_requeued() {
    let (_memory, queue) = expiring_queue(3);
    let job = queue.enqueue(1, 2024, 5, "a").await.unwrap().job;
    queue.dequeue("crashed-worker").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let service = LeaseRecoveryService::new(queue.clone());
    let report = service.recover_once().await.unwrap();
    assert_eq!(report.requeued, vec![job.id]);
    assert!(report.failed.is_empty());

    let requeued = queue.get(job.id).await.unwrap();
    assert_eq!(requeued.status, JobStatus::Pending);
    assert_eq!(requeued.attempts, 1);
    assert!(requeued.worker_id.is_none());
    assert_eq!(requeued.last_error.as_deref(), Some("租约过期"));

    // 另一个 worker 可以重新领取
    let reclaimed = queue.dequeue("healthy-worker").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, job.id);
}

#[tokio::test]
async fn test_crash_loop_ends_in_failed() {
    let (_memory, queue) = expiring_queue(1);
    let job = queue.enqueue(1, 2024, 5, "a").await.unwrap().job;
    let service = LeaseRecoveryService::new(queue.clone());

    queue.dequeue("w1").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(service.recover_once().await.unwrap().requeued, vec![job.id]);

    queue.dequeue("w2").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let report = service.recover_once().await.unwrap();
    assert_eq!(report.failed, vec![job.id]);

    assert_eq!(queue.get(job.id).await.unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn test_live_lease_is_not_reclaimed() {
    let (_memory, healthy) = build_queue(QueueConfig::default());
    healthy.enqueue(1, 2024, 5, "a").await.unwrap();
    healthy.dequeue("w").await.unwrap().unwrap();

    let report = LeaseRecoveryService::new(healthy).recover_once().await.unwrap();
    assert!(report.requeued.is_empty());
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let (_memory, queue) = expiring_queue(3);
    let job = queue.enqueue(1, 2024, 5, "a").await.unwrap().job;
    queue.dequeue("w").await.unwrap().unwrap();

    let service = LeaseRecoveryService::new(queue.clone()).with_interval(Duration::from_millis(10));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { service.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(queue.get(job.id).await.unwrap().status, JobStatus::Pending);
}
