//! 端到端测试：通过组装好的 Application 驱动入队、worker 重算、快照恢复与保留期清理

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use standings::{AppMode, Application, ShutdownManager, MEMORY_DATABASE_URL};
use standings_config::{AppConfig, BackoffConfig};
use standings_domain::{
    compute, Actor, AuditAction, AuditLogRepository, CalculationWarning, JobFilter, JobStatus,
    MatchSet, StandingsKey, TiebreakConfig,
};
use standings_infrastructure::{InMemoryRepositories, Repositories};
use standings_testing_utils::{
    MatchSetBuilder, ScriptedMatchRepository, TestAssertions, TestEnv,
};
use standings_worker::RecalculationExecutor;
use tokio::task::JoinHandle;

const LEAGUE: i64 = 10;
const SEASON: i64 = 2024;

fn key() -> StandingsKey {
    StandingsKey::new(LEAGUE, SEASON)
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = MEMORY_DATABASE_URL.to_string();
    config.api.enabled = false;
    config.worker.concurrency = 2;
    config.worker.worker_id_prefix = Some("e2e".to_string());
    config.queue.poll_interval_ms = 10;
    config.queue.backoff = BackoffConfig {
        base_delay_seconds: 0,
        max_delay_seconds: 0,
        multiplier: 1.0,
        jitter_factor: 0.0,
    };
    config
}

/// A 3-1 B，B 2-0 C，A 1-1 C
fn scenario() -> MatchSetBuilder {
    MatchSetBuilder::new()
        .team(1, "A")
        .team(2, "B")
        .team(3, "C")
        .result(1, 2, 3, 1)
        .result(2, 3, 2, 0)
        .result(1, 3, 1, 1)
}

struct TestApp {
    memory: InMemoryRepositories,
    app: Arc<Application>,
}

impl TestApp {
    async fn new(config: AppConfig, match_set: MatchSet) -> Self {
        let memory = InMemoryRepositories::new();
        memory.matches.put(key(), match_set).await;
        let app = Application::with_repositories(config, memory.repositories(), None);
        Self {
            memory,
            app: Arc::new(app),
        }
    }

    fn with_matches(config: AppConfig, matches: &ScriptedMatchRepository) -> Self {
        let memory = InMemoryRepositories::new();
        let repositories = Repositories {
            matches: Arc::new(matches.clone()),
            ..memory.repositories()
        };
        let app = Application::with_repositories(config, repositories, None);
        Self {
            memory,
            app: Arc::new(app),
        }
    }

    fn start_workers(&self) -> (ShutdownManager, JoinHandle<anyhow::Result<()>>) {
        let shutdown = ShutdownManager::new();
        let app = self.app.clone();
        let manager = shutdown.clone();
        let handle = tokio::spawn(async move {
            let rx = manager.subscribe().await;
            app.run(AppMode::Worker, rx).await
        });
        (shutdown, handle)
    }

    async fn wait_for_status(&self, job_id: i64, status: JobStatus) -> bool {
        let queue = self.app.queue().clone();
        TestEnv::wait_for(
            || {
                let queue = queue.clone();
                async move {
                    queue
                        .get(job_id)
                        .await
                        .map(|job| job.status == status)
                        .unwrap_or(false)
                }
            },
            Duration::from_secs(5),
        )
        .await
    }

    async fn recalculate(&self, reason: &str) -> i64 {
        let outcome = self
            .app
            .queue()
            .enqueue(LEAGUE, SEASON, 5, reason)
            .await
            .unwrap();
        let (shutdown, handle) = self.start_workers();
        assert!(self.wait_for_status(outcome.job.id, JobStatus::Completed).await);
        shutdown.shutdown().await;
        handle.await.unwrap().unwrap();
        outcome.job.id
    }
}

#[tokio::test]
async fn test_scenario_standings_after_recalculation() {
    let env = TestApp::new(test_config(), scenario().build()).await;
    let job_id = env.recalculate("match_result_updated").await;

    let table = env.app.snapshots().current(key()).await.unwrap();
    assert_eq!(table.version, 1);
    assert_eq!(table.job_id, Some(job_id));
    TestAssertions::assert_team_order(&table.entries, &["A", "B", "C"]);

    let a = &table.entries[0];
    assert_eq!((a.points, a.won, a.drawn, a.lost), (4, 1, 1, 0));
    assert_eq!((a.goals_for, a.goals_against, a.goal_difference), (4, 2, 2));
    let b = &table.entries[1];
    assert_eq!((b.points, b.won, b.drawn, b.lost), (3, 1, 0, 1));
    assert_eq!((b.goals_for, b.goals_against, b.goal_difference), (3, 3, 0));
    let c = &table.entries[2];
    assert_eq!((c.points, c.won, c.drawn, c.lost), (1, 0, 1, 1));
    assert_eq!((c.goals_for, c.goals_against, c.goal_difference), (1, 3, -2));

    // 快照保存的是重算前的空表
    let snapshots = env.app.snapshots().list(key(), 10).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].standings_version, 0);
    assert_eq!(snapshots[0].job_id, Some(job_id));

    let job = env.app.queue().get(job_id).await.unwrap();
    let result = job.result.unwrap();
    assert_eq!(result.standings_version, 1);
    assert_eq!(result.after_hash, table.state_hash());
    assert!(result.warnings.is_empty());

    let audit = env.memory.audit_logs.list_for_job(job_id).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::Recalculated);
    assert_eq!(audit[0].actor, Actor::System);
    assert_eq!(audit[0].after_hash, table.state_hash());
}

#[tokio::test]
async fn test_partial_data_excludes_unscored_match() {
    let match_set = scenario()
        .team(4, "D")
        .team(5, "E")
        .scheduled(4, 5)
        .build();
    let env = TestApp::new(test_config(), match_set).await;
    let job_id = env.recalculate("match_result_updated").await;

    let table = env.app.snapshots().current(key()).await.unwrap();
    TestAssertions::assert_team_order(&table.entries, &["A", "B", "C", "D", "E"]);
    assert_eq!(table.entries[0].points, 4);
    assert_eq!(table.entries[1].points, 3);
    assert_eq!(table.entries[2].points, 1);
    for entry in &table.entries[3..] {
        assert_eq!(entry.played, 0);
        assert_eq!(entry.points, 0);
    }

    let result = env.app.queue().get(job_id).await.unwrap().result.unwrap();
    assert_eq!(
        result.warnings,
        vec![CalculationWarning::MissingScore { match_id: 4 }]
    );
}

#[tokio::test]
async fn test_concurrent_claims_yield_single_writer() {
    let env = TestApp::new(test_config(), scenario().build()).await;
    let queue = env.app.queue().clone();

    let enqueues: Vec<_> = (0..10)
        .map(|i| {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue(LEAGUE, SEASON, 5, &format!("edit-{i}"))
                    .await
                    .unwrap()
            })
        })
        .collect();
    let mut job_ids = Vec::new();
    for handle in enqueues {
        job_ids.push(handle.await.unwrap().job.id);
    }
    job_ids.dedup();
    assert_eq!(job_ids.len(), 1, "同一 key 的并发入队应合并为一个任务");

    let claims: Vec<_> = (0..8)
        .map(|i| {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(&format!("worker-{i}")).await })
        })
        .collect();
    let mut claimed = 0;
    for handle in claims {
        if let Ok(Some(_)) = handle.await.unwrap() {
            claimed += 1;
        }
    }
    assert_eq!(claimed, 1);

    let processing = queue
        .list(&JobFilter::for_key(key()).with_status(JobStatus::Processing))
        .await
        .unwrap();
    assert_eq!(processing.len(), 1);
    queue.assert_single_writer(key()).await.unwrap();
}

#[tokio::test]
async fn test_restore_reproduces_snapshotted_state() {
    let env = TestApp::new(test_config(), scenario().build()).await;
    env.recalculate("initial").await;

    let original = env.app.snapshots().current(key()).await.unwrap();
    let snapshot = env.app.snapshots().snapshot(key(), None).await.unwrap();
    assert_eq!(snapshot.standings_version, original.version);

    // 比分更正为 B 0-3 C 后 C 凭净胜球领先
    let corrected = MatchSetBuilder::new()
        .team(1, "A")
        .team(2, "B")
        .team(3, "C")
        .result(1, 2, 3, 1)
        .result(2, 3, 0, 3)
        .result(1, 3, 1, 1)
        .build();
    env.memory.matches.put(key(), corrected).await;
    env.recalculate("score_corrected").await;

    let changed = env.app.snapshots().current(key()).await.unwrap();
    TestAssertions::assert_team_order(&changed.entries, &["C", "A", "B"]);
    assert_ne!(changed.state_hash(), original.state_hash());

    let restored = env
        .app
        .snapshots()
        .restore(snapshot.id, Actor::Manual, None)
        .await
        .unwrap();
    assert_eq!(restored.entries, original.entries);
    assert_eq!(restored.state_hash(), original.state_hash());
    assert_eq!(restored.version, changed.version + 1);

    let history = env.memory.audit_logs.list_for_key(key(), 1).await.unwrap();
    assert_eq!(history[0].action, AuditAction::Restored);
    assert_eq!(history[0].before_hash, changed.state_hash());
    assert_eq!(history[0].after_hash, original.state_hash());
}

#[tokio::test]
async fn test_transient_failures_beyond_budget_end_in_failed() {
    let mut config = test_config();
    config.queue.max_retries = 2;
    let matches = ScriptedMatchRepository::with_match_set(key(), scenario().build());
    matches.fail_transient(10);
    let env = TestApp::with_matches(config, &matches);

    let outcome = env.app.queue().enqueue(LEAGUE, SEASON, 5, "flaky").await.unwrap();
    let (shutdown, handle) = env.start_workers();
    assert!(env.wait_for_status(outcome.job.id, JobStatus::Failed).await);
    // 终态之后不会再有读取
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.shutdown().await;
    handle.await.unwrap().unwrap();

    let job = env.app.queue().get(outcome.job.id).await.unwrap();
    assert_eq!(job.attempts, 3);
    assert!(job.last_error.is_some());
    assert_eq!(matches.load_count(), 3);

    let table = env.app.snapshots().current(key()).await.unwrap();
    assert_eq!(table.version, 0);
    assert!(table.entries.is_empty());

    let audit = env.memory.audit_logs.list_for_job(job.id).await.unwrap();
    assert!(audit.iter().any(|entry| entry.action == AuditAction::JobFailed));
}

#[tokio::test]
async fn test_retention_boundary_for_completed_jobs() {
    let env = TestApp::new(test_config(), scenario().build()).await;
    let completed_id = env.recalculate("initial").await;
    let pending = env
        .app
        .queue()
        .enqueue(LEAGUE + 1, SEASON, 5, "waiting")
        .await
        .unwrap();

    // 默认保留 7 天
    let report = env
        .app
        .sweeper()
        .run_at(Utc::now() + chrono::Duration::days(6))
        .await
        .unwrap();
    assert_eq!(report.jobs_deleted, 0);
    assert!(env.app.queue().get(completed_id).await.is_ok());

    let report = env
        .app
        .sweeper()
        .run_at(Utc::now() + chrono::Duration::days(8))
        .await
        .unwrap();
    assert_eq!(report.jobs_deleted, 1);
    assert!(env.app.queue().get(completed_id).await.is_err());

    // 非终态任务和当前积分榜不受影响
    assert!(env.app.queue().get(pending.job.id).await.is_ok());
    let table = env.app.snapshots().current(key()).await.unwrap();
    assert_eq!(table.version, 1);
}

#[tokio::test]
async fn test_crash_between_snapshot_and_commit_is_recovered() {
    let mut config = test_config();
    config.queue.lease_seconds = 0;
    let env = TestApp::new(config, scenario().build()).await;
    let queue = env.app.queue().clone();

    let outcome = queue.enqueue(LEAGUE, SEASON, 5, "initial").await.unwrap();
    let claimed = queue.dequeue("crashed-worker").await.unwrap().unwrap();
    assert_eq!(claimed.id, outcome.job.id);

    // worker 保存快照后崩溃，没有提交
    env.app.snapshots().snapshot(key(), Some(claimed.id)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let reclaimed = queue.reclaim().await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].status, JobStatus::Pending);
    assert_eq!(reclaimed[0].attempts, 1);

    let untouched = env.app.snapshots().current(key()).await.unwrap();
    assert_eq!(untouched.version, 0);
    assert!(untouched.entries.is_empty());

    let repositories = env.memory.repositories();
    let executor = RecalculationExecutor::new(
        repositories.standings.clone(),
        repositories.matches.clone(),
        env.app.snapshots().clone(),
        Arc::new(standings_dispatcher::AuditLogger::new(
            repositories.audit_logs.clone(),
        )),
    );
    let retry = queue.dequeue("healthy-worker").await.unwrap().unwrap();
    assert_eq!(retry.id, claimed.id);
    let result = executor.execute(&retry).await.unwrap();
    let job = queue.complete(retry.id, &result).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(result.standings_version, 1);
    let table = env.app.snapshots().current(key()).await.unwrap();
    TestAssertions::assert_team_order(&table.entries, &["A", "B", "C"]);
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let match_set = scenario().team(4, "D").team(5, "E").scheduled(4, 5).build();
    let config = TiebreakConfig::default();
    assert_eq!(compute(&match_set, &config), compute(&match_set, &config));

    let env = TestApp::new(test_config(), match_set).await;
    let first = env.recalculate("initial").await;
    let second = env.recalculate("replayed").await;

    let first = env.app.queue().get(first).await.unwrap().result.unwrap();
    let second = env.app.queue().get(second).await.unwrap().result.unwrap();
    assert_eq!(second.before_hash, first.after_hash);
    assert_eq!(second.after_hash, first.after_hash);
    assert_eq!(second.standings_version, first.standings_version + 1);
}
