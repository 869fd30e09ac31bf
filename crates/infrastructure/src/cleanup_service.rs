use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use standings_config::RetentionConfig;
use standings_errors::StandingsResult;
use std::future::Future;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::repositories::Repositories;

/// 一次清理的结果
#[derive(Debug, Default, Clone, Serialize)]
pub struct RetentionReport {
    pub jobs_deleted: u64,
    pub snapshots_deleted: u64,
    pub audit_entries_deleted: u64,
    /// 耗时（毫秒）
    pub duration_ms: u64,
}

impl RetentionReport {
    pub fn total_deleted(&self) -> u64 {
        self.jobs_deleted + self.snapshots_deleted + self.audit_entries_deleted
    }

    pub fn has_cleanup(&self) -> bool {
        self.total_deleted() > 0
    }
}

/// 保留期清理服务
///
/// 只删除终态任务、过期快照（保留每个 key 最新的若干个）和过期审计记录，
/// 从不触碰 PENDING/PROCESSING 任务和当前积分榜，可以与队列并发运行，也可以重复运行。
pub struct RetentionSweeper {
    repositories: Repositories,
    config: RetentionConfig,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RetentionSweeper {
    pub fn new(repositories: Repositories, config: RetentionConfig) -> Self {
        Self {
            repositories,
            config,
            shutdown_tx: Mutex::new(None),
            sweep_handle: Mutex::new(None),
        }
    }

    /// 启动周期清理
    pub async fn start(&self) -> StandingsResult<()> {
        if !self.config.enabled {
            info!("保留期清理已禁用");
            return Ok(());
        }

        let mut handle_slot = self.sweep_handle.lock().await;
        if handle_slot.is_some() {
            warn!("保留期清理已在运行");
            return Ok(());
        }

        info!(
            "启动保留期清理: 间隔 {}s, 任务 {}天, 快照 {}天(至少保留{}个), 审计 {}天",
            self.config.interval_seconds,
            self.config.job_ttl_days,
            self.config.snapshot_ttl_days,
            self.config.min_keep_snapshots,
            self.config.audit_ttl_days
        );

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let repositories = self.repositories.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut sweep_interval =
                interval(std::time::Duration::from_secs(config.interval_seconds));

            loop {
                tokio::select! {
                    _ = sweep_interval.tick() => {
                        if let Err(e) = Self::sweep(&repositories, &config, Utc::now()).await {
                            error!("保留期清理失败: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("收到保留期清理停止信号");
                        break;
                    }
                }
            }
        });

        *handle_slot = Some(handle);
        Ok(())
    }

    /// 停止周期清理并等待后台任务退出
    pub async fn stop(&self) -> StandingsResult<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.lock().await.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.sweep_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("等待保留期清理退出时出错: {}", e);
            }
        }

        info!("保留期清理已停止");
        Ok(())
    }

    /// 立即执行一次清理，不受 enabled 开关影响
    pub async fn run_once(&self) -> StandingsResult<RetentionReport> {
        self.run_at(Utc::now()).await
    }

    /// 以指定时间为“现在”执行一次清理
    pub async fn run_at(&self, now: DateTime<Utc>) -> StandingsResult<RetentionReport> {
        Self::sweep(&self.repositories, &self.config, now).await
    }

    async fn sweep(
        repositories: &Repositories,
        config: &RetentionConfig,
        now: DateTime<Utc>,
    ) -> StandingsResult<RetentionReport> {
        let start_time = std::time::Instant::now();
        let batch_size = config.batch_size as i64;
        let mut report = RetentionReport::default();

        let job_cutoff = now - Duration::days(config.job_ttl_days as i64);
        report.jobs_deleted = drain(batch_size, || {
            repositories.jobs.delete_terminal_before(job_cutoff, batch_size)
        })
        .await?;

        let snapshot_cutoff = now - Duration::days(config.snapshot_ttl_days as i64);
        let keep_latest = config.min_keep_snapshots as i64;
        report.snapshots_deleted = drain(batch_size, || {
            repositories
                .snapshots
                .delete_expired(snapshot_cutoff, keep_latest, batch_size)
        })
        .await?;

        let audit_cutoff = now - Duration::days(config.audit_ttl_days as i64);
        report.audit_entries_deleted = drain(batch_size, || {
            repositories.audit_logs.delete_before(audit_cutoff, batch_size)
        })
        .await?;

        report.duration_ms = start_time.elapsed().as_millis() as u64;

        metrics::counter!("standings_retention_deleted_total", "entity" => "jobs")
            .increment(report.jobs_deleted);
        metrics::counter!("standings_retention_deleted_total", "entity" => "snapshots")
            .increment(report.snapshots_deleted);
        metrics::counter!("standings_retention_deleted_total", "entity" => "audit_logs")
            .increment(report.audit_entries_deleted);

        if report.has_cleanup() {
            info!(
                "保留期清理完成: 任务 {}, 快照 {}, 审计 {}, 耗时 {}ms",
                report.jobs_deleted,
                report.snapshots_deleted,
                report.audit_entries_deleted,
                report.duration_ms
            );
        } else {
            debug!("保留期清理完成，没有需要删除的数据");
        }

        Ok(report)
    }
}

/// 反复执行分批删除，直到某一批不满
async fn drain<F, Fut>(batch_size: i64, mut delete_batch: F) -> StandingsResult<u64>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StandingsResult<u64>>,
{
    let mut total = 0;
    loop {
        let deleted = delete_batch().await?;
        total += deleted;
        if (deleted as i64) < batch_size {
            return Ok(total);
        }
    }
}
