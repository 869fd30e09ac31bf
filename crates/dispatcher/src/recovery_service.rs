use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use standings_errors::StandingsResult;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info};

use crate::job_queue::JobQueue;

/// 一次回收的结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// 回到 PENDING 的任务
    pub requeued: Vec<i64>,
    /// 因预算用尽进入 FAILED 的任务
    pub failed: Vec<i64>,
    pub recovery_duration_ms: u64,
}

/// 租约回收服务
///
/// worker 崩溃后任务停留在 PROCESSING，租约过期后由这里放回队列或终止。
pub struct LeaseRecoveryService {
    queue: Arc<JobQueue>,
    interval: Duration,
}

impl LeaseRecoveryService {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        let interval = Duration::from_secs(queue.config().reclaim_interval_seconds.max(1));
        Self { queue, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 执行一次回收
    pub async fn recover_once(&self) -> StandingsResult<RecoveryReport> {
        let start_time = std::time::Instant::now();
        let reclaimed = self.queue.reclaim().await?;

        let mut report = RecoveryReport::default();
        for job in reclaimed {
            if job.is_terminal() {
                report.failed.push(job.id);
            } else {
                report.requeued.push(job.id);
            }
        }
        report.recovery_duration_ms = start_time.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// 周期回收，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("启动租约回收，间隔 {:?}", self.interval);
        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.recover_once().await {
                        Ok(report) if !report.requeued.is_empty() || !report.failed.is_empty() => {
                            info!(
                                "租约回收: 重新排队 {:?}, 终止 {:?}",
                                report.requeued, report.failed
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("租约回收失败: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止租约回收");
                    break;
                }
            }
        }
    }
}
