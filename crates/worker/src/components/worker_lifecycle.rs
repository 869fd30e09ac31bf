use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use standings_dispatcher::JobQueue;
use standings_domain::{Job, JobStatus};
use standings_errors::{StandingsError, StandingsResult};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{LeaseHeartbeat, RecalculationExecutor};

/// 单个调度循环：领取 -> 执行 -> 完成或失败
pub struct RecalculationWorker {
    worker_id: String,
    queue: Arc<JobQueue>,
    executor: Arc<RecalculationExecutor>,
    poll_interval: Duration,
}

impl RecalculationWorker {
    pub fn new(
        worker_id: impl Into<String>,
        queue: Arc<JobQueue>,
        executor: Arc<RecalculationExecutor>,
    ) -> Self {
        let poll_interval = Duration::from_millis(queue.config().poll_interval_ms);
        Self {
            worker_id: worker_id.into(),
            queue,
            executor,
            poll_interval,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 处理一个任务，队列为空时返回 `None`
    ///
    /// 返回的是处理后的任务状态。执行失败不会作为错误返回，而是交给队列按重试预算处理。
    /// 执行期间持续续约；租约丢失时放弃执行，返回任务当前的状态。
    pub async fn process_next(&self) -> StandingsResult<Option<Job>> {
        let job = match self.queue.dequeue(&self.worker_id).await? {
            Some(job) => job,
            None => return Ok(None),
        };

        debug!("worker {} 领取任务 {}", self.worker_id, job.id);

        let heartbeat = LeaseHeartbeat::new(self.queue.clone(), self.worker_id.as_str(), job.id);
        let outcome = tokio::select! {
            outcome = self.executor.execute(&job) => outcome,
            _ = heartbeat.hold() => {
                // 租约已被回收，任务交给新的持有者
                warn!("worker {} 失去任务 {} 的租约，放弃本次执行", self.worker_id, job.id);
                metrics::counter!("standings_leases_lost_total").increment(1);
                let current = self.queue.get(job.id).await.unwrap_or_else(|_| job.clone());
                return Ok(Some(current));
            }
        };

        let job = match outcome {
            Ok(result) => match self.queue.complete(job.id, &result).await {
                Ok(done) => done,
                Err(e) => {
                    // 租约已被回收，结果已经提交，任务状态交给回收流程
                    warn!("任务 {} 结果已提交，但无法标记完成: {}", job.id, e);
                    job
                }
            },
            Err(e) => {
                error!("任务 {} 执行失败: {}", job.id, e);
                match self.queue.fail(job.id, &e).await {
                    Ok(failed) => failed,
                    Err(fail_error) => {
                        warn!("任务 {} 无法记录失败: {}", job.id, fail_error);
                        job
                    }
                }
            }
        };

        if job.status == JobStatus::Failed {
            warn!("任务 {} 已终止: {:?}", job.id, job.last_error);
        }
        Ok(Some(job))
    }

    /// 持续轮询直到收到关闭信号；正在处理的任务会先完成
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("worker {} 开始轮询", self.worker_id);

        loop {
            let wait = match self.process_next().await {
                Ok(Some(_)) => Duration::ZERO,
                Ok(None) => self.poll_interval,
                Err(StandingsError::LockConflict { .. }) => {
                    // 与其他 worker 抢同一个任务，稍等再试
                    let jitter = rand::rng().random_range(0..=self.poll_interval.as_millis() as u64 / 2);
                    Duration::from_millis(jitter)
                }
                Err(e) => {
                    error!("worker {} 轮询失败: {}", self.worker_id, e);
                    self.poll_interval
                }
            };

            if wait.is_zero() {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        info!("worker {} 已停止", self.worker_id);
    }
}
