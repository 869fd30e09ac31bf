use std::sync::Arc;
use std::time::Duration;

use standings_dispatcher::JobQueue;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// 续约间隔的下限
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(100);

/// 执行期间定时延长任务租约
pub struct LeaseHeartbeat {
    queue: Arc<JobQueue>,
    worker_id: String,
    job_id: i64,
    renew_interval: Duration,
}

impl LeaseHeartbeat {
    pub fn new(queue: Arc<JobQueue>, worker_id: impl Into<String>, job_id: i64) -> Self {
        let renew_interval = Self::renew_interval(queue.config().lease_seconds);
        Self {
            queue,
            worker_id: worker_id.into(),
            job_id,
            renew_interval,
        }
    }

    /// 每个租约周期续约三次
    pub fn renew_interval(lease_seconds: u64) -> Duration {
        (Duration::from_secs(lease_seconds) / 3).max(MIN_RENEW_INTERVAL)
    }

    /// 持续续约，租约被回收或转交后返回
    ///
    /// 续约时的存储错误只记录日志，下一个间隔再试。
    pub async fn hold(&self) {
        let mut ticker = interval(self.renew_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即返回，领取时刚设置过租约
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.queue.renew_lease(self.job_id, &self.worker_id).await {
                Ok(true) => {
                    metrics::counter!("standings_lease_renewals_total").increment(1);
                }
                Ok(false) => {
                    debug!("任务 {} 的续约停止", self.job_id);
                    return;
                }
                Err(e) => warn!("任务 {} 续约失败: {}", self.job_id, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renew_interval() {
        assert_eq!(LeaseHeartbeat::renew_interval(120), Duration::from_secs(40));
        assert_eq!(LeaseHeartbeat::renew_interval(1), Duration::from_millis(333));
        assert_eq!(LeaseHeartbeat::renew_interval(0), MIN_RENEW_INTERVAL);
    }
}
