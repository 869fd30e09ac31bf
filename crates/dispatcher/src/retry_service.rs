use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use standings_config::{BackoffConfig, QueueConfig};
use standings_errors::StandingsResult;
use tracing::{debug, warn};

/// 一次失败之后的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 回到 PENDING，`available_at` 之前不可领取
    Retry { available_at: DateTime<Utc> },
    /// 预算用尽，进入 FAILED
    Exhausted,
}

/// 重试策略
///
/// `attempts` 是已经失败的次数。`attempts <= max_retries` 时重试，
/// 所以一个任务最多执行 `max_retries + 1` 次。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: BackoffConfig,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.max_retries, config.backoff.clone())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn decide(&self, attempts: i32, now: DateTime<Utc>) -> RetryDecision {
        if attempts < 0 || attempts as u32 > self.max_retries {
            debug!("已失败 {} 次，超过重试上限 {}", attempts, self.max_retries);
            return RetryDecision::Exhausted;
        }

        RetryDecision::Retry {
            available_at: now + self.backoff_delay(attempts),
        }
    }

    /// 第 n 次失败后的等待时间：`base * multiplier^(n-1)`，封顶 max，叠加抖动但不低于 base
    pub fn backoff_delay(&self, attempts: i32) -> chrono::Duration {
        let base_interval = self.backoff.base_delay_seconds as f64;
        let max_interval = self.backoff.max_delay_seconds as f64;
        let exponent = (attempts - 1).max(0);

        let exponential_interval = base_interval * self.backoff.multiplier.powi(exponent);
        let capped_interval = exponential_interval.min(max_interval);

        // 随机抖动，避免大量任务同时重试
        let jitter =
            capped_interval * self.backoff.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        let final_interval = (capped_interval + jitter).max(base_interval);

        chrono::Duration::milliseconds((final_interval * 1000.0) as i64)
    }
}

/// 对瞬时错误做有限次立即重试，用于入队这类调用方同步等待的操作
pub async fn retry_transient<T, F, Fut>(
    operation: &str,
    max_attempts: u32,
    mut call: F,
) -> StandingsResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StandingsResult<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!("{} 第 {} 次失败，稍后重试: {}", operation, attempt, e);
                tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use standings_errors::StandingsError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(jitter_factor: f64) -> RetryPolicy {
        RetryPolicy::new(
            3,
            BackoffConfig {
                base_delay_seconds: 5,
                max_delay_seconds: 300,
                multiplier: 2.0,
                jitter_factor,
            },
        )
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = policy(0.0);
        assert_eq!(policy.backoff_delay(1).num_seconds(), 5);
        assert_eq!(policy.backoff_delay(2).num_seconds(), 10);
        assert_eq!(policy.backoff_delay(3).num_seconds(), 20);
        assert_eq!(policy.backoff_delay(20).num_seconds(), 300);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = policy(0.1);
        for _ in 0..100 {
            let delay = policy.backoff_delay(3).num_milliseconds();
            assert!((18_000..=22_000).contains(&delay), "delay {delay}");
        }
        // 抖动不会把等待压到 base 以下
        for _ in 0..100 {
            assert!(policy.backoff_delay(1).num_milliseconds() >= 5_000);
        }
    }

    #[test]
    fn test_decide_respects_budget() {
        let policy = policy(0.0);
        let now = Utc::now();

        for attempts in 1..=3 {
            match policy.decide(attempts, now) {
                RetryDecision::Retry { available_at } => assert!(available_at > now),
                RetryDecision::Exhausted => panic!("第 {attempts} 次失败不应耗尽预算"),
            }
        }
        assert_eq!(policy.decide(4, now), RetryDecision::Exhausted);
    }

    #[test]
    fn test_zero_retries_fails_immediately() {
        let policy = RetryPolicy::new(0, BackoffConfig::default());
        assert_eq!(policy.decide(1, Utc::now()), RetryDecision::Exhausted);
    }

    #[tokio::test]
    async fn test_retry_transient_recovers() {
        let calls = AtomicU32::new(0);
        let value = retry_transient("测试", 3, || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(StandingsError::Timeout("慢".to_string()))
                } else {
                    Ok(call)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_retry_transient_does_not_retry_data_errors() {
        let calls = AtomicU32::new(0);
        let result: StandingsResult<()> = retry_transient("测试", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StandingsError::validation_error("坏数据")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
