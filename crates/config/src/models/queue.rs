use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 任务队列：租约、重试预算与轮询节奏
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub lease_seconds: u64,
    /// 失败后最多重新排队的次数，总执行次数为 max_retries + 1
    pub max_retries: u32,
    pub poll_interval_ms: u64,
    pub reclaim_interval_seconds: u64,
    pub default_priority: i32,
    /// force-enqueue 使用的优先级
    pub force_priority: i32,
    pub backoff: BackoffConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_seconds: 120,
            max_retries: 3,
            poll_interval_ms: 1000,
            reclaim_interval_seconds: 30,
            default_priority: 5,
            force_priority: 100,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ConfigValidator for QueueConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(self.lease_seconds, "queue.lease_seconds")?;
        if self.max_retries > 100 {
            return Err(crate::ConfigError::Validation(
                "queue.max_retries must be less than or equal to 100".to_string(),
            ));
        }
        ValidationUtils::validate_range(self.poll_interval_ms, "queue.poll_interval_ms", 60_000)?;
        ValidationUtils::validate_timeout_seconds(
            self.reclaim_interval_seconds,
            "queue.reclaim_interval_seconds",
        )?;
        if self.force_priority < self.default_priority {
            return Err(crate::ConfigError::Validation(
                "queue.force_priority must not be lower than queue.default_priority".to_string(),
            ));
        }
        self.backoff.validate()
    }
}

/// 指数退避：base * multiplier^(attempt-1)，上限 max，再叠加抖动
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_seconds: u64,
    pub max_delay_seconds: u64,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_seconds: 5,
            max_delay_seconds: 300,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl ConfigValidator for BackoffConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(
            self.base_delay_seconds,
            "queue.backoff.base_delay_seconds",
        )?;
        ValidationUtils::validate_range(
            self.max_delay_seconds,
            "queue.backoff.max_delay_seconds",
            86_400,
        )?;
        if self.max_delay_seconds < self.base_delay_seconds {
            return Err(crate::ConfigError::Validation(
                "queue.backoff.max_delay_seconds must not be lower than base_delay_seconds"
                    .to_string(),
            ));
        }
        if self.multiplier < 1.0 {
            return Err(crate::ConfigError::Validation(
                "queue.backoff.multiplier must be at least 1.0".to_string(),
            ));
        }
        ValidationUtils::validate_ratio(self.jitter_factor, "queue.backoff.jitter_factor")
    }
}
