use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// 并行的调度循环数量
    pub concurrency: usize,
    /// worker ID 前缀，为空时使用主机名
    pub worker_id_prefix: Option<String>,
    /// 加载比赛数据与计算的超时
    pub calculation_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 2,
            worker_id_prefix: None,
            calculation_timeout_seconds: 60,
        }
    }
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_range(self.concurrency as u64, "worker.concurrency", 64)?;
        if let Some(prefix) = &self.worker_id_prefix {
            ValidationUtils::validate_not_empty(prefix, "worker.worker_id_prefix")?;
        }
        ValidationUtils::validate_timeout_seconds(
            self.calculation_timeout_seconds,
            "worker.calculation_timeout_seconds",
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationConfig {
    pub head_to_head: bool,
}

impl Default for CalculationConfig {
    fn default() -> Self {
        Self { head_to_head: true }
    }
}

impl ConfigValidator for CalculationConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_validation() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.concurrency = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.worker_id_prefix = Some(" ".to_string());
        assert!(invalid.validate().is_err());
    }
}
