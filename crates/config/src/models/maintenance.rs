use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 保留策略与清理节奏
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub job_ttl_days: u32,
    pub snapshot_ttl_days: u32,
    /// 每个 (联赛, 赛季) 无论多旧都保留的最新快照数
    pub min_keep_snapshots: u32,
    pub audit_ttl_days: u32,
    /// 单次删除的最大行数
    pub batch_size: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 3600,
            job_ttl_days: 7,
            snapshot_ttl_days: 30,
            min_keep_snapshots: 3,
            audit_ttl_days: 90,
            batch_size: 1000,
        }
    }
}

impl ConfigValidator for RetentionConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_range(self.interval_seconds, "retention.interval_seconds", 604_800)?;
        ValidationUtils::validate_range(self.job_ttl_days as u64, "retention.job_ttl_days", 3650)?;
        ValidationUtils::validate_range(
            self.snapshot_ttl_days as u64,
            "retention.snapshot_ttl_days",
            3650,
        )?;
        ValidationUtils::validate_range(
            self.min_keep_snapshots as u64,
            "retention.min_keep_snapshots",
            1000,
        )?;
        ValidationUtils::validate_range(self.audit_ttl_days as u64, "retention.audit_ttl_days", 3650)?;
        ValidationUtils::validate_range(self.batch_size as u64, "retention.batch_size", 100_000)
    }
}

/// 健康视图使用的时间窗口
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// 平均耗时只统计这段时间内结束的任务
    pub duration_window_hours: u32,
    /// “最近活动”计数的窗口
    pub recent_window_minutes: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            duration_window_hours: 24,
            recent_window_minutes: 60,
        }
    }
}

impl ConfigValidator for MonitoringConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_range(
            self.duration_window_hours as u64,
            "monitoring.duration_window_hours",
            24 * 365,
        )?;
        ValidationUtils::validate_range(
            self.recent_window_minutes as u64,
            "monitoring.recent_window_minutes",
            24 * 60,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_config_validation() {
        let config = RetentionConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.min_keep_snapshots = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.job_ttl_days = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.batch_size = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_monitoring_config_validation() {
        assert!(MonitoringConfig::default().validate().is_ok());
        let invalid = MonitoringConfig {
            recent_window_minutes: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }
}
