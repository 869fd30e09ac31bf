use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    logging::LogConfig,
    maintenance::{MonitoringConfig, RetentionConfig},
    queue::QueueConfig,
    worker::{CalculationConfig, WorkerConfig},
};
use crate::validation::ConfigValidator;

pub const ENV_PREFIX: &str = "STANDINGS";

/// 租约至少比计算超时长出的秒数，留给快照与提交
pub const LEASE_MARGIN_SECONDS: u64 = 10;

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/standings.toml",
    "standings.toml",
    "/etc/standings/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub calculation: CalculationConfig,
    pub retention: RetentionConfig,
    pub monitoring: MonitoringConfig,
    pub api: ApiConfig,
    pub logging: LogConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 依次读取配置文件和 `STANDINGS_` 前缀的环境变量，
    /// 例如 `STANDINGS_QUEUE__MAX_RETRIES=5` 覆盖 `queue.max_retries`。
    /// 没有配置文件时使用内置默认值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.database.validate()?;
        self.queue.validate()?;
        self.worker.validate()?;
        self.calculation.validate()?;
        self.retention.validate()?;
        self.monitoring.validate()?;
        self.api.validate()?;
        self.logging.validate()?;
        self.observability.validate()?;

        if self.worker.enabled
            && self.queue.lease_seconds
                < self.worker.calculation_timeout_seconds + LEASE_MARGIN_SECONDS
        {
            return Err(crate::ConfigError::Validation(format!(
                "queue.lease_seconds ({}) must be at least worker.calculation_timeout_seconds ({}) + {}",
                self.queue.lease_seconds,
                self.worker.calculation_timeout_seconds,
                LEASE_MARGIN_SECONDS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.database.url, "sqlite://standings.db?mode=rwc");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.queue.lease_seconds, 120);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.backoff.base_delay_seconds, 5);
        assert_eq!(config.queue.backoff.max_delay_seconds, 300);
        assert_eq!(config.worker.concurrency, 2);
        assert!(config.calculation.head_to_head);
        assert_eq!(config.retention.job_ttl_days, 7);
        assert_eq!(config.retention.snapshot_ttl_days, 30);
        assert_eq!(config.retention.audit_ttl_days, 90);
        assert_eq!(config.retention.min_keep_snapshots, 3);
        assert_eq!(config.monitoring.recent_window_minutes, 60);
        assert_eq!(config.api.bind_address, "0.0.0.0:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_from_partial_toml() {
        let toml_str = r#"
[database]
url = "memory://"

[queue]
max_retries = 5

[queue.backoff]
base_delay_seconds = 1

[retention]
job_ttl_days = 14

[calculation]
head_to_head = false
"#;

        let config = AppConfig::from_toml(toml_str).unwrap();
        assert!(config.database.is_memory());
        assert_eq!(config.queue.max_retries, 5);
        assert_eq!(config.queue.lease_seconds, 120);
        assert_eq!(config.queue.backoff.base_delay_seconds, 1);
        assert_eq!(config.queue.backoff.max_delay_seconds, 300);
        assert_eq!(config.retention.job_ttl_days, 14);
        assert!(!config.calculation.head_to_head);
    }

    #[test]
    fn test_app_config_rejects_invalid_values() {
        let toml_str = r#"
[retention]
min_keep_snapshots = 0
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());

        let toml_str = r#"
[queue]
max_retries = 1000
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_lease_must_outlast_calculation_timeout() {
        let toml_str = r#"
[queue]
lease_seconds = 30

[worker]
calculation_timeout_seconds = 60
"#;
        let err = AppConfig::from_toml(toml_str).unwrap_err();
        assert!(err.root_cause().to_string().contains("queue.lease_seconds"));

        let toml_str = r#"
[queue]
lease_seconds = 70

[worker]
calculation_timeout_seconds = 60
"#;
        assert!(AppConfig::from_toml(toml_str).is_ok());

        // 不运行 worker 的节点不受约束
        let toml_str = r#"
[queue]
lease_seconds = 30

[worker]
enabled = false
calculation_timeout_seconds = 60
"#;
        assert!(AppConfig::from_toml(toml_str).is_ok());
    }

    #[test]
    fn test_memory_database_url_is_exported() {
        let toml_str = format!("[database]\nurl = \"{}\"\n", crate::MEMORY_DATABASE_URL);
        let config = AppConfig::from_toml(&toml_str).unwrap();
        assert!(config.database.is_memory());
        assert_eq!(crate::MEMORY_DATABASE_URL, "memory://");
    }

    #[test]
    fn test_app_config_toml_round_trip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.database.url, config.database.url);
        assert_eq!(parsed.queue.force_priority, config.queue.force_priority);
        assert_eq!(parsed.logging.format, config.logging.format);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[worker]\nconcurrency = 4\n\n[api]\nbind_address = \"127.0.0.1:9000\"").unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.api.bind_address, "127.0.0.1:9000");
        assert_eq!(config.queue.max_retries, 3);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/standings.toml")).is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[monitoring]\nduration_window_hours = 12").unwrap();

        std::env::set_var("STANDINGS_MONITORING__DURATION_WINDOW_HOURS", "48");
        let config = AppConfig::load(file.path().to_str());
        std::env::remove_var("STANDINGS_MONITORING__DURATION_WINDOW_HOURS");

        assert_eq!(config.unwrap().monitoring.duration_window_hours, 48);
    }
}
