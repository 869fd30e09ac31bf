use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 使用内存仓储，不落盘
pub const MEMORY_DATABASE_URL: &str = "memory://";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://standings.db?mode=rwc".to_string(),
            max_connections: 5,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.starts_with(MEMORY_DATABASE_URL)
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.url, "database.url")?;

        if !self.url.starts_with("sqlite:") && !self.is_memory() {
            return Err(crate::ConfigError::Validation(
                "database.url must start with sqlite: or memory://".to_string(),
            ));
        }

        ValidationUtils::validate_range(self.max_connections as u64, "database.max_connections", 100)?;
        ValidationUtils::validate_range(self.min_connections as u64, "database.min_connections", 100)?;

        if self.min_connections > self.max_connections {
            return Err(crate::ConfigError::Validation(
                "database.min_connections must be less than or equal to max_connections"
                    .to_string(),
            ));
        }

        ValidationUtils::validate_timeout_seconds(
            self.connection_timeout_seconds,
            "database.connection_timeout_seconds",
        )?;
        ValidationUtils::validate_range(
            self.idle_timeout_seconds,
            "database.idle_timeout_seconds",
            86_400,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_validation() {
        let config = DatabaseConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.is_memory());

        let mut memory = config.clone();
        memory.url = MEMORY_DATABASE_URL.to_string();
        assert!(memory.validate().is_ok());
        assert!(memory.is_memory());

        let mut invalid_config = config.clone();
        invalid_config.url = "postgresql://localhost/standings".to_string();
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config.clone();
        invalid_config.max_connections = 0;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config.clone();
        invalid_config.min_connections = 6;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config;
        invalid_config.connection_timeout_seconds = 0;
        assert!(invalid_config.validate().is_err());
    }
}
