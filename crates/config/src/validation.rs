use crate::{ConfigError, ConfigResult};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a value lies within `1..=max`
    pub fn validate_range(value: u64, field_name: &str, max: u64) -> ConfigResult<()> {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if value > max {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> ConfigResult<()> {
        Self::validate_range(timeout_seconds, field_name, 3600)
    }

    /// host:port 形式的监听地址
    pub fn validate_bind_address(address: &str, field_name: &str) -> ConfigResult<()> {
        Self::validate_not_empty(address, field_name)?;
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p > 0) => {
                Ok(())
            }
            _ => Err(ConfigError::Validation(format!(
                "{field_name} must be in host:port form, got {address}"
            ))),
        }
    }

    pub fn validate_ratio(value: f64, field_name: &str) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be between 0.0 and 1.0"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("test", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("", "field").is_err());
        assert!(ValidationUtils::validate_not_empty("   ", "field").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(ValidationUtils::validate_range(1, "n", 10).is_ok());
        assert!(ValidationUtils::validate_range(10, "n", 10).is_ok());
        assert!(ValidationUtils::validate_range(0, "n", 10).is_err());
        assert!(ValidationUtils::validate_range(11, "n", 10).is_err());
        assert!(ValidationUtils::validate_timeout_seconds(3601, "t").is_err());
    }

    #[test]
    fn test_validate_bind_address() {
        assert!(ValidationUtils::validate_bind_address("0.0.0.0:8080", "api").is_ok());
        assert!(ValidationUtils::validate_bind_address("localhost:1", "api").is_ok());
        assert!(ValidationUtils::validate_bind_address("localhost", "api").is_err());
        assert!(ValidationUtils::validate_bind_address(":8080", "api").is_err());
        assert!(ValidationUtils::validate_bind_address("host:0", "api").is_err());
    }

    #[test]
    fn test_validate_ratio() {
        assert!(ValidationUtils::validate_ratio(0.0, "r").is_ok());
        assert!(ValidationUtils::validate_ratio(0.5, "r").is_ok());
        assert!(ValidationUtils::validate_ratio(1.5, "r").is_err());
    }
}
