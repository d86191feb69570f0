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

    /// Validate that a value in seconds lies within `1..=max`
    pub fn validate_seconds_range(value: u64, max: u64, field_name: &str) -> ConfigResult<()> {
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

    pub fn validate_count(count: usize, field_name: &str) -> ConfigResult<()> {
        if count == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > 10000 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 10000"
            )));
        }
        Ok(())
    }

    /// `host:port` 形式的监听地址
    pub fn validate_bind_address(address: &str, field_name: &str) -> ConfigResult<()> {
        Self::validate_not_empty(address, field_name)?;
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => match port.parse::<u16>() {
                Ok(0) | Err(_) => Err(ConfigError::Validation(format!(
                    "{field_name} has an invalid port: {port}"
                ))),
                Ok(_) => Ok(()),
            },
            _ => Err(ConfigError::Validation(format!(
                "{field_name} must be in host:port form"
            ))),
        }
    }

    pub fn validate_one_of(value: &str, allowed: &[&str], field_name: &str) -> ConfigResult<()> {
        if !allowed.contains(&value.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be one of {allowed:?}, got {value}"
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
    fn test_validate_seconds_range() {
        assert!(ValidationUtils::validate_seconds_range(5, 3600, "tick").is_ok());
        assert!(ValidationUtils::validate_seconds_range(3600, 3600, "tick").is_ok());
        assert!(ValidationUtils::validate_seconds_range(0, 3600, "tick").is_err());
        assert!(ValidationUtils::validate_seconds_range(3601, 3600, "tick").is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(ValidationUtils::validate_count(1, "test").is_ok());
        assert!(ValidationUtils::validate_count(0, "test").is_err());
        assert!(ValidationUtils::validate_count(10001, "test").is_err());
    }

    #[test]
    fn test_validate_bind_address() {
        assert!(ValidationUtils::validate_bind_address("0.0.0.0:8080", "api").is_ok());
        assert!(ValidationUtils::validate_bind_address("localhost:1", "api").is_ok());
        assert!(ValidationUtils::validate_bind_address("localhost", "api").is_err());
        assert!(ValidationUtils::validate_bind_address(":8080", "api").is_err());
        assert!(ValidationUtils::validate_bind_address("0.0.0.0:0", "api").is_err());
        assert!(ValidationUtils::validate_bind_address("0.0.0.0:http", "api").is_err());
    }

    #[test]
    fn test_validate_one_of() {
        assert!(ValidationUtils::validate_one_of("json", &["json", "pretty"], "fmt").is_ok());
        assert!(ValidationUtils::validate_one_of("JSON", &["json", "pretty"], "fmt").is_ok());
        assert!(ValidationUtils::validate_one_of("xml", &["json", "pretty"], "fmt").is_err());
    }
}
