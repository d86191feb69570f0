use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    scheduler::SchedulerConfig,
    tasks::{validate_task_seeds, TaskSeedConfig},
};
use crate::validation::ConfigValidator;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub tasks: Vec<TaskSeedConfig>,
}

const DEFAULT_PATHS: [&str; 3] = [
    "config/scheduler.toml",
    "scheduler.toml",
    "/etc/scheduler/config.toml",
];

impl AppConfig {
    /// 加载配置：默认值 < 配置文件 < `SCHEDULER_` 前缀的环境变量
    ///
    /// 环境变量用双下划线分隔层级，例如
    /// `SCHEDULER_SCHEDULER__TICK_INTERVAL_SECONDS=10`。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = AppConfig::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("database.url", defaults.database.url.clone())?
            .set_default("database.max_connections", defaults.database.max_connections)?
            .set_default(
                "scheduler.tick_interval_seconds",
                defaults.scheduler.tick_interval_seconds,
            )?
            .set_default(
                "scheduler.drain_timeout_seconds",
                defaults.scheduler.drain_timeout_seconds,
            )?
            .set_default(
                "scheduler.default_task_timeout_seconds",
                defaults.scheduler.default_task_timeout_seconds,
            )?
            .set_default(
                "scheduler.max_store_backoff_seconds",
                defaults.scheduler.max_store_backoff_seconds,
            )?
            .set_default("api.enabled", defaults.api.enabled)?
            .set_default("api.bind_address", defaults.api.bind_address.clone())?
            .set_default("api.cors_enabled", defaults.api.cors_enabled)?
            .set_default("observability.log_level", defaults.observability.log_level.clone())?
            .set_default("observability.log_format", "pretty")?
            .set_default(
                "observability.metrics_enabled",
                defaults.observability.metrics_enabled,
            )?
            .set_default(
                "observability.metrics_endpoint",
                defaults.observability.metrics_endpoint.clone(),
            )?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_PATHS.iter().find(|p| Path::new(p).exists()) {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("SCHEDULER")
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
        self.scheduler.validate()?;
        self.api.validate()?;
        self.observability.validate()?;
        validate_task_seeds(&self.tasks)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogFormat;
    use std::io::Write;

    const SAMPLE: &str = r#"
[database]
url = "sqlite::memory:"
max_connections = 1

[scheduler]
tick_interval_seconds = 2
drain_timeout_seconds = 10
default_task_timeout_seconds = 120
max_store_backoff_seconds = 30

[api]
enabled = true
bind_address = "0.0.0.0:9000"
cors_enabled = false

[observability]
log_level = "debug"
log_format = "json"
metrics_enabled = true
metrics_endpoint = "/metrics"

[[tasks]]
name = "ping"
kind = "keep_alive"
interval_seconds = 300
parameters = { url = "http://localhost:9000/health" }

[[tasks]]
name = "purge"
kind = "shell"
interval_seconds = 3600
enabled = false
stop_on_error = true
timeout_seconds = 60
parameters = { command = "echo", args = ["purge"] }
"#;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.database.url, "sqlite://scheduler.db");
        assert_eq!(config.scheduler.tick_interval_seconds, 5);
        assert_eq!(config.scheduler.drain_timeout_seconds, 30);
        assert!(config.tasks.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_from_toml() {
        let config = AppConfig::from_toml(SAMPLE).expect("Failed to parse TOML");
        assert_eq!(config.scheduler.tick_interval_seconds, 2);
        assert_eq!(config.api.bind_address, "0.0.0.0:9000");
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.tasks.len(), 2);

        let purge = &config.tasks[1];
        assert!(!purge.enabled);
        assert!(purge.stop_on_error);
        assert_eq!(purge.timeout_seconds, Some(60));
        assert_eq!(purge.parameters["command"], "echo");

        // 未写明的字段取默认值
        assert!(config.tasks[0].enabled);
        assert!(!config.tasks[0].stop_on_error);
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let config = AppConfig::from_toml(
            r#"
[api]
enabled = false
bind_address = "127.0.0.1:1"
cors_enabled = false
"#,
        )
        .expect("Failed to parse TOML");
        assert!(!config.api.enabled);
        assert_eq!(config.scheduler.tick_interval_seconds, 5);
    }

    #[test]
    fn test_partial_sections_fill_missing_keys() {
        let config = AppConfig::from_toml(
            r#"
[database]
url = "sqlite::memory:"

[scheduler]
tick_interval_seconds = 1
drain_timeout_seconds = 5
max_store_backoff_seconds = 4

[api]
enabled = true

[observability]
log_level = "debug"
"#,
        )
        .expect("Failed to parse TOML");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(
            config.database.max_connections,
            DatabaseConfig::default().max_connections
        );
        assert_eq!(config.scheduler.tick_interval_seconds, 1);
        assert_eq!(config.scheduler.default_task_timeout_seconds, 0);
        assert!(config.api.enabled);
        assert_eq!(config.api.bind_address, ApiConfig::default().bind_address);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(
            config.observability.metrics_endpoint,
            ObservabilityConfig::default().metrics_endpoint
        );
    }

    #[test]
    fn test_invalid_task_rejected() {
        let toml_str = r#"
[[tasks]]
name = "broken"
kind = "shell"
interval_seconds = 0
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_to_toml_round_trip() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let rendered = config.to_toml().unwrap();
        let reparsed = AppConfig::from_toml(&rendered).unwrap();
        assert_eq!(reparsed.tasks.len(), 2);
        assert_eq!(reparsed.scheduler.max_store_backoff_seconds, 30);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let path = file.path().to_str().unwrap();
        let config = AppConfig::load(Some(path)).expect("Failed to load config");
        assert_eq!(config.scheduler.default_task_timeout_seconds, 120);
        assert_eq!(config.tasks[0].name, "ping");
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/scheduler.toml")).is_err());
    }
}
