use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 调度器运行参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 调度循环的唤醒周期
    pub tick_interval_seconds: u64,
    /// 关闭时等待运行中任务的最长时间
    pub drain_timeout_seconds: u64,
    /// 任务未单独配置超时时使用，0 表示不限制
    pub default_task_timeout_seconds: u64,
    /// 存储不可用时退避的上限
    pub max_store_backoff_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 5,
            drain_timeout_seconds: 30,
            default_task_timeout_seconds: 0,
            max_store_backoff_seconds: 60,
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_seconds_range(
            self.tick_interval_seconds,
            3600,
            "scheduler.tick_interval_seconds",
        )?;
        ValidationUtils::validate_seconds_range(
            self.drain_timeout_seconds,
            3600,
            "scheduler.drain_timeout_seconds",
        )?;
        if self.default_task_timeout_seconds > 86400 {
            return Err(crate::ConfigError::Validation(
                "scheduler.default_task_timeout_seconds must be less than or equal to 86400"
                    .to_string(),
            ));
        }
        if self.max_store_backoff_seconds < self.tick_interval_seconds {
            return Err(crate::ConfigError::Validation(
                "scheduler.max_store_backoff_seconds must be at least tick_interval_seconds"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
