use std::time::Duration;

use scheduler_config::SchedulerConfig;

/// 调度器运行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    pub drain_deadline: Duration,
    pub default_task_timeout: Option<Duration>,
    pub max_store_backoff: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.tick_interval_seconds),
            drain_deadline: Duration::from_secs(config.drain_timeout_seconds),
            default_task_timeout: match config.default_task_timeout_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            max_store_backoff: Duration::from_secs(config.max_store_backoff_seconds),
        }
    }
}

impl SchedulerSettings {
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_drain_deadline(mut self, drain_deadline: Duration) -> Self {
        self.drain_deadline = drain_deadline;
        self
    }

    pub fn with_default_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_task_timeout = timeout;
        self
    }

    pub fn with_max_store_backoff(mut self, max_store_backoff: Duration) -> Self {
        self.max_store_backoff = max_store_backoff;
        self
    }

    /// 连续 `failures` 次存储故障后下一轮之前的等待时间
    ///
    /// `tick_interval * 2^failures`，不超过 `max_store_backoff`。
    pub fn store_backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.tick_interval;
        }
        let factor = 1u32 << failures.min(16);
        self.tick_interval
            .saturating_mul(factor)
            .min(self.max_store_backoff.max(self.tick_interval))
    }
}
