use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scheduler_errors::{SchedulerError, SchedulerResult};

/// 周期任务描述
///
/// 每个配置的任务对应一条记录。`kind` 在分发时才通过任务注册表解析，
/// 存储层不关心具体执行逻辑。
///
/// # 字段说明
///
/// - `interval_seconds`: 两次运行*开始*之间的最小间隔，必须大于0
/// - `enabled`: 禁用的任务永远不会被选中
/// - `stop_on_error`: 为 true 时，运行失败会自动禁用任务
/// - `last_enabled_utc`: 到期计算的基准时间，任务从禁用变为启用时刷新
/// - `last_start_utc` / `last_end_utc` / `last_success_utc`: 每次运行后由执行器更新
/// - `running`: 仅存在于内存中的互斥标记，从不持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub interval_seconds: i64,
    pub enabled: bool,
    pub stop_on_error: bool,
    pub timeout_seconds: Option<i64>,
    pub parameters: serde_json::Value,
    pub last_enabled_utc: Option<DateTime<Utc>>,
    pub last_start_utc: Option<DateTime<Utc>>,
    pub last_end_utc: Option<DateTime<Utc>>,
    pub last_success_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub running: bool,
}

impl TaskDescriptor {
    /// 任务级超时，未配置或非正数时返回 None
    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_seconds
            .filter(|secs| *secs > 0)
            .map(|secs| std::time::Duration::from_secs(secs as u64))
    }

    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.interval_seconds)
    }
}

/// 种子任务定义
///
/// 由安装/配置流程在调度器首次启动前写入存储，调度器本身从不创建任务。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTaskDescriptor {
    pub name: String,
    pub kind: String,
    pub interval_seconds: i64,
    pub enabled: bool,
    pub stop_on_error: bool,
    pub timeout_seconds: Option<i64>,
    pub parameters: serde_json::Value,
}

impl NewTaskDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, interval_seconds: i64) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            interval_seconds,
            enabled: true,
            stop_on_error: false,
            timeout_seconds: None,
            parameters: serde_json::json!({}),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn stop_on_error(mut self) -> Self {
        self.stop_on_error = true;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: i64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::validation_error("任务名称不能为空"));
        }
        if self.kind.trim().is_empty() {
            return Err(SchedulerError::validation_error(format!(
                "任务 {} 的类型不能为空",
                self.name
            )));
        }
        if self.interval_seconds <= 0 {
            return Err(SchedulerError::validation_error(format!(
                "任务 {} 的执行间隔必须大于0，当前为 {}",
                self.name, self.interval_seconds
            )));
        }
        if matches!(self.timeout_seconds, Some(t) if t <= 0) {
            return Err(SchedulerError::validation_error(format!(
                "任务 {} 的超时时间必须大于0",
                self.name
            )));
        }
        Ok(())
    }

    /// 按种子定义构造首条记录。启用的任务以 `now` 作为到期基准。
    pub fn into_descriptor(self, id: i64, now: DateTime<Utc>) -> TaskDescriptor {
        let last_enabled_utc = if self.enabled { Some(now) } else { None };
        TaskDescriptor {
            id,
            name: self.name,
            kind: self.kind,
            interval_seconds: self.interval_seconds,
            enabled: self.enabled,
            stop_on_error: self.stop_on_error,
            timeout_seconds: self.timeout_seconds,
            parameters: self.parameters,
            last_enabled_utc,
            last_start_utc: None,
            last_end_utc: None,
            last_success_utc: None,
            running: false,
        }
    }
}

/// 一次运行结束后写回存储的簿记信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunCompletion {
    pub ended_at: DateTime<Utc>,
    pub succeeded: bool,
    /// 失败且 StopOnError 时为 true，要求存储清除 `enabled`
    pub disable: bool,
}

impl RunCompletion {
    /// 按运行结果和任务策略构造簿记信息
    pub fn from_outcome(
        outcome: crate::events::RunOutcome,
        stop_on_error: bool,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ended_at,
            succeeded: outcome.is_success(),
            disable: outcome.is_failure() && stop_on_error,
        }
    }

    /// 把簿记写入描述。重复应用同一结果得到相同状态。
    pub fn apply_to(&self, descriptor: &mut TaskDescriptor) {
        descriptor.last_end_utc = Some(self.ended_at);
        if self.succeeded {
            descriptor.last_success_utc = Some(self.ended_at);
        }
        if self.disable {
            descriptor.enabled = false;
        }
    }
}

/// 启用/禁用切换。仅在从禁用变为启用时刷新到期基准。
pub fn apply_enabled(descriptor: &mut TaskDescriptor, enabled: bool, now: DateTime<Utc>) {
    if enabled && !descriptor.enabled {
        descriptor.last_enabled_utc = Some(now);
    }
    descriptor.enabled = enabled;
}
