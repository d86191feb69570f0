//! 运行事件
//!
//! 每次运行结束（无论成功与否）都会产生一条 [`RunEvent`]，
//! 交给日志/指标等观测组件处理。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 运行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    TimedOut,
    /// 因关闭而取消，不算失败
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }

    /// 失败和超时会触发 StopOnError
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed | RunOutcome::TimedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed => "failed",
            RunOutcome::TimedOut => "timed_out",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 运行触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    /// 运维人员通过管理接口立即触发
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        }
    }
}

/// 一次运行的结构化记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub task_id: i64,
    pub task_name: String,
    pub kind: String,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: RunOutcome,
    pub error_detail: Option<String>,
}

impl RunEvent {
    pub fn is_error(&self) -> bool {
        self.outcome.is_failure()
    }
}

/// 运行事件接收方
#[async_trait]
pub trait RunEventSink: Send + Sync {
    async fn emit(&self, event: &RunEvent);
}

/// 丢弃所有事件
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl RunEventSink for NoopEventSink {
    async fn emit(&self, _event: &RunEvent) {}
}
