//! 任务存储抽象
//!
//! 存储同时负责持久化的描述字段和进程内的运行标记。
//! 除 `claim`/`claim_due` 外，所有写操作只触及单个任务。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{NewTaskDescriptor, RunCompletion, TaskDescriptor};
use scheduler_errors::SchedulerResult;

#[async_trait]
pub trait TaskDescriptorStore: Send + Sync {
    /// 列出全部任务，`running` 字段反映当前运行标记
    async fn list(&self) -> SchedulerResult<Vec<TaskDescriptor>>;

    async fn get(&self, id: i64) -> SchedulerResult<Option<TaskDescriptor>>;

    async fn get_by_name(&self, name: &str) -> SchedulerResult<Option<TaskDescriptor>>;

    /// 按名称插入种子任务，已存在时保持原记录不变并返回它
    async fn insert_if_missing(
        &self,
        task: &NewTaskDescriptor,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TaskDescriptor>;

    /// 无条件认领（不检查是否到期），用于立即执行
    async fn claim(&self, id: i64) -> SchedulerResult<bool>;

    /// 认领并确认任务在 `now` 仍然到期；不到期时释放标记并返回 false
    async fn claim_due(&self, id: i64, now: DateTime<Utc>) -> SchedulerResult<bool>;

    async fn release(&self, id: i64);

    async fn is_running(&self, id: i64) -> bool;

    async fn record_start(&self, id: i64, started_at: DateTime<Utc>) -> SchedulerResult<()>;

    async fn record_completion(&self, id: i64, completion: RunCompletion) -> SchedulerResult<()>;

    /// 启用或禁用任务，从禁用变为启用时刷新 `last_enabled_utc`
    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TaskDescriptor>;

    async fn set_interval(&self, id: i64, interval_seconds: i64)
        -> SchedulerResult<TaskDescriptor>;
}
