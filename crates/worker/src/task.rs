use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_errors::{SchedulerError, SchedulerResult};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// 一次运行的上下文
///
/// `cancellation` 在进程关闭或任务超时时触发。任务需要自行观察它，
/// 调度器不会强行终止不配合的任务。
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: i64,
    pub task_name: String,
    pub kind: String,
    pub parameters: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub cancellation: CancellationToken,
}

impl TaskContext {
    /// 把任务参数解析为具体类型
    pub fn params<T: DeserializeOwned>(&self) -> SchedulerResult<T> {
        serde_json::from_value(self.parameters.clone()).map_err(|e| {
            SchedulerError::invalid_params(format!(
                "解析任务 {} 的参数失败: {e}",
                self.task_name
            ))
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

/// 可被调度的工作单元
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    async fn execute(&self, ctx: TaskContext) -> SchedulerResult<()>;
}

struct FnTask<F>(F);

#[async_trait]
impl<F, Fut> ScheduledTask for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = SchedulerResult<()>> + Send,
{
    async fn execute(&self, ctx: TaskContext) -> SchedulerResult<()> {
        (self.0)(ctx).await
    }
}

/// 用闭包构造工作单元
pub fn task_fn<F, Fut>(f: F) -> Arc<dyn ScheduledTask>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SchedulerResult<()>> + Send + 'static,
{
    Arc::new(FnTask(f))
}
