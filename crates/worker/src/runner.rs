//! 单次任务运行
//!
//! 调用方必须已经通过 `claim`/`claim_due` 拿到任务的运行标记。
//! 运行器负责记录开始时间、执行、写回结果，最后释放标记并发出运行事件。
//! 任何任务级错误都在这里被吸收，不会向调度循环传播。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use scheduler_domain::{
    Clock, RunCompletion, RunEvent, RunEventSink, RunOutcome, RunTrigger, TaskDescriptor,
    TaskDescriptorStore,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_infrastructure::{MetricsCollector, StructuredLogger};
use tokio_util::sync::CancellationToken;

use crate::registry::TaskRegistry;
use crate::task::TaskContext;

#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<dyn TaskDescriptorStore>,
    registry: Arc<TaskRegistry>,
    sink: Arc<dyn RunEventSink>,
    clock: Arc<dyn Clock>,
    default_timeout: Option<Duration>,
    metrics: Arc<MetricsCollector>,
}

/// 持有运行标记，被提前丢弃（例如运行被中止）时在后台释放
struct ClaimGuard {
    store: Arc<dyn TaskDescriptorStore>,
    task_id: i64,
    armed: bool,
}

impl ClaimGuard {
    fn new(store: Arc<dyn TaskDescriptorStore>, task_id: i64) -> Self {
        Self {
            store,
            task_id,
            armed: true,
        }
    }

    async fn release(mut self) {
        self.armed = false;
        self.store.release(self.task_id).await;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = self.store.clone();
            let task_id = self.task_id;
            handle.spawn(async move { store.release(task_id).await });
        }
    }
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn TaskDescriptorStore>,
        registry: Arc<TaskRegistry>,
        sink: Arc<dyn RunEventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            sink,
            clock,
            default_timeout: None,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// 任务没有单独配置超时时使用的默认值
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn TaskDescriptorStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 执行一个已被认领的任务直到结束
    pub async fn run(
        &self,
        task: TaskDescriptor,
        trigger: RunTrigger,
        shutdown: CancellationToken,
    ) -> RunEvent {
        let guard = ClaimGuard::new(self.store.clone(), task.id);
        let started_at = self.clock.now();
        let timer = Instant::now();

        StructuredLogger::log_task_run_start(task.id, &task.name, &task.kind, started_at);
        if let Err(e) = self.store.record_start(task.id, started_at).await {
            StructuredLogger::log_bookkeeping_error(task.id, &task.name, "record_start", &e);
        }

        let cancellation = shutdown.child_token();
        let ctx = TaskContext {
            task_id: task.id,
            task_name: task.name.clone(),
            kind: task.kind.clone(),
            parameters: task.parameters.clone(),
            started_at,
            cancellation: cancellation.clone(),
        };

        let result = self.execute(&task, ctx, &cancellation).await;
        let (outcome, error_detail) = classify(result, shutdown.is_cancelled());

        let ended_at = self.clock.now();
        let completion = RunCompletion::from_outcome(outcome, task.stop_on_error, ended_at);
        if let Err(e) = self.store.record_completion(task.id, completion).await {
            StructuredLogger::log_bookkeeping_error(task.id, &task.name, "record_completion", &e);
        }
        if completion.disable {
            StructuredLogger::log_task_auto_disabled(task.id, &task.name, &task.kind);
            self.metrics.record_auto_disabled(&task.kind);
        }
        guard.release().await;

        let event = RunEvent {
            task_id: task.id,
            task_name: task.name,
            kind: task.kind,
            trigger,
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
            outcome,
            error_detail,
        };
        self.sink.emit(&event).await;
        event
    }

    async fn execute(
        &self,
        task: &TaskDescriptor,
        ctx: TaskContext,
        cancellation: &CancellationToken,
    ) -> SchedulerResult<()> {
        let unit = self
            .registry
            .resolve(&task.kind)
            .ok_or_else(|| SchedulerError::unknown_kind(&task.name, &task.kind))?;

        let work = AssertUnwindSafe(unit.execute(ctx)).catch_unwind();
        let result = match task.timeout().or(self.default_timeout) {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => {
                    cancellation.cancel();
                    return Err(SchedulerError::ExecutionTimeout {
                        timeout_seconds: limit.as_secs(),
                    });
                }
            },
            None => work.await,
        };

        result.unwrap_or_else(|panic| Err(SchedulerError::task_execution(panic_message(panic))))
    }
}

fn classify(result: SchedulerResult<()>, shutting_down: bool) -> (RunOutcome, Option<String>) {
    match result {
        Ok(()) => (RunOutcome::Succeeded, None),
        Err(e @ SchedulerError::ExecutionTimeout { .. }) => (RunOutcome::TimedOut, Some(e.to_string())),
        Err(e) if shutting_down => (RunOutcome::Cancelled, Some(e.to_string())),
        Err(e) => (RunOutcome::Failed, Some(e.to_string())),
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("任务执行时发生panic: {detail}")
}
