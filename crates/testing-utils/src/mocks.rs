//! Mock implementations for the scheduler's seams
//!
//! 时钟、事件接收方、任务存储和工作单元的测试替身。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_domain::{
    Clock, NewTaskDescriptor, RunCompletion, RunEvent, RunEventSink, RunOutcome, TaskDescriptor,
    TaskDescriptorStore,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_worker::{ScheduledTask, TaskContext};
use tokio::sync::{watch, Notify};

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(chrono::Duration::seconds(secs));
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// 记录所有运行事件
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RunEvent>>,
    notify: Notify,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn events_for(&self, task_name: &str) -> Vec<RunEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.task_name == task_name)
            .collect()
    }

    pub fn count_outcome(&self, outcome: RunOutcome) -> usize {
        self.events().iter().filter(|e| e.outcome == outcome).count()
    }

    /// 等待事件数量达到 `count`，超时返回 false
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.count() >= count;
            }
        }
    }
}

#[async_trait]
impl RunEventSink for RecordingEventSink {
    async fn emit(&self, event: &RunEvent) {
        self.events.lock().unwrap().push(event.clone());
        self.notify.notify_waiters();
    }
}

/// 可切换故障状态的存储包装
///
/// 故障期间除 `release`/`is_running` 外的所有操作都返回 `StoreUnavailable`。
/// `pause_claims` 之后认领调用会停在存储里，直到 `resume_claims`。
pub struct FlakyStore {
    inner: Arc<dyn TaskDescriptorStore>,
    failing: AtomicBool,
    list_calls: AtomicUsize,
    failed_calls: AtomicUsize,
    claims_paused: watch::Sender<bool>,
    parked_claims: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn TaskDescriptorStore>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            failed_calls: AtomicUsize::new(0),
            claims_paused: watch::channel(false).0,
            parked_claims: AtomicUsize::new(0),
        }
    }

    pub fn pause_claims(&self) {
        self.claims_paused.send_replace(true);
    }

    pub fn resume_claims(&self) {
        self.claims_paused.send_replace(false);
    }

    /// 曾经停在暂停闸门上的认领调用数
    pub fn parked_claims(&self) -> usize {
        self.parked_claims.load(Ordering::SeqCst)
    }

    async fn claim_gate(&self) {
        let mut paused = self.claims_paused.subscribe();
        if *paused.borrow_and_update() {
            self.parked_claims.fetch_add(1, Ordering::SeqCst);
            let _ = paused.wait_for(|paused| !*paused).await;
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `list` 被调用的次数，等价于调度器尝试的轮数
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn failed_calls(&self) -> usize {
        self.failed_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> SchedulerResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
            return Err(SchedulerError::store_unavailable("模拟的存储故障"));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskDescriptorStore for FlakyStore {
    async fn list(&self) -> SchedulerResult<Vec<TaskDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.list().await
    }

    async fn get(&self, id: i64) -> SchedulerResult<Option<TaskDescriptor>> {
        self.check()?;
        self.inner.get(id).await
    }

    async fn get_by_name(&self, name: &str) -> SchedulerResult<Option<TaskDescriptor>> {
        self.check()?;
        self.inner.get_by_name(name).await
    }

    async fn insert_if_missing(
        &self,
        task: &NewTaskDescriptor,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TaskDescriptor> {
        self.check()?;
        self.inner.insert_if_missing(task, now).await
    }

    async fn claim(&self, id: i64) -> SchedulerResult<bool> {
        self.claim_gate().await;
        self.check()?;
        self.inner.claim(id).await
    }

    async fn claim_due(&self, id: i64, now: DateTime<Utc>) -> SchedulerResult<bool> {
        self.claim_gate().await;
        self.check()?;
        self.inner.claim_due(id, now).await
    }

    async fn release(&self, id: i64) {
        self.inner.release(id).await
    }

    async fn is_running(&self, id: i64) -> bool {
        self.inner.is_running(id).await
    }

    async fn record_start(&self, id: i64, started_at: DateTime<Utc>) -> SchedulerResult<()> {
        self.check()?;
        self.inner.record_start(id, started_at).await
    }

    async fn record_completion(&self, id: i64, completion: RunCompletion) -> SchedulerResult<()> {
        self.check()?;
        self.inner.record_completion(id, completion).await
    }

    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TaskDescriptor> {
        self.check()?;
        self.inner.set_enabled(id, enabled, now).await
    }

    async fn set_interval(
        &self,
        id: i64,
        interval_seconds: i64,
    ) -> SchedulerResult<TaskDescriptor> {
        self.check()?;
        self.inner.set_interval(id, interval_seconds).await
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(String),
    Panic(String),
}

/// [`ScriptedTask`] 的调用统计
#[derive(Debug, Default)]
pub struct ScriptStats {
    invocations: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    completed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl ScriptStats {
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 同一时刻最多有几个调用在执行
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct ActiveGuard(Arc<ScriptStats>);

impl ActiveGuard {
    fn enter(stats: Arc<ScriptStats>) -> Self {
        let current = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_active.fetch_max(current, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 行为可编排的工作单元
///
/// 可配置执行时长、成功/失败/panic，以及是否响应取消信号。
#[derive(Debug, Clone)]
pub struct ScriptedTask {
    delay: Duration,
    behavior: Behavior,
    failures_before_success: Option<usize>,
    honour_cancellation: bool,
    stats: Arc<ScriptStats>,
}

impl ScriptedTask {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            delay: Duration::ZERO,
            behavior,
            failures_before_success: None,
            honour_cancellation: true,
            stats: Arc::new(ScriptStats::default()),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_behavior(Behavior::Succeed)
    }

    pub fn failing(message: &str) -> Self {
        Self::with_behavior(Behavior::Fail(message.to_string()))
    }

    pub fn panicking(message: &str) -> Self {
        Self::with_behavior(Behavior::Panic(message.to_string()))
    }

    /// 前 `n` 次失败，之后成功
    pub fn failing_times(n: usize, message: &str) -> Self {
        let mut task = Self::failing(message);
        task.failures_before_success = Some(n);
        task
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 执行期间不理会取消信号
    pub fn ignoring_cancellation(mut self) -> Self {
        self.honour_cancellation = false;
        self
    }

    pub fn stats(&self) -> Arc<ScriptStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl ScheduledTask for ScriptedTask {
    async fn execute(&self, ctx: TaskContext) -> SchedulerResult<()> {
        let invocation = self.stats.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveGuard::enter(self.stats.clone());

        if !self.delay.is_zero() {
            if self.honour_cancellation {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = ctx.cancelled() => {
                        self.stats.cancelled.fetch_add(1, Ordering::SeqCst);
                        return Err(SchedulerError::Cancelled);
                    }
                }
            } else {
                tokio::time::sleep(self.delay).await;
            }
        }

        self.stats.completed.fetch_add(1, Ordering::SeqCst);
        let behavior = match self.failures_before_success {
            Some(n) if invocation > n => Behavior::Succeed,
            _ => self.behavior.clone(),
        };
        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(message) => Err(SchedulerError::task_execution(message)),
            Behavior::Panic(message) => panic!("{message}"),
        }
    }
}
