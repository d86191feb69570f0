//! 调度协调器
//!
//! 每一轮列出全部任务描述，判断到期，逐个认领并派发到独立的并发运行中。
//! 调度循环从不等待已派发的运行结束；运行之间没有顺序保证。

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use scheduler_domain::{is_due, RunEvent, RunTrigger, TaskDescriptor, TaskDescriptorStore};
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_infrastructure::{MetricsCollector, StructuredLogger};
use scheduler_worker::TaskRunner;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::settings::SchedulerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
    Draining,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Stopped => "stopped",
            SchedulerState::Running => "running",
            SchedulerState::Draining => "draining",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单轮调度的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub evaluated: usize,
    pub due: usize,
    pub dispatched: usize,
    pub skipped_unknown: usize,
}

/// 排空结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// 排空期间结束的运行
    pub completed: usize,
    /// 截止时间到达时仍未结束的运行
    pub abandoned: usize,
}

/// 一次启动期间共享的派发资源
#[derive(Clone)]
struct RunSet {
    shutdown: CancellationToken,
    tracker: TaskTracker,
    finished: Arc<AtomicUsize>,
}

impl RunSet {
    fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }
}

pub struct Scheduler {
    runner: TaskRunner,
    settings: SchedulerSettings,
    metrics: Arc<MetricsCollector>,
    state: watch::Sender<SchedulerState>,
    run_set: RwLock<Option<RunSet>>,
    loop_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    unknown_kinds: Mutex<HashSet<(String, String)>>,
}

impl Scheduler {
    pub fn new(runner: TaskRunner, settings: SchedulerSettings) -> Self {
        let (state, _) = watch::channel(SchedulerState::Stopped);
        Self {
            runner: runner.with_default_timeout(settings.default_task_timeout),
            settings,
            metrics: Arc::new(MetricsCollector::new()),
            state,
            run_set: RwLock::new(None),
            loop_handle: tokio::sync::Mutex::new(None),
            unknown_kinds: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    pub fn store(&self) -> &Arc<dyn TaskDescriptorStore> {
        self.runner.store()
    }

    pub fn registered_kinds(&self) -> Vec<String> {
        self.runner.registry().kinds()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// 当前仍在执行的运行数量
    pub async fn in_flight(&self) -> usize {
        self.run_set
            .read()
            .await
            .as_ref()
            .map(|set| set.tracker.len())
            .unwrap_or(0)
    }

    fn transition(&self, from: SchedulerState, to: SchedulerState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            StructuredLogger::log_state_change(from.as_str(), to.as_str());
        }
        changed
    }

    /// Stopped → Running，启动调度循环
    ///
    /// 第一轮在一个 `tick_interval` 之后触发。
    pub async fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        let mut run_set = self.run_set.write().await;
        if !self.transition(SchedulerState::Stopped, SchedulerState::Running) {
            return Err(SchedulerError::Internal(format!(
                "调度器当前状态为 {}，无法启动",
                self.state()
            )));
        }

        let set = RunSet::new();
        *run_set = Some(set.clone());
        self.unknown_kinds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move { scheduler.tick_loop(set.shutdown).await });
        *self.loop_handle.lock().await = Some(handle);

        info!(
            "调度器已启动: tick_interval={:?}, drain_deadline={:?}",
            self.settings.tick_interval, self.settings.drain_deadline
        );
        Ok(())
    }

    async fn tick_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut failures: u32 = 0;
        let mut next_tick = Instant::now() + self.settings.tick_interval;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep_until(next_tick) => {}
            }

            let tick_started = Instant::now();
            match self.tick().await {
                Ok(_) => {
                    if failures > 0 {
                        info!("任务存储已恢复，此前连续失败 {failures} 次");
                    }
                    failures = 0;
                }
                Err(e) if e.is_store_failure() => {
                    failures = failures.saturating_add(1);
                    self.metrics.record_store_failure();
                    StructuredLogger::log_store_unavailable(
                        &e,
                        self.settings.store_backoff(failures).as_millis() as u64,
                        failures,
                    );
                }
                Err(SchedulerError::NotRunning) => break,
                Err(e) => error!("调度轮次失败: {e}"),
            }
            next_tick = tick_started + self.settings.store_backoff(failures);
        }

        debug!("调度循环已退出");
    }

    /// 执行一轮调度
    ///
    /// 只有任务存储故障会让整轮失败，单个任务的问题在本轮内被吸收。
    pub async fn tick(&self) -> SchedulerResult<TickReport> {
        let guard = self.run_set.read().await;
        let run_set = match guard.as_ref() {
            Some(set) if !set.shutdown.is_cancelled() => set,
            _ => return Err(SchedulerError::NotRunning),
        };

        let timer = std::time::Instant::now();
        let store = self.runner.store();
        let registry = self.runner.registry();
        let now = self.runner.clock().now();

        let tasks = store.list().await?;
        let mut report = TickReport {
            evaluated: tasks.len(),
            ..TickReport::default()
        };

        for task in tasks {
            if run_set.shutdown.is_cancelled() {
                debug!("调度器正在排空，停止本轮派发");
                break;
            }
            if !is_due(&task, now) {
                continue;
            }
            report.due += 1;

            if !registry.contains(&task.kind) {
                self.note_unknown_kind(&task);
                report.skipped_unknown += 1;
                continue;
            }

            match store.claim_due(task.id, now).await {
                Ok(true) if run_set.shutdown.is_cancelled() => {
                    // 认领期间开始排空
                    store.release(task.id).await;
                    debug!("调度器正在排空，放弃已认领的任务 {}", task.name);
                    break;
                }
                Ok(true) => {
                    self.dispatch(run_set, task, RunTrigger::Scheduled);
                    report.dispatched += 1;
                }
                Ok(false) => debug!("任务 {} 已被认领或不再到期，跳过", task.name),
                Err(e) if e.is_store_failure() => return Err(e),
                Err(e) => warn!("认领任务 {} 失败: {e}", task.name),
            }
        }

        let elapsed = timer.elapsed();
        self.metrics
            .record_tick(elapsed.as_secs_f64(), report.dispatched);
        self.metrics.set_in_flight(run_set.tracker.len());
        StructuredLogger::log_tick(
            report.evaluated,
            report.dispatched,
            report.skipped_unknown,
            elapsed.as_millis() as u64,
        );
        Ok(report)
    }

    fn note_unknown_kind(&self, task: &TaskDescriptor) {
        let first_seen = self
            .unknown_kinds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((task.name.clone(), task.kind.clone()));
        if first_seen {
            self.metrics.record_unknown_kind(&task.kind);
        }
        StructuredLogger::log_unknown_kind(task.id, &task.name, &task.kind, first_seen);
    }

    fn dispatch(
        &self,
        run_set: &RunSet,
        task: TaskDescriptor,
        trigger: RunTrigger,
    ) -> JoinHandle<RunEvent> {
        StructuredLogger::log_task_dispatched(task.id, &task.name, &task.kind, trigger.as_str());

        let runner = self.runner.clone();
        let shutdown = run_set.shutdown.clone();
        let finished = run_set.finished.clone();
        let handle = run_set.tracker.spawn(async move {
            let event = runner.run(task, trigger, shutdown).await;
            finished.fetch_add(1, Ordering::SeqCst);
            event
        });
        self.metrics.set_in_flight(run_set.tracker.len());
        handle
    }

    /// 立即运行指定任务，忽略到期判断但仍遵守运行互斥
    pub async fn run_now(&self, name: &str) -> SchedulerResult<JoinHandle<RunEvent>> {
        let guard = self.run_set.read().await;
        let run_set = match guard.as_ref() {
            Some(set) if !set.shutdown.is_cancelled() => set,
            _ => return Err(SchedulerError::NotRunning),
        };

        let store = self.runner.store();
        let task = store
            .get_by_name(name)
            .await?
            .ok_or_else(|| SchedulerError::task_not_found(name))?;
        if !self.runner.registry().contains(&task.kind) {
            return Err(SchedulerError::unknown_kind(&task.name, &task.kind));
        }
        if !store.claim(task.id).await? {
            return Err(SchedulerError::AlreadyRunning { name: task.name });
        }
        if run_set.shutdown.is_cancelled() {
            store.release(task.id).await;
            return Err(SchedulerError::NotRunning);
        }

        info!("手动触发任务: {}", task.name);
        Ok(self.dispatch(run_set, task, RunTrigger::Manual))
    }

    /// Running → Draining → Stopped
    ///
    /// 停止派发，向所有运行发出取消信号，最多等待 `drain_deadline`。
    /// 超时未结束的运行被放弃，但它们结束时仍会写回簿记。
    pub async fn drain(&self) -> SchedulerResult<DrainReport> {
        let drain_started = Instant::now();
        let deadline = drain_started + self.settings.drain_deadline;

        // 状态切换与取消之间没有挂起点，观察到 Draining 时取消已经生效
        let finished_before = {
            let guard = self.run_set.read().await;
            if !self.transition(SchedulerState::Running, SchedulerState::Draining) {
                return Err(SchedulerError::NotRunning);
            }
            // 先取消，正在进行的一轮调度才会尽快释放读锁
            match guard.as_ref() {
                Some(set) => {
                    set.shutdown.cancel();
                    set.finished.load(Ordering::SeqCst)
                }
                None => 0,
            }
        };
        let run_set = self.run_set.write().await.take();

        if let Some(handle) = self.loop_handle.lock().await.take() {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                warn!("调度循环未在排空截止时间前退出");
            }
        }

        let report = match run_set {
            Some(set) => {
                set.tracker.close();
                let _ = tokio::time::timeout_at(deadline, set.tracker.wait()).await;
                DrainReport {
                    completed: set
                        .finished
                        .load(Ordering::SeqCst)
                        .saturating_sub(finished_before),
                    abandoned: set.tracker.len(),
                }
            }
            None => DrainReport::default(),
        };

        self.metrics.set_in_flight(report.abandoned);
        StructuredLogger::log_drain_complete(
            report.completed,
            report.abandoned,
            drain_started.elapsed().as_millis() as u64,
        );
        self.transition(SchedulerState::Draining, SchedulerState::Stopped);
        Ok(report)
    }
}
