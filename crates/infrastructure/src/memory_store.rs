//! 内存任务存储
//!
//! 不持久化任何内容，适用于测试和无数据库的嵌入场景。
//! 每个任务一把锁，写操作只锁定自己的描述。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_domain::{
    apply_enabled, is_due, NewTaskDescriptor, RunCompletion, RunningFlags, TaskDescriptor,
    TaskDescriptorStore,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

type Slot = Arc<Mutex<TaskDescriptor>>;

#[derive(Debug)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<i64, Slot>>,
    next_id: AtomicI64,
    flags: RunningFlags,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            flags: RunningFlags::new(),
        }
    }

    /// 用已有的描述初始化，传入的 `running` 值被忽略
    pub fn with_tasks(tasks: Vec<TaskDescriptor>) -> Self {
        let max_id = tasks.iter().map(|t| t.id).max().unwrap_or(0);
        let map = tasks
            .into_iter()
            .map(|mut task| {
                task.running = false;
                (task.id, Arc::new(Mutex::new(task)))
            })
            .collect();
        Self {
            tasks: RwLock::new(map),
            next_id: AtomicI64::new(max_id + 1),
            flags: RunningFlags::new(),
        }
    }

    pub async fn count(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// 直接替换一条记录，模拟外部管理端的并发写入
    pub async fn upsert(&self, mut task: TaskDescriptor) {
        task.running = false;
        let slot = self.tasks.read().await.get(&task.id).cloned();
        match slot {
            Some(slot) => *slot.lock().await = task,
            None => {
                self.tasks
                    .write()
                    .await
                    .insert(task.id, Arc::new(Mutex::new(task)));
            }
        }
    }

    async fn slot(&self, id: i64) -> Option<Slot> {
        self.tasks.read().await.get(&id).cloned()
    }

    async fn required_slot(&self, id: i64) -> SchedulerResult<Slot> {
        self.slot(id)
            .await
            .ok_or_else(|| SchedulerError::task_id_not_found(id))
    }

    fn with_flag(&self, mut task: TaskDescriptor) -> TaskDescriptor {
        task.running = self.flags.is_running(task.id);
        task
    }

    async fn snapshot(&self) -> Vec<TaskDescriptor> {
        let slots: Vec<Slot> = self.tasks.read().await.values().cloned().collect();
        let mut list = Vec::with_capacity(slots.len());
        for slot in slots {
            let task = slot.lock().await.clone();
            list.push(self.with_flag(task));
        }
        list.sort_by_key(|t| t.id);
        list
    }
}

#[async_trait]
impl TaskDescriptorStore for InMemoryTaskStore {
    async fn list(&self) -> SchedulerResult<Vec<TaskDescriptor>> {
        Ok(self.snapshot().await)
    }

    async fn get(&self, id: i64) -> SchedulerResult<Option<TaskDescriptor>> {
        match self.slot(id).await {
            Some(slot) => {
                let task = slot.lock().await.clone();
                Ok(Some(self.with_flag(task)))
            }
            None => Ok(None),
        }
    }

    async fn get_by_name(&self, name: &str) -> SchedulerResult<Option<TaskDescriptor>> {
        Ok(self.snapshot().await.into_iter().find(|t| t.name == name))
    }

    async fn insert_if_missing(
        &self,
        task: &NewTaskDescriptor,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TaskDescriptor> {
        task.validate()?;
        let mut tasks = self.tasks.write().await;
        for slot in tasks.values() {
            let existing = slot.lock().await;
            if existing.name == task.name {
                debug!("种子任务已存在，保持不变: {}", task.name);
                return Ok(self.with_flag(existing.clone()));
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let descriptor = task.clone().into_descriptor(id, now);
        tasks.insert(id, Arc::new(Mutex::new(descriptor.clone())));
        debug!("写入种子任务: {} (ID: {})", descriptor.name, id);
        Ok(descriptor)
    }

    async fn claim(&self, id: i64) -> SchedulerResult<bool> {
        self.required_slot(id).await?;
        Ok(self.flags.try_claim(id))
    }

    async fn claim_due(&self, id: i64, now: DateTime<Utc>) -> SchedulerResult<bool> {
        if !self.flags.try_claim(id) {
            return Ok(false);
        }
        // 标记已置位，按存储中的最新状态重新判断是否到期
        let due = match self.slot(id).await {
            Some(slot) => is_due(&*slot.lock().await, now),
            None => false,
        };
        if !due {
            self.flags.release(id);
        }
        Ok(due)
    }

    async fn release(&self, id: i64) {
        self.flags.release(id);
    }

    async fn is_running(&self, id: i64) -> bool {
        self.flags.is_running(id)
    }

    async fn record_start(&self, id: i64, started_at: DateTime<Utc>) -> SchedulerResult<()> {
        let slot = self.required_slot(id).await?;
        slot.lock().await.last_start_utc = Some(started_at);
        Ok(())
    }

    async fn record_completion(&self, id: i64, completion: RunCompletion) -> SchedulerResult<()> {
        let slot = self.required_slot(id).await?;
        completion.apply_to(&mut *slot.lock().await);
        Ok(())
    }

    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TaskDescriptor> {
        let slot = self.required_slot(id).await?;
        let mut task = slot.lock().await;
        apply_enabled(&mut task, enabled, now);
        Ok(self.with_flag(task.clone()))
    }

    async fn set_interval(
        &self,
        id: i64,
        interval_seconds: i64,
    ) -> SchedulerResult<TaskDescriptor> {
        if interval_seconds <= 0 {
            return Err(SchedulerError::validation_error(format!(
                "执行间隔必须大于0，当前为 {interval_seconds}"
            )));
        }
        let slot = self.required_slot(id).await?;
        let mut task = slot.lock().await;
        task.interval_seconds = interval_seconds;
        Ok(self.with_flag(task.clone()))
    }
}
