//! 把宿主进程的启动/关闭事件绑定到调度器的启动/排空

use std::sync::Arc;

use scheduler_errors::SchedulerResult;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::coordinator::{DrainReport, Scheduler, SchedulerState};

pub struct LifecycleManager {
    scheduler: Arc<Scheduler>,
}

impl LifecycleManager {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub async fn start(&self) -> SchedulerResult<()> {
        info!("启动周期任务调度器");
        self.scheduler.start().await
    }

    /// 排空调度器，重复调用是安全的
    pub async fn stop(&self) -> SchedulerResult<DrainReport> {
        match self.scheduler.state() {
            SchedulerState::Stopped => {
                debug!("调度器已经停止");
                Ok(DrainReport::default())
            }
            SchedulerState::Draining => {
                debug!("调度器正在排空，等待其停止");
                let mut state = self.scheduler.subscribe_state();
                let _ = state.wait_for(|s| *s == SchedulerState::Stopped).await;
                Ok(DrainReport::default())
            }
            SchedulerState::Running => self.scheduler.drain().await,
        }
    }

    /// 启动调度器并一直运行到收到关闭信号，然后排空
    pub async fn run(
        &self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SchedulerResult<DrainReport> {
        self.start().await?;
        // 发送端被丢弃同样视为关闭
        let _ = shutdown_rx.recv().await;
        info!("收到关闭信号，开始排空调度器");
        let report = self.stop().await?;
        info!(
            "调度器已停止: completed={}, abandoned={}",
            report.completed, report.abandoned
        );
        Ok(report)
    }
}
