use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use scheduler_api::{create_app, AppState};
use scheduler_config::{AppConfig, TaskSeedConfig};
use scheduler_dispatcher::{DrainReport, LifecycleManager, Scheduler, SchedulerSettings};
use scheduler_domain::{Clock, SystemClock, TaskDescriptorStore};
use scheduler_infrastructure::{ObservabilityEventSink, SqliteTaskStore};
use scheduler_worker::{default_manifest, TaskRegistry, TaskRunner};
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};
use tracing::{error, info, warn};

/// 主应用程序：任务存储、调度器和管理API的组装
pub struct Application {
    config: AppConfig,
    lifecycle: LifecycleManager,
    metrics: Option<PrometheusHandle>,
}

impl Application {
    /// 按配置打开SQLite存储并组装应用
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("连接任务存储: {}", config.database.url);
        let store = SqliteTaskStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("打开任务存储失败")?;

        let metrics = if config.observability.metrics_enabled {
            Some(install_metrics_recorder()?)
        } else {
            None
        };

        Self::with_store(config, Arc::new(store), metrics).await
    }

    /// 使用外部提供的存储组装应用
    pub async fn with_store(
        config: AppConfig,
        store: Arc<dyn TaskDescriptorStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = TaskRegistry::from_manifest(default_manifest())
            .context("注册内置任务类型失败")?;

        seed_tasks(store.as_ref(), &config.tasks, clock.now()).await?;
        for seed in config.tasks.iter().filter(|t| !registry.contains(&t.kind)) {
            warn!(
                "种子任务 {} 的类型 {} 未注册，调度器会跳过它",
                seed.name, seed.kind
            );
        }

        let sink = Arc::new(ObservabilityEventSink::new(
            config.observability.metrics_enabled,
        ));
        let runner = TaskRunner::new(store, Arc::new(registry), sink, clock);
        let settings = SchedulerSettings::from(&config.scheduler);
        let scheduler = Arc::new(Scheduler::new(runner, settings));

        Ok(Self {
            config,
            lifecycle: LifecycleManager::new(scheduler),
            metrics,
        })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        self.lifecycle.scheduler()
    }

    /// 运行调度器（以及启用时的管理API），直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<DrainReport> {
        let api_handle = if self.config.api.enabled {
            Some(self.spawn_api(shutdown_rx.resubscribe()).await?)
        } else {
            None
        };

        let result = self.lifecycle.run(shutdown_rx).await;

        if let Some(handle) = api_handle {
            if result.is_err() {
                handle.abort();
            }
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("API服务器任务异常退出: {e}");
                }
            }
        }

        result.context("调度器运行失败")
    }

    async fn spawn_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<JoinHandle<()>> {
        let mut state = AppState::new(Arc::clone(self.scheduler()));
        if let Some(handle) = &self.metrics {
            state = state.with_metrics(handle.clone());
        }
        let app = create_app(
            state,
            &self.config.observability.metrics_endpoint,
            self.config.api.cors_enabled,
        );

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        Ok(tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            };
            if let Err(e) = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("API服务器运行失败: {e}");
            }
            info!("API服务器已停止");
        }))
    }
}

/// 把配置中的种子任务写入存储，已存在的同名任务保持不变
async fn seed_tasks(
    store: &dyn TaskDescriptorStore,
    seeds: &[TaskSeedConfig],
    now: DateTime<Utc>,
) -> Result<()> {
    for seed in seeds {
        let task = store
            .insert_if_missing(&seed.to_new_task(), now)
            .await
            .with_context(|| format!("写入种子任务失败: {}", seed.name))?;
        info!(
            "任务就绪: id={}, name={}, kind={}, interval={}s, enabled={}",
            task.id, task.name, task.kind, task.interval_seconds, task.enabled
        );
    }
    Ok(())
}

fn install_metrics_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("安装Prometheus指标记录器失败")
}
