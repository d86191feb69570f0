use std::sync::Arc;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use scheduler_dispatcher::Scheduler;

use crate::handlers::{
    health::health_check,
    metrics::get_metrics,
    scheduler::get_scheduler_status,
    tasks::{disable_task, enable_task, get_task, list_tasks, run_task, update_interval},
};
use crate::middleware::{cors_layer, request_logging, trace_layer};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    /// 未启用指标时为 None
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// 创建API路由
pub fn create_routes(state: AppState, metrics_endpoint: &str) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 任务管理
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/{name}", get(get_task))
        .route("/api/tasks/{name}/enable", post(enable_task))
        .route("/api/tasks/{name}/disable", post(disable_task))
        .route("/api/tasks/{name}/interval", post(update_interval))
        .route("/api/tasks/{name}/run", post(run_task))
        // 调度器状态与指标
        .route("/api/scheduler", get(get_scheduler_status))
        .route(metrics_endpoint, get(get_metrics))
        .with_state(state)
}

/// 带中间件的完整应用
pub fn create_app(state: AppState, metrics_endpoint: &str, cors_enabled: bool) -> Router {
    let router = create_routes(state, metrics_endpoint)
        .layer(from_fn(request_logging))
        .layer(trace_layer());
    if cors_enabled {
        router.layer(cors_layer())
    } else {
        router
    }
}
