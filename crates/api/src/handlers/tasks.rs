use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use scheduler_domain::{next_due_at, Clock, TaskDescriptor, TaskDescriptorStore};
use scheduler_errors::SchedulerError;
use scheduler_infrastructure::StructuredLogger;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    response::{accepted, success},
    routes::AppState,
};

/// 任务视图，附带下次到期时间
#[derive(Debug, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: TaskDescriptor,
    pub next_due_at: Option<DateTime<Utc>>,
}

impl From<TaskDescriptor> for TaskView {
    fn from(task: TaskDescriptor) -> Self {
        let next_due_at = if task.enabled {
            next_due_at(&task)
        } else {
            None
        };
        Self { task, next_due_at }
    }
}

/// 修改执行间隔请求
#[derive(Debug, Deserialize)]
pub struct UpdateIntervalRequest {
    pub interval_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub task: String,
    pub trigger: &'static str,
}

async fn find_task(state: &AppState, name: &str) -> ApiResult<TaskDescriptor> {
    state
        .scheduler
        .store()
        .get_by_name(name)
        .await?
        .ok_or_else(|| SchedulerError::task_not_found(name).into())
}

/// 获取任务列表
pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let tasks = state.scheduler.store().list().await?;
    let views: Vec<TaskView> = tasks.into_iter().map(TaskView::from).collect();
    Ok(success(views))
}

/// 获取单个任务
pub async fn get_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task = find_task(&state, &name).await?;
    Ok(success(TaskView::from(task)))
}

async fn set_enabled(state: &AppState, name: &str, enabled: bool) -> ApiResult<TaskView> {
    let task = find_task(state, name).await?;
    let now = state.scheduler.runner().clock().now();
    let updated = state.scheduler.store().set_enabled(task.id, enabled, now).await?;
    StructuredLogger::log_admin_change(&updated.name, "enabled", &enabled.to_string());
    Ok(TaskView::from(updated))
}

/// 启用任务，从禁用变为启用时刷新到期基准
pub async fn enable_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(set_enabled(&state, &name, true).await?))
}

/// 停用任务，正在进行的运行不受影响
pub async fn disable_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(set_enabled(&state, &name, false).await?))
}

/// 修改执行间隔
pub async fn update_interval(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UpdateIntervalRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.interval_seconds <= 0 {
        return Err(ApiError::BadRequest(format!(
            "interval_seconds 必须大于0，当前为 {}",
            request.interval_seconds
        )));
    }
    let task = find_task(&state, &name).await?;
    let updated = state
        .scheduler
        .store()
        .set_interval(task.id, request.interval_seconds)
        .await?;
    StructuredLogger::log_admin_change(
        &updated.name,
        "interval_seconds",
        &request.interval_seconds.to_string(),
    );
    Ok(success(TaskView::from(updated)))
}

/// 立即运行任务，不等待运行结束
pub async fn run_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    // 运行在后台进行，句柄直接丢弃
    let _handle = state.scheduler.run_now(&name).await?;
    Ok(accepted(
        RunAccepted {
            task: name,
            trigger: "manual",
        },
        "任务已派发",
    ))
}
