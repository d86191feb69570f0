use axum::extract::State;
use scheduler_dispatcher::SchedulerState;
use serde::Serialize;

use crate::{error::ApiResult, response::success, routes::AppState};

#[derive(Debug, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub in_flight: usize,
    pub registered_kinds: Vec<String>,
    pub tick_interval_seconds: u64,
    pub drain_deadline_seconds: u64,
}

/// 获取调度器状态
pub async fn get_scheduler_status(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let scheduler = &state.scheduler;
    let settings = scheduler.settings();
    Ok(success(SchedulerStatus {
        state: scheduler.state(),
        in_flight: scheduler.in_flight().await,
        registered_kinds: scheduler.registered_kinds(),
        tick_interval_seconds: settings.tick_interval.as_secs(),
        drain_deadline_seconds: settings.drain_deadline.as_secs(),
    }))
}
