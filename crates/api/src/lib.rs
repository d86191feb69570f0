//! # Scheduler API
//!
//! 周期任务调度器的管理接口，基于Axum构建。
//!
//! ## API 端点
//!
//! - `GET /health` - 健康检查
//! - `GET /api/tasks` - 任务列表（含运行状态和下次到期时间）
//! - `GET /api/tasks/{name}` - 任务详情
//! - `POST /api/tasks/{name}/enable` - 启用任务
//! - `POST /api/tasks/{name}/disable` - 停用任务
//! - `POST /api/tasks/{name}/interval` - 修改执行间隔
//! - `POST /api/tasks/{name}/run` - 立即运行
//! - `GET /api/scheduler` - 调度器状态
//! - `GET /metrics` - Prometheus指标

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;
pub use routes::{create_app, create_routes, AppState};
