use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scheduler_errors::SchedulerError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("未找到资源")]
    NotFound,

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str) {
        match self {
            ApiError::Scheduler(err) => {
                let (status, error_type) = match err {
                    SchedulerError::TaskNotFound { .. } | SchedulerError::TaskIdNotFound { .. } => {
                        (StatusCode::NOT_FOUND, "TASK_NOT_FOUND")
                    }
                    SchedulerError::AlreadyRunning { .. } => {
                        (StatusCode::CONFLICT, "TASK_ALREADY_RUNNING")
                    }
                    SchedulerError::UnknownKind { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "UNKNOWN_TASK_KIND")
                    }
                    SchedulerError::ValidationError(_) | SchedulerError::InvalidTaskParams(_) => {
                        (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                    }
                    SchedulerError::NotRunning => {
                        (StatusCode::SERVICE_UNAVAILABLE, "SCHEDULER_NOT_RUNNING")
                    }
                    SchedulerError::StoreUnavailable(_) | SchedulerError::Database(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
                    }
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
                };
                (status, err.to_string(), error_type)
            }
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "请求的资源不存在".to_string(),
                "NOT_FOUND",
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {msg}"),
                "BAD_REQUEST",
            ),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error_type) = self.parts();
        let hint = match &self {
            ApiError::Scheduler(err) => err.user_message().to_string(),
            ApiError::NotFound => "请检查请求URL是否正确".to_string(),
            ApiError::BadRequest(_) => "请检查请求格式和参数".to_string(),
            ApiError::Internal(msg) => {
                tracing::error!("API内部错误: {msg}");
                "系统遇到内部错误，请稍后重试".to_string()
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "hint": hint,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
