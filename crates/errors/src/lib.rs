use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("任务存储不可用: {0}")]
    StoreUnavailable(String),
    #[error("任务未找到: {name}")]
    TaskNotFound { name: String },
    #[error("任务ID未找到: {id}")]
    TaskIdNotFound { id: i64 },
    #[error("任务 {name} 的类型 {kind} 未注册")]
    UnknownKind { name: String, kind: String },
    #[error("任务类型重复注册: {0}")]
    DuplicateKind(String),
    #[error("任务 {name} 正在运行")]
    AlreadyRunning { name: String },
    #[error("调度器未运行")]
    NotRunning,
    #[error("任务执行错误: {0}")]
    TaskExecution(String),
    #[error("任务执行超时: {timeout_seconds}秒")]
    ExecutionTimeout { timeout_seconds: u64 },
    #[error("任务因关闭而取消")]
    Cancelled,
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn store_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::StoreUnavailable(msg.into())
    }
    pub fn task_not_found<S: Into<String>>(name: S) -> Self {
        Self::TaskNotFound { name: name.into() }
    }
    pub fn task_id_not_found(id: i64) -> Self {
        Self::TaskIdNotFound { id }
    }
    pub fn unknown_kind<N: Into<String>, K: Into<String>>(name: N, kind: K) -> Self {
        Self::UnknownKind {
            name: name.into(),
            kind: kind.into(),
        }
    }
    pub fn task_execution<S: Into<String>>(msg: S) -> Self {
        Self::TaskExecution(msg.into())
    }
    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTaskParams(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }

    /// 任务存储读写失败，整轮调度需要放弃并在下一轮重试
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            SchedulerError::Database(_) | SchedulerError::StoreUnavailable(_)
        )
    }

    /// 任务本身的失败（会触发 StopOnError 策略）
    pub fn is_task_failure(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskExecution(_)
                | SchedulerError::ExecutionTimeout { .. }
                | SchedulerError::InvalidTaskParams(_)
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, SchedulerError::Cancelled)
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SchedulerError::UnknownKind { .. }
                | SchedulerError::DuplicateKind(_)
                | SchedulerError::Configuration(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            SchedulerError::TaskNotFound { .. } | SchedulerError::TaskIdNotFound { .. } => {
                "请求的任务不存在"
            }
            SchedulerError::UnknownKind { .. } => "任务类型未注册，请检查配置",
            SchedulerError::AlreadyRunning { .. } => "任务正在运行，请稍后重试",
            SchedulerError::NotRunning => "调度器未运行",
            SchedulerError::InvalidTaskParams(_) => "任务参数配置有误",
            SchedulerError::ValidationError(_) => "输入数据验证失败",
            SchedulerError::StoreUnavailable(_) | SchedulerError::Database(_) => {
                "任务存储暂不可用，请稍后重试"
            }
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
