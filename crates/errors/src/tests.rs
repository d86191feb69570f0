use crate::*;

#[test]
fn test_scheduler_error_display() {
    let error = SchedulerError::StoreUnavailable("connection refused".to_string());
    assert_eq!(error.to_string(), "任务存储不可用: connection refused");

    let error = SchedulerError::task_not_found("ping");
    assert_eq!(error.to_string(), "任务未找到: ping");

    let error = SchedulerError::task_id_not_found(42);
    assert_eq!(error.to_string(), "任务ID未找到: 42");

    let error = SchedulerError::unknown_kind("purge", "delete_guests");
    assert_eq!(error.to_string(), "任务 purge 的类型 delete_guests 未注册");

    let error = SchedulerError::ExecutionTimeout { timeout_seconds: 30 };
    assert_eq!(error.to_string(), "任务执行超时: 30秒");

    assert_eq!(SchedulerError::Cancelled.to_string(), "任务因关闭而取消");
    assert_eq!(SchedulerError::NotRunning.to_string(), "调度器未运行");

    let error = SchedulerError::AlreadyRunning {
        name: "ping".to_string(),
    };
    assert_eq!(error.to_string(), "任务 ping 正在运行");
}

#[test]
fn test_store_failure_classification() {
    assert!(SchedulerError::store_unavailable("down").is_store_failure());
    assert!(SchedulerError::Database(sqlx::Error::PoolTimedOut).is_store_failure());

    assert!(!SchedulerError::task_execution("boom").is_store_failure());
    assert!(!SchedulerError::unknown_kind("a", "b").is_store_failure());
    assert!(!SchedulerError::Cancelled.is_store_failure());
}

#[test]
fn test_task_failure_classification() {
    assert!(SchedulerError::task_execution("boom").is_task_failure());
    assert!(SchedulerError::ExecutionTimeout { timeout_seconds: 1 }.is_task_failure());
    assert!(SchedulerError::invalid_params("missing url").is_task_failure());

    // 关闭取消不是任务失败
    assert!(!SchedulerError::Cancelled.is_task_failure());
    assert!(SchedulerError::Cancelled.is_cancellation());
    assert!(!SchedulerError::store_unavailable("down").is_task_failure());
}

#[test]
fn test_configuration_classification() {
    assert!(SchedulerError::unknown_kind("a", "b").is_configuration());
    assert!(SchedulerError::DuplicateKind("shell".to_string()).is_configuration());
    assert!(SchedulerError::config_error("bad").is_configuration());
    assert!(!SchedulerError::task_execution("boom").is_configuration());
}

#[test]
fn test_user_message() {
    assert_eq!(
        SchedulerError::task_not_found("ping").user_message(),
        "请求的任务不存在"
    );
    assert_eq!(
        SchedulerError::AlreadyRunning {
            name: "ping".to_string()
        }
        .user_message(),
        "任务正在运行，请稍后重试"
    );
    assert_eq!(
        SchedulerError::store_unavailable("down").user_message(),
        "任务存储暂不可用，请稍后重试"
    );
    assert_eq!(
        SchedulerError::Internal("oops".to_string()).user_message(),
        "系统繁忙，请稍后重试"
    );
}

#[test]
fn test_error_conversions() {
    let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: SchedulerError = json_error.into();
    assert!(matches!(error, SchedulerError::Serialization(_)));

    let error: SchedulerError = anyhow::anyhow!("wrapped").into();
    assert!(matches!(error, SchedulerError::Internal(ref msg) if msg == "wrapped"));
}
