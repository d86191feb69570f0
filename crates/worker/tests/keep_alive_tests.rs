use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use chrono::Utc;
use scheduler_errors::SchedulerError;
use scheduler_worker::{KeepAliveTask, ScheduledTask, TaskContext};
use tokio_util::sync::CancellationToken;

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/ok", get(|| async { "pong" }))
        .route(
            "/fail",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn context(url: String) -> TaskContext {
    TaskContext {
        task_id: 1,
        task_name: "ping".to_string(),
        kind: "keep_alive".to_string(),
        parameters: serde_json::json!({ "url": url }),
        started_at: Utc::now(),
        cancellation: CancellationToken::new(),
    }
}

#[tokio::test]
async fn test_keep_alive_success() {
    let base = spawn_server().await;
    let result = KeepAliveTask::new().execute(context(format!("{base}/ok"))).await;
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn test_keep_alive_non_2xx_fails() {
    let base = spawn_server().await;
    let result = KeepAliveTask::new().execute(context(format!("{base}/fail"))).await;
    let err = result.unwrap_err();
    assert!(matches!(err, SchedulerError::TaskExecution(_)));
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_keep_alive_honours_cancellation() {
    let base = spawn_server().await;
    let ctx = context(format!("{base}/slow"));
    let token = ctx.cancellation.clone();

    let handle = tokio::spawn(async move { KeepAliveTask::new().execute(ctx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("keep-alive did not observe cancellation")
        .unwrap();
    assert!(matches!(result, Err(SchedulerError::Cancelled)));
}
