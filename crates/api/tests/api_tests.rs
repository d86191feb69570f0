use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use scheduler_api::{create_app, create_routes, AppState};
use scheduler_dispatcher::{Scheduler, SchedulerSettings};
use scheduler_domain::{Clock, TaskDescriptorStore};
use scheduler_infrastructure::InMemoryTaskStore;
use scheduler_testing_utils::{
    ManualClock, RecordingEventSink, ScriptedTask, TaskDescriptorBuilder, TestEnv,
};
use scheduler_worker::{TaskRegistry, TaskRunner};
use serde_json::Value;
use tower::ServiceExt;

struct TestApp {
    store: Arc<InMemoryTaskStore>,
    sink: Arc<RecordingEventSink>,
    clock: Arc<ManualClock>,
    scheduler: Arc<Scheduler>,
}

impl TestApp {
    fn new(task: ScriptedTask) -> Self {
        let store = Arc::new(InMemoryTaskStore::with_tasks(vec![
            TaskDescriptorBuilder::new()
                .with_id(1)
                .with_name("ping")
                .with_interval(300)
                .build(),
            TaskDescriptorBuilder::new()
                .with_id(2)
                .with_name("purge")
                .disabled()
                .stop_on_error()
                .build(),
        ]));
        let sink = Arc::new(RecordingEventSink::new());
        let clock = Arc::new(ManualClock::new(TestEnv::epoch()));
        let registry = TaskRegistry::builder()
            .register("scripted", move || task.clone())
            .build()
            .unwrap();
        let runner = TaskRunner::new(
            store.clone(),
            Arc::new(registry),
            sink.clone(),
            clock.clone(),
        );
        let settings = SchedulerSettings::default().with_tick_interval(Duration::from_secs(3600));
        let scheduler = Arc::new(Scheduler::new(runner, settings));
        Self {
            store,
            sink,
            clock,
            scheduler,
        }
    }

    fn router(&self) -> Router {
        create_routes(AppState::new(self.scheduler.clone()), "/metrics")
    }
}

async fn send(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(ScriptedTask::succeeding());
    let (status, body) = send(app.router(), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["scheduler"], "stopped");
}

#[tokio::test]
async fn test_list_and_get_tasks() {
    let app = TestApp::new(ScriptedTask::succeeding());

    let (status, body) = send(app.router(), "GET", "/api/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let tasks = body["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["name"], "ping");
    assert_eq!(tasks[0]["running"], false);
    assert!(tasks[0]["next_due_at"].is_string());
    // 禁用的任务没有下次到期时间
    assert!(tasks[1]["next_due_at"].is_null());

    let (status, body) = send(app.router(), "GET", "/api/tasks/ping", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["interval_seconds"], 300);
    assert_eq!(body["data"]["kind"], "scripted");

    let (status, body) = send(app.router(), "GET", "/api/tasks/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "TASK_NOT_FOUND");
}

#[tokio::test]
async fn test_enable_and_disable() {
    let app = TestApp::new(ScriptedTask::succeeding());
    app.clock.advance_secs(600);

    let (status, body) = send(app.router(), "POST", "/api/tasks/purge/enable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], true);

    let stored = app.store.get(2).await.unwrap().unwrap();
    assert!(stored.enabled);
    assert_eq!(stored.last_enabled_utc, Some(app.clock.now()));

    let (status, body) = send(app.router(), "POST", "/api/tasks/purge/disable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], false);
    assert!(!app.store.get(2).await.unwrap().unwrap().enabled);

    let (status, _) = send(app.router(), "POST", "/api/tasks/nope/enable", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_interval() {
    let app = TestApp::new(ScriptedTask::succeeding());

    let (status, body) = send(
        app.router(),
        "POST",
        "/api/tasks/ping/interval",
        Some(serde_json::json!({ "interval_seconds": 900 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["interval_seconds"], 900);
    assert_eq!(
        app.store.get(1).await.unwrap().unwrap().interval_seconds,
        900
    );

    let (status, body) = send(
        app.router(),
        "POST",
        "/api/tasks/ping/interval",
        Some(serde_json::json!({ "interval_seconds": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_run_now_requires_running_scheduler() {
    let app = TestApp::new(ScriptedTask::succeeding());

    let (status, body) = send(app.router(), "POST", "/api/tasks/ping/run", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "SCHEDULER_NOT_RUNNING");
}

#[tokio::test]
async fn test_run_now_dispatches_and_conflicts() {
    let app = TestApp::new(ScriptedTask::succeeding().with_delay(Duration::from_millis(300)));
    app.scheduler.start().await.unwrap();

    let (status, body) = send(app.router(), "POST", "/api/tasks/ping/run", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["task"], "ping");
    assert_eq!(body["data"]["trigger"], "manual");

    let (status, body) = send(app.router(), "POST", "/api/tasks/ping/run", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "TASK_ALREADY_RUNNING");

    assert!(app.sink.wait_for(1, Duration::from_secs(5)).await);
    app.scheduler.drain().await.unwrap();
}

#[tokio::test]
async fn test_scheduler_status() {
    let app = TestApp::new(ScriptedTask::succeeding());
    app.scheduler.start().await.unwrap();

    let (status, body) = send(app.router(), "GET", "/api/scheduler", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "running");
    assert_eq!(body["data"]["in_flight"], 0);
    assert_eq!(body["data"]["registered_kinds"][0], "scripted");
    assert_eq!(body["data"]["tick_interval_seconds"], 3600);

    app.scheduler.drain().await.unwrap();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new(ScriptedTask::succeeding());

    let (status, _) = send(app.router(), "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let handle = PrometheusBuilder::new().build_recorder().handle();
    let router = create_app(
        AppState::new(app.scheduler.clone()).with_metrics(handle),
        "/metrics",
        true,
    );
    let response = router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/plain"));
}
