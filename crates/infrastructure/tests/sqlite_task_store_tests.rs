use chrono::{Duration, TimeZone, Utc};
use scheduler_domain::{
    is_due, NewTaskDescriptor, RunCompletion, RunOutcome, TaskDescriptorStore,
};
use scheduler_infrastructure::SqliteTaskStore;

async fn memory_store() -> SqliteTaskStore {
    SqliteTaskStore::connect("sqlite::memory:", 1)
        .await
        .expect("Failed to create in-memory store")
}

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn test_seed_and_read_back() {
    let store = memory_store().await;

    let ping = store
        .insert_if_missing(
            &NewTaskDescriptor::new("ping", "keep_alive", 300)
                .with_timeout(10)
                .with_parameters(serde_json::json!({"url": "http://localhost/health"})),
            t0(),
        )
        .await
        .unwrap();
    let purge = store
        .insert_if_missing(
            &NewTaskDescriptor::new("purge", "shell", 60).disabled().stop_on_error(),
            t0(),
        )
        .await
        .unwrap();

    assert_eq!(ping.last_enabled_utc, Some(t0()));
    assert_eq!(ping.timeout_seconds, Some(10));
    assert_eq!(ping.parameters["url"], "http://localhost/health");
    assert_eq!(purge.last_enabled_utc, None);
    assert!(purge.stop_on_error);

    let all = store.list().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].name, "ping");

    let by_name = store.get_by_name("purge").await.unwrap().unwrap();
    assert_eq!(by_name.id, purge.id);
    assert!(store.get_by_name("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_seed_does_not_overwrite() {
    let store = memory_store().await;
    let first = store
        .insert_if_missing(&NewTaskDescriptor::new("ping", "keep_alive", 300), t0())
        .await
        .unwrap();
    store.set_interval(first.id, 120).await.unwrap();

    let again = store
        .insert_if_missing(
            &NewTaskDescriptor::new("ping", "keep_alive", 300),
            t0() + Duration::hours(1),
        )
        .await
        .unwrap();

    assert_eq!(again.id, first.id);
    assert_eq!(again.interval_seconds, 120);
    assert_eq!(again.last_enabled_utc, Some(t0()));
}

#[tokio::test]
async fn test_invalid_seed_rejected() {
    let store = memory_store().await;
    let result = store
        .insert_if_missing(&NewTaskDescriptor::new("bad", "shell", 0), t0())
        .await;
    assert!(result.is_err());
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_claim_due_and_bookkeeping() {
    let store = memory_store().await;
    let task = store
        .insert_if_missing(&NewTaskDescriptor::new("ping", "keep_alive", 300), t0())
        .await
        .unwrap();

    // 基准为启用时间，未满一个周期
    assert!(!store.claim_due(task.id, t0() + Duration::seconds(299)).await.unwrap());
    assert!(!store.is_running(task.id).await);

    let start = t0() + Duration::seconds(300);
    assert!(store.claim_due(task.id, start).await.unwrap());
    assert!(!store.claim_due(task.id, start).await.unwrap());
    assert!(!store.claim(task.id).await.unwrap());

    store.record_start(task.id, start).await.unwrap();
    let end = start + Duration::seconds(3);
    store
        .record_completion(
            task.id,
            RunCompletion::from_outcome(RunOutcome::Succeeded, false, end),
        )
        .await
        .unwrap();
    store.release(task.id).await;

    let stored = store.get(task.id).await.unwrap().unwrap();
    assert!(!stored.running);
    assert_eq!(stored.last_start_utc, Some(start));
    assert_eq!(stored.last_end_utc, Some(end));
    assert_eq!(stored.last_success_utc, Some(end));
    assert!(!is_due(&stored, start + Duration::seconds(299)));
    assert!(is_due(&stored, start + Duration::seconds(300)));
}

#[tokio::test]
async fn test_failed_completion_with_stop_on_error() {
    let store = memory_store().await;
    let task = store
        .insert_if_missing(
            &NewTaskDescriptor::new("purge", "shell", 60).stop_on_error(),
            t0(),
        )
        .await
        .unwrap();

    let success_at = t0() + Duration::seconds(60);
    store
        .record_completion(
            task.id,
            RunCompletion::from_outcome(RunOutcome::Succeeded, true, success_at),
        )
        .await
        .unwrap();

    let failed_at = t0() + Duration::seconds(130);
    let failure = RunCompletion::from_outcome(RunOutcome::Failed, true, failed_at);
    store.record_completion(task.id, failure).await.unwrap();
    // 重复写入同一结果不改变状态
    store.record_completion(task.id, failure).await.unwrap();

    let stored = store.get(task.id).await.unwrap().unwrap();
    assert!(!stored.enabled);
    assert_eq!(stored.last_end_utc, Some(failed_at));
    assert_eq!(stored.last_success_utc, Some(success_at));
}

#[tokio::test]
async fn test_set_enabled_refreshes_baseline_on_transition_only() {
    let store = memory_store().await;
    let task = store
        .insert_if_missing(&NewTaskDescriptor::new("purge", "shell", 60).disabled(), t0())
        .await
        .unwrap();

    let enabled_at = t0() + Duration::days(1);
    let enabled = store.set_enabled(task.id, true, enabled_at).await.unwrap();
    assert!(enabled.enabled);
    assert_eq!(enabled.last_enabled_utc, Some(enabled_at));
    assert!(!is_due(&enabled, enabled_at + Duration::seconds(30)));
    assert!(is_due(&enabled, enabled_at + Duration::seconds(61)));

    let again = store
        .set_enabled(task.id, true, enabled_at + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(again.last_enabled_utc, Some(enabled_at));

    let disabled = store
        .set_enabled(task.id, false, enabled_at + Duration::hours(2))
        .await
        .unwrap();
    assert!(!disabled.enabled);
    assert_eq!(disabled.last_enabled_utc, Some(enabled_at));
}

#[tokio::test]
async fn test_missing_task_errors() {
    let store = memory_store().await;
    assert!(store.record_start(7, t0()).await.is_err());
    assert!(store.set_enabled(7, true, t0()).await.is_err());
    assert!(store.set_interval(7, 10).await.is_err());
    assert!(store.claim(7).await.is_err());
    assert!(!store.claim_due(7, t0()).await.unwrap());
    assert!(!store.is_running(7).await);
}

#[tokio::test]
async fn test_running_flag_not_persisted_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("scheduler.db").display());

    let task_id = {
        let store = SqliteTaskStore::connect(&url, 2).await.unwrap();
        let task = store
            .insert_if_missing(&NewTaskDescriptor::new("ping", "keep_alive", 300), t0())
            .await
            .unwrap();
        assert!(store.claim(task.id).await.unwrap());
        store.record_start(task.id, t0()).await.unwrap();
        store.pool().close().await;
        task.id
    };

    let reopened = SqliteTaskStore::connect(&url, 2).await.unwrap();
    let task = reopened.get(task_id).await.unwrap().unwrap();
    assert!(!task.running);
    assert_eq!(task.last_start_utc, Some(t0()));
    assert!(reopened.claim(task_id).await.unwrap());
}
