//! Structured logging utilities
//!
//! 调度器各个环节的结构化日志，字段名统一使用 `event`、`task.*`、`scheduler.*` 前缀。

use chrono::{DateTime, Utc};
use scheduler_domain::{RunEvent, RunOutcome};
use tracing::{debug, error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log task dispatch
    pub fn log_task_dispatched(task_id: i64, task_name: &str, kind: &str, trigger: &str) {
        info!(
            event = "task_dispatched",
            task.id = task_id,
            task.name = task_name,
            task.kind = kind,
            task.trigger = trigger,
            "Task dispatched"
        );
    }

    /// Log task run start
    pub fn log_task_run_start(
        task_id: i64,
        task_name: &str,
        kind: &str,
        started_at: DateTime<Utc>,
    ) {
        debug!(
            event = "task_run_start",
            task.id = task_id,
            task.name = task_name,
            task.kind = kind,
            task.started_at = %started_at,
            "Task run started"
        );
    }

    /// Log a finished run; failures go out at error level
    pub fn log_run_event(run: &RunEvent) {
        match run.outcome {
            RunOutcome::Succeeded => info!(
                event = "task_run_complete",
                task.id = run.task_id,
                task.name = %run.task_name,
                task.kind = %run.kind,
                task.trigger = run.trigger.as_str(),
                task.started_at = %run.started_at,
                task.duration_ms = run.duration_ms,
                task.outcome = run.outcome.as_str(),
                "Task run completed successfully"
            ),
            RunOutcome::Cancelled => warn!(
                event = "task_run_cancelled",
                task.id = run.task_id,
                task.name = %run.task_name,
                task.kind = %run.kind,
                task.started_at = %run.started_at,
                task.duration_ms = run.duration_ms,
                task.outcome = run.outcome.as_str(),
                "Task run cancelled by shutdown"
            ),
            RunOutcome::Failed | RunOutcome::TimedOut => error!(
                event = "task_run_failed",
                task.id = run.task_id,
                task.name = %run.task_name,
                task.kind = %run.kind,
                task.trigger = run.trigger.as_str(),
                task.started_at = %run.started_at,
                task.duration_ms = run.duration_ms,
                task.outcome = run.outcome.as_str(),
                task.error = run.error_detail.as_deref().unwrap_or("Unknown error"),
                "Task run failed"
            ),
        }
    }

    /// Log StopOnError escalation
    pub fn log_task_auto_disabled(task_id: i64, task_name: &str, kind: &str) {
        warn!(
            event = "task_auto_disabled",
            task.id = task_id,
            task.name = task_name,
            task.kind = kind,
            "Task disabled after failure, waiting for operator"
        );
    }

    /// Log unknown task kind; first sighting is a warning, repeats are debug
    pub fn log_unknown_kind(task_id: i64, task_name: &str, kind: &str, first_seen: bool) {
        if first_seen {
            warn!(
                event = "unknown_task_kind",
                task.id = task_id,
                task.name = task_name,
                task.kind = kind,
                "Task kind is not registered, task will be skipped"
            );
        } else {
            debug!(
                event = "unknown_task_kind",
                task.id = task_id,
                task.name = task_name,
                task.kind = kind,
                "Skipping task with unregistered kind"
            );
        }
    }

    /// Log a tick summary
    pub fn log_tick(evaluated: usize, dispatched: usize, skipped_unknown: usize, duration_ms: u64) {
        debug!(
            event = "scheduler_tick",
            scheduler.evaluated = evaluated,
            scheduler.dispatched = dispatched,
            scheduler.skipped_unknown = skipped_unknown,
            scheduler.duration_ms = duration_ms,
            "Scheduler tick completed"
        );
    }

    /// Log store failure that aborted a tick
    pub fn log_store_unavailable(error: &dyn std::error::Error, backoff_ms: u64, attempt: u32) {
        error!(
            event = "store_unavailable",
            error.message = %error,
            scheduler.backoff_ms = backoff_ms,
            scheduler.failed_attempts = attempt,
            "Task store unavailable, tick skipped"
        );
    }

    /// Log bookkeeping write failure inside a runner
    pub fn log_bookkeeping_error(task_id: i64, task_name: &str, stage: &str, error: &dyn std::error::Error) {
        error!(
            event = "bookkeeping_error",
            task.id = task_id,
            task.name = task_name,
            bookkeeping.stage = stage,
            error.message = %error,
            "Failed to write task bookkeeping"
        );
    }

    /// Log scheduler state transition
    pub fn log_state_change(from: &str, to: &str) {
        info!(
            event = "scheduler_state_change",
            scheduler.from = from,
            scheduler.to = to,
            "Scheduler state changed"
        );
    }

    /// Log drain result
    pub fn log_drain_complete(completed: usize, abandoned: usize, duration_ms: u64) {
        if abandoned == 0 {
            info!(
                event = "scheduler_drained",
                drain.completed = completed,
                drain.abandoned = abandoned,
                drain.duration_ms = duration_ms,
                "All in-flight task runs finished"
            );
        } else {
            warn!(
                event = "scheduler_drained",
                drain.completed = completed,
                drain.abandoned = abandoned,
                drain.duration_ms = duration_ms,
                "Drain deadline elapsed, abandoning remaining task runs"
            );
        }
    }

    /// Log administrative change to a task
    pub fn log_admin_change(task_name: &str, setting: &str, new_value: &str) {
        info!(
            event = "task_admin_change",
            task.name = task_name,
            config.setting = setting,
            config.new_value = new_value,
            "Task setting changed by operator"
        );
    }
}
