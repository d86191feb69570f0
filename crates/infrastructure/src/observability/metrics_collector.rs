//! Metrics collector for the recurring scheduler
//!
//! 使用 `metrics` 门面记录，导出器由宿主进程安装（Prometheus）。
//! 未安装导出器时所有记录都是空操作。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use scheduler_domain::RunEvent;

pub struct MetricsCollector {
    ticks_total: Counter,
    tick_duration: Histogram,
    store_failures_total: Counter,
    in_flight_runs: Gauge,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            ticks_total: counter!("scheduler_ticks_total"),
            tick_duration: histogram!("scheduler_tick_duration_seconds"),
            store_failures_total: counter!("scheduler_store_failures_total"),
            in_flight_runs: gauge!("scheduler_in_flight_runs"),
        }
    }

    /// Record a task run completion
    pub fn record_run(&self, run: &RunEvent) {
        let kind = run.kind.clone();
        let outcome = run.outcome.as_str();

        counter!(
            "scheduler_task_runs_total",
            "kind" => kind.clone(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("scheduler_task_run_duration_seconds", "kind" => kind.clone())
            .record(run.duration_ms as f64 / 1000.0);

        if run.outcome.is_failure() {
            counter!("scheduler_task_failures_total", "kind" => kind).increment(1);
        }
    }

    pub fn record_auto_disabled(&self, kind: &str) {
        counter!("scheduler_task_auto_disabled_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn record_tick(&self, duration_seconds: f64, dispatched: usize) {
        self.ticks_total.increment(1);
        self.tick_duration.record(duration_seconds);
        counter!("scheduler_dispatched_total").increment(dispatched as u64);
    }

    pub fn record_store_failure(&self) {
        self.store_failures_total.increment(1);
    }

    pub fn record_unknown_kind(&self, kind: &str) {
        counter!("scheduler_unknown_kind_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn set_in_flight(&self, count: usize) {
        self.in_flight_runs.set(count as f64);
    }
}
