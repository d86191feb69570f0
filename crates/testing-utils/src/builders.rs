//! Test data builders

use chrono::{DateTime, Utc};
use scheduler_domain::{NewTaskDescriptor, TaskDescriptor};

use crate::helpers::TestEnv;

/// Builder for seed definitions
pub struct NewTaskBuilder {
    task: NewTaskDescriptor,
}

impl NewTaskBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            task: NewTaskDescriptor::new(name, "scripted", 60),
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.task.kind = kind.to_string();
        self
    }

    pub fn with_interval(mut self, interval_seconds: i64) -> Self {
        self.task.interval_seconds = interval_seconds;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.task.enabled = false;
        self
    }

    pub fn stop_on_error(mut self) -> Self {
        self.task.stop_on_error = true;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: i64) -> Self {
        self.task.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.task.parameters = parameters;
        self
    }

    pub fn build(self) -> NewTaskDescriptor {
        self.task
    }
}

/// Builder for stored descriptors with explicit bookkeeping
pub struct TaskDescriptorBuilder {
    task: TaskDescriptor,
}

impl Default for TaskDescriptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskDescriptorBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskDescriptor {
                id: 1,
                name: "test_task".to_string(),
                kind: "scripted".to_string(),
                interval_seconds: 60,
                enabled: true,
                stop_on_error: false,
                timeout_seconds: None,
                parameters: serde_json::json!({}),
                last_enabled_utc: Some(TestEnv::epoch()),
                last_start_utc: None,
                last_end_utc: None,
                last_success_utc: None,
                running: false,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.task.kind = kind.to_string();
        self
    }

    pub fn with_interval(mut self, interval_seconds: i64) -> Self {
        self.task.interval_seconds = interval_seconds;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.task.enabled = false;
        self
    }

    pub fn stop_on_error(mut self) -> Self {
        self.task.stop_on_error = true;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: i64) -> Self {
        self.task.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.task.parameters = parameters;
        self
    }

    pub fn last_enabled_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.task.last_enabled_utc = at;
        self
    }

    pub fn last_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.last_start_utc = Some(at);
        self
    }

    pub fn last_succeeded_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.last_end_utc = Some(at);
        self.task.last_success_utc = Some(at);
        self
    }

    /// 没有任何基准时间，首次评估即到期
    pub fn never_run(mut self) -> Self {
        self.task.last_enabled_utc = None;
        self.task.last_start_utc = None;
        self
    }

    pub fn build(self) -> TaskDescriptor {
        self.task
    }
}
