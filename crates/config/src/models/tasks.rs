use serde::{Deserialize, Serialize};

use crate::validation::ConfigValidator;
use scheduler_domain::NewTaskDescriptor;

fn default_true() -> bool {
    true
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({})
}

/// 配置文件中的 `[[tasks]]` 种子条目
///
/// 启动时按名称写入任务存储，已存在的任务不会被覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSeedConfig {
    pub name: String,
    pub kind: String,
    pub interval_seconds: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub stop_on_error: bool,
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
}

impl TaskSeedConfig {
    pub fn to_new_task(&self) -> NewTaskDescriptor {
        NewTaskDescriptor {
            name: self.name.clone(),
            kind: self.kind.clone(),
            interval_seconds: self.interval_seconds,
            enabled: self.enabled,
            stop_on_error: self.stop_on_error,
            timeout_seconds: self.timeout_seconds,
            parameters: self.parameters.clone(),
        }
    }
}

impl ConfigValidator for TaskSeedConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.to_new_task()
            .validate()
            .map_err(|e| crate::ConfigError::Validation(format!("tasks: {e}")))
    }
}

/// 种子任务名称必须唯一
pub fn validate_task_seeds(tasks: &[TaskSeedConfig]) -> crate::ConfigResult<()> {
    let mut seen = std::collections::HashSet::new();
    for task in tasks {
        task.validate()?;
        if !seen.insert(task.name.as_str()) {
            return Err(crate::ConfigError::Validation(format!(
                "tasks: duplicate task name {}",
                task.name
            )));
        }
    }
    Ok(())
}
