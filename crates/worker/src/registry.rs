use std::collections::HashMap;
use std::sync::Arc;

use scheduler_errors::{SchedulerError, SchedulerResult};
use tracing::info;

use crate::task::ScheduledTask;

/// 任务类型的构造函数
pub type TaskFactory = Arc<dyn Fn() -> Arc<dyn ScheduledTask> + Send + Sync>;

/// 任务类型注册表
///
/// 启动时由 `(kind, factory)` 清单一次性构建，之后只读。
/// 未知类型的查找返回 None，由调用方决定如何处理。
pub struct TaskRegistry {
    units: HashMap<String, Arc<dyn ScheduledTask>>,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    pub fn from_manifest(
        manifest: impl IntoIterator<Item = (String, TaskFactory)>,
    ) -> SchedulerResult<Self> {
        manifest
            .into_iter()
            .fold(Self::builder(), |builder, (kind, factory)| {
                builder.register_factory(kind, factory)
            })
            .build()
    }

    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn ScheduledTask>> {
        self.units.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.units.contains_key(kind)
    }

    /// 已注册的类型，按名称排序
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.units.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[derive(Default)]
pub struct TaskRegistryBuilder {
    entries: Vec<(String, TaskFactory)>,
}

impl TaskRegistryBuilder {
    pub fn register<F, T>(self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: ScheduledTask + 'static,
    {
        self.register_factory(
            kind,
            Arc::new(move || Arc::new(factory()) as Arc<dyn ScheduledTask>),
        )
    }

    pub fn register_factory(mut self, kind: impl Into<String>, factory: TaskFactory) -> Self {
        self.entries.push((kind.into(), factory));
        self
    }

    /// 构建注册表，重复或空的类型名是配置错误
    pub fn build(self) -> SchedulerResult<TaskRegistry> {
        let mut units = HashMap::with_capacity(self.entries.len());
        for (kind, factory) in self.entries {
            if kind.trim().is_empty() {
                return Err(SchedulerError::config_error("任务类型名称不能为空"));
            }
            if units.contains_key(&kind) {
                return Err(SchedulerError::DuplicateKind(kind));
            }
            units.insert(kind, factory());
        }

        let registry = TaskRegistry { units };
        info!("任务注册表构建完成，类型: {:?}", registry.kinds());
        Ok(registry)
    }
}
