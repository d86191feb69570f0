pub mod executors;
pub mod registry;
pub mod runner;
pub mod task;

pub use executors::{default_manifest, KeepAliveParams, KeepAliveTask, ShellTask, ShellTaskParams};
pub use registry::{TaskFactory, TaskRegistry, TaskRegistryBuilder};
pub use runner::TaskRunner;
pub use task::{task_fn, ScheduledTask, TaskContext};
