//! 调度协调器与生命周期管理

pub mod coordinator;
pub mod lifecycle;
pub mod settings;

pub use coordinator::{DrainReport, Scheduler, SchedulerState, TickReport};
pub use lifecycle::LifecycleManager;
pub use settings::SchedulerSettings;
