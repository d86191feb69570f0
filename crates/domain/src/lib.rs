//! 周期任务调度的领域模型
//!
//! 包含任务描述（[`TaskDescriptor`]）、到期判断（[`schedule::is_due`]）、
//! 运行标记（[`RunningFlags`]）、任务存储抽象（[`TaskDescriptorStore`]）
//! 以及运行事件（[`RunEvent`]）。这里不包含任何执行或持久化细节。

pub mod claims;
pub mod clock;
pub mod entities;
pub mod events;
pub mod repositories;
pub mod schedule;

pub use claims::RunningFlags;
pub use clock::{Clock, SystemClock};
pub use entities::*;
pub use events::*;
pub use repositories::TaskDescriptorStore;
pub use schedule::{due_baseline, is_due, next_due_at};
pub use scheduler_errors::{SchedulerError, SchedulerResult};
