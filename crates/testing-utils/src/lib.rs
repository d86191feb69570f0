//! # Scheduler Testing Utils
//!
//! 各crate共用的测试工具：可控时钟、记录事件的接收方、可模拟故障的存储、
//! 行为可编排的任务，以及测试数据构造器。
//!
//! ```toml
//! [dev-dependencies]
//! scheduler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
