pub mod health;
pub mod metrics;
pub mod scheduler;
pub mod tasks;
