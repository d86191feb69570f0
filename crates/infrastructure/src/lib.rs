pub mod database;
pub mod memory_store;
pub mod observability;

pub use database::*;
pub use memory_store::InMemoryTaskStore;
pub use observability::*;
