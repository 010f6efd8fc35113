//! `store` crate: persistence ports for the execution engine.
//!
//! Provides typed row structs, the [`ExecutionStore`] and [`WorkflowStore`]
//! traits the engine writes through, and an in-memory implementation of
//! both.  No business logic lives here beyond the status transition table.

pub mod error;
pub mod memory;
pub mod models;
pub mod repository;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use models::{ExecutionLogRow, ExecutionRow, ExecutionStatus, LogLevel, WorkflowRow};
pub use repository::{ExecutionStore, WorkflowStore};
