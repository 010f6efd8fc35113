//! Repository ports: one trait per aggregate.
//!
//! Every method returns a `Result<T, StoreError>`.  Implementations must be
//! safe for concurrent use; many executions write through the same store.

pub mod executions;
pub mod workflows;

pub use executions::ExecutionStore;
pub use workflows::WorkflowStore;
