//! Execution and execution-log repository.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    StoreError,
    models::{ExecutionLogRow, ExecutionRow, ExecutionStatus, LogLevel},
};

/// Status and log persistence for executions.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create a new execution record in `PENDING` status.
    async fn create_execution(&self, workflow_id: Uuid) -> Result<ExecutionRow, StoreError>;

    /// Move an execution to `status`, optionally attaching an output payload.
    ///
    /// Implementations stamp `started_at` on `RUNNING` and `finished_at`
    /// on terminal states, and reject transitions the lifecycle forbids.
    async fn update_status(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        output: Option<serde_json::Value>,
    ) -> Result<(), StoreError>;

    /// Append one log entry.  Entries are never mutated afterwards.
    async fn append_log(
        &self,
        execution_id: Uuid,
        node_id: Option<&str>,
        level: LogLevel,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Fetch a single execution by id.
    async fn get_execution(&self, execution_id: Uuid) -> Result<ExecutionRow, StoreError>;

    /// All executions of a workflow, newest first.
    async fn list_executions(&self, workflow_id: Uuid) -> Result<Vec<ExecutionRow>, StoreError>;

    /// The log trail of an execution in creation order.
    async fn list_logs(&self, execution_id: Uuid) -> Result<Vec<ExecutionLogRow>, StoreError>;
}
