//! Read-only workflow retrieval.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{StoreError, models::WorkflowRow};

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Fetch a single workflow snapshot by its primary key.
    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowRow, StoreError>;

    /// Return all workflows ordered by creation time (newest first).
    async fn list_workflows(&self) -> Result<Vec<WorkflowRow>, StoreError>;
}
