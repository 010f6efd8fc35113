//! In-memory implementation of both repository ports.
//!
//! Backs the CLI's local `run` command and every engine test.  All state sits
//! behind one `tokio::sync::RwLock`, so the store can be shared as
//! `Arc<InMemoryStore>` between concurrently running executions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{
    ExecutionStore, StoreError, WorkflowStore,
    models::{ExecutionLogRow, ExecutionRow, ExecutionStatus, LogLevel, WorkflowRow},
};

#[derive(Default)]
struct Inner {
    workflows: HashMap<Uuid, WorkflowRow>,
    executions: HashMap<Uuid, ExecutionRow>,
    logs: HashMap<Uuid, Vec<ExecutionLogRow>>,
    next_sequence: u64,
}

/// Process-local store.  Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a workflow definition and return the stored row.
    pub async fn insert_workflow(
        &self,
        name: impl Into<String>,
        definition: serde_json::Value,
    ) -> WorkflowRow {
        let row = WorkflowRow {
            id: Uuid::new_v4(),
            name: name.into(),
            definition,
            created_at: Utc::now(),
        };
        self.inner.write().await.workflows.insert(row.id, row.clone());
        row
    }

    /// Make every write fail with [`StoreError::Unavailable`] while `true`.
    ///
    /// Reads keep working so tests can inspect what was recorded.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn create_execution(&self, workflow_id: Uuid) -> Result<ExecutionRow, StoreError> {
        self.ensure_online()?;
        let row = ExecutionRow {
            id: Uuid::new_v4(),
            workflow_id,
            status: ExecutionStatus::Pending,
            output: None,
            started_at: None,
            finished_at: None,
            duration_secs: None,
            created_at: Utc::now(),
        };
        self.inner.write().await.executions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_status(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        output: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut inner = self.inner.write().await;
        let row = inner
            .executions
            .get_mut(&execution_id)
            .ok_or(StoreError::NotFound(execution_id))?;

        if !row.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition { from: row.status, to: status });
        }

        let now = Utc::now();
        if status == ExecutionStatus::Running {
            row.started_at = Some(now);
        }
        if status.is_terminal() {
            row.finished_at = Some(now);
            row.duration_secs = row
                .started_at
                .map(|started| (now - started).num_milliseconds() as f64 / 1000.0);
        }
        if output.is_some() {
            row.output = output;
        }
        debug!(%execution_id, from = %row.status, to = %status, "execution status updated");
        row.status = status;
        Ok(())
    }

    async fn append_log(
        &self,
        execution_id: Uuid,
        node_id: Option<&str>,
        level: LogLevel,
        message: &str,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut inner = self.inner.write().await;
        if !inner.executions.contains_key(&execution_id) {
            return Err(StoreError::NotFound(execution_id));
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.logs.entry(execution_id).or_default().push(ExecutionLogRow {
            id: Uuid::new_v4(),
            execution_id,
            node_id: node_id.map(str::to_owned),
            level,
            message: message.to_owned(),
            sequence,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn get_execution(&self, execution_id: Uuid) -> Result<ExecutionRow, StoreError> {
        self.inner
            .read()
            .await
            .executions
            .get(&execution_id)
            .cloned()
            .ok_or(StoreError::NotFound(execution_id))
    }

    async fn list_executions(&self, workflow_id: Uuid) -> Result<Vec<ExecutionRow>, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<ExecutionRow> = inner
            .executions
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_logs(&self, execution_id: Uuid) -> Result<Vec<ExecutionLogRow>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.executions.contains_key(&execution_id) {
            return Err(StoreError::NotFound(execution_id));
        }
        Ok(inner.logs.get(&execution_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowRow, StoreError> {
        self.inner
            .read()
            .await
            .workflows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowRow>, StoreError> {
        let mut rows: Vec<WorkflowRow> =
            self.inner.read().await.workflows.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}
