//! Bounded worker pool.
//!
//! A fixed number of worker tasks share one bounded `mpsc` receiver.  Each
//! worker pulls a job, hands it to the shared [`RunCoordinator`] and reports
//! the terminal status back through the job's ticket.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use engine::{RunCoordinator, Workflow};
use store::{ExecutionStore, WorkflowStore};

use crate::job::{Job, Ticket};
use crate::QueueError;

/// Tuning knobs for the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of executions that may run at the same time.
    pub workers: usize,
    /// Jobs that may wait for a worker before `trigger` pushes back.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
        }
    }
}

/// Execution id → token of every job not yet finished.
type CancelRegistry = Arc<Mutex<HashMap<Uuid, CancellationToken>>>;

pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    executions: Arc<dyn ExecutionStore>,
    workflows: Arc<dyn WorkflowStore>,
    registry: CancelRegistry,
    capacity: usize,
}

impl WorkerPool {
    /// Spawn the workers.  Must be called inside a Tokio runtime.
    pub fn new(
        config: PoolConfig,
        coordinator: Arc<RunCoordinator>,
        executions: Arc<dyn ExecutionStore>,
        workflows: Arc<dyn WorkflowStore>,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let registry: CancelRegistry = Arc::default();

        let workers = (0..config.workers.max(1))
            .map(|index| {
                tokio::spawn(worker_loop(
                    index,
                    rx.clone(),
                    coordinator.clone(),
                    registry.clone(),
                ))
            })
            .collect();

        info!(workers = config.workers.max(1), capacity, "worker pool started");
        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            executions,
            workflows,
            registry,
            capacity,
        }
    }

    /// Start an execution of a stored workflow in the background.
    ///
    /// A queue slot is reserved before the `PENDING` record is created, so
    /// a full queue leaves nothing behind.
    ///
    /// # Errors
    /// - [`QueueError::Backpressure`] when every slot is taken.
    /// - [`QueueError::Closed`] after [`WorkerPool::shutdown`].
    /// - [`QueueError::Store`] / [`QueueError::Engine`] if the workflow
    ///   cannot be loaded or the record cannot be created.
    pub async fn trigger(&self, workflow_id: Uuid) -> Result<Ticket, QueueError> {
        let row = self.workflows.get_workflow(workflow_id).await?;
        let workflow = Arc::new(Workflow::from_row(&row)?);

        let sender = self.sender.lock().await.clone().ok_or(QueueError::Closed)?;
        let permit = sender.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => QueueError::Backpressure {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(()) => QueueError::Closed,
        })?;

        let execution = self.executions.create_execution(workflow_id).await?;
        let cancel = CancellationToken::new();
        self.registry
            .lock()
            .await
            .insert(execution.id, cancel.clone());

        let (done_tx, done_rx) = oneshot::channel();
        permit.send(Job {
            execution_id: execution.id,
            workflow,
            cancel,
            done: done_tx,
        });

        info!(execution_id = %execution.id, %workflow_id, "execution queued");
        Ok(Ticket::new(execution, done_rx))
    }

    /// Trip the cancellation token of a queued or running execution.
    ///
    /// Returns `false` if the execution is unknown or already finished.
    pub async fn cancel(&self, execution_id: Uuid) -> bool {
        match self.registry.lock().await.get(&execution_id) {
            Some(token) => {
                info!(%execution_id, "cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of executions queued or running.
    pub async fn in_flight(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Stop accepting jobs, let the workers drain the queue, and wait for
    /// them to exit.
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(
    index: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    coordinator: Arc<RunCoordinator>,
    registry: CancelRegistry,
) {
    debug!(worker = index, "worker started");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        let run = coordinator.run(job.execution_id, &job.workflow, job.cancel.clone());
        let status = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                error!(worker = index, execution_id = %job.execution_id, error = %e, "execution abandoned");
                None
            }
            Err(_) => {
                error!(worker = index, execution_id = %job.execution_id, "execution panicked; worker continues");
                None
            }
        };

        registry.lock().await.remove(&job.execution_id);
        // The caller may have dropped its ticket.
        let _ = job.done.send(status);
    }
    debug!(worker = index, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use engine::{CoordinatorConfig, Edge, NodeDefinition};
    use nodes::mock::{MockAgentFactory, MockReply};
    use serde_json::json;
    use store::{ExecutionLogRow, ExecutionRow, ExecutionStatus, InMemoryStore, LogLevel, StoreError};

    use super::*;

    struct Fixture {
        store: Arc<InMemoryStore>,
        agents: Arc<MockAgentFactory>,
        pool: WorkerPool,
    }

    fn fixture(reply: MockReply, config: PoolConfig) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let agents = Arc::new(MockAgentFactory::new(reply));
        let coordinator = Arc::new(RunCoordinator::new(
            store.clone(),
            agents.clone(),
            CoordinatorConfig::default(),
        ));
        let pool = WorkerPool::new(config, coordinator, store.clone(), store.clone());
        Fixture { store, agents, pool }
    }

    async fn store_workflow(store: &InMemoryStore, nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Uuid {
        let wf = Workflow::new("pooled", nodes, edges);
        store.insert_workflow("pooled", wf.definition()).await.id
    }

    async fn wait_until_running(store: &InMemoryStore, execution_id: Uuid) {
        while store.get_execution(execution_id).await.unwrap().status != ExecutionStatus::Running {
            tokio::task::yield_now().await;
        }
    }

    /// Delegates to an `InMemoryStore`; panics on the `RUNNING` write while
    /// `explode` is set.
    #[derive(Default)]
    struct ExplodingStore {
        inner: InMemoryStore,
        explode: AtomicBool,
    }

    #[async_trait]
    impl ExecutionStore for ExplodingStore {
        async fn create_execution(&self, workflow_id: Uuid) -> Result<ExecutionRow, StoreError> {
            self.inner.create_execution(workflow_id).await
        }

        async fn update_status(
            &self,
            execution_id: Uuid,
            status: ExecutionStatus,
            output: Option<serde_json::Value>,
        ) -> Result<(), StoreError> {
            if status == ExecutionStatus::Running && self.explode.load(Ordering::SeqCst) {
                panic!("status write exploded");
            }
            self.inner.update_status(execution_id, status, output).await
        }

        async fn append_log(
            &self,
            execution_id: Uuid,
            node_id: Option<&str>,
            level: LogLevel,
            message: &str,
        ) -> Result<(), StoreError> {
            self.inner.append_log(execution_id, node_id, level, message).await
        }

        async fn get_execution(&self, execution_id: Uuid) -> Result<ExecutionRow, StoreError> {
            self.inner.get_execution(execution_id).await
        }

        async fn list_executions(&self, workflow_id: Uuid) -> Result<Vec<ExecutionRow>, StoreError> {
            self.inner.list_executions(workflow_id).await
        }

        async fn list_logs(&self, execution_id: Uuid) -> Result<Vec<ExecutionLogRow>, StoreError> {
            self.inner.list_logs(execution_id).await
        }
    }

    fn slow_llm() -> MockReply {
        MockReply::Slow(Duration::from_secs(10), Box::new(MockReply::Echo))
    }

    #[tokio::test]
    async fn trigger_runs_in_background() {
        let f = fixture(MockReply::Echo, PoolConfig::default());
        let wf = store_workflow(
            &f.store,
            vec![NodeDefinition::new("s", "start"), NodeDefinition::new("d", "debug")],
            vec![Edge::new("s", "d")],
        )
        .await;

        let ticket = f.pool.trigger(wf).await.unwrap();
        assert_eq!(ticket.execution.status, ExecutionStatus::Pending);
        let id = ticket.execution_id();

        assert_eq!(ticket.wait().await, Some(ExecutionStatus::Completed));
        let exec = f.store.get_execution(id).await.unwrap();
        assert_eq!(exec.output.unwrap()["d"], r#"Debug Echo: {"s":"Workflow Started"}"#);
        assert_eq!(f.pool.in_flight().await, 0);
    }

    #[tokio::test]
    async fn unknown_workflow_creates_nothing() {
        let f = fixture(MockReply::Echo, PoolConfig::default());
        let err = f.pool.trigger(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, QueueError::Store(_)));
    }

    #[tokio::test]
    async fn malformed_definition_is_rejected_up_front() {
        let f = fixture(MockReply::Echo, PoolConfig::default());
        let row = f.store.insert_workflow("bad", json!({ "edges": 3 })).await;
        let err = f.pool.trigger(row.id).await.unwrap_err();
        assert!(matches!(err, QueueError::Engine(_)));
        assert!(f.store.list_executions(row.id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_pushes_back_without_a_record() {
        let f = fixture(slow_llm(), PoolConfig { workers: 1, queue_capacity: 1 });
        let wf = store_workflow(&f.store, vec![NodeDefinition::new("ask", "llm")], vec![]).await;

        let running = f.pool.trigger(wf).await.unwrap();
        wait_until_running(&f.store, running.execution_id()).await;
        let _queued = f.pool.trigger(wf).await.unwrap();

        let err = f.pool.trigger(wf).await.unwrap_err();
        assert!(matches!(err, QueueError::Backpressure { capacity: 1 }));
        assert_eq!(f.store.list_executions(wf).await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_fails_a_running_execution() {
        let f = fixture(slow_llm(), PoolConfig::default());
        let wf = store_workflow(
            &f.store,
            vec![NodeDefinition::new("first", "llm"), NodeDefinition::new("second", "llm")],
            vec![Edge::new("first", "second")],
        )
        .await;

        let ticket = f.pool.trigger(wf).await.unwrap();
        let id = ticket.execution_id();
        wait_until_running(&f.store, id).await;

        assert!(f.pool.cancel(id).await);
        assert_eq!(ticket.wait().await, Some(ExecutionStatus::Failed));
        assert_eq!(f.agents.calls_for(id).len(), 1);

        let logs = f.store.list_logs(id).await.unwrap();
        assert!(logs
            .iter()
            .any(|l| l.message == "Execution aborted: execution cancelled"));
        assert!(!f.pool.cancel(id).await);
    }

    #[tokio::test]
    async fn cancel_of_unknown_execution_is_false() {
        let f = fixture(MockReply::Echo, PoolConfig::default());
        assert!(!f.pool.cancel(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn parallel_executions_stay_isolated() {
        let f = fixture(MockReply::Echo, PoolConfig { workers: 2, queue_capacity: 8 });
        let a = store_workflow(
            &f.store,
            vec![NodeDefinition::new("a_root", "start"), NodeDefinition::new("ask", "llm")],
            vec![Edge::new("a_root", "ask")],
        )
        .await;
        let b = store_workflow(
            &f.store,
            vec![NodeDefinition::new("b_root", "debug"), NodeDefinition::new("ask", "llm")],
            vec![Edge::new("b_root", "ask")],
        )
        .await;

        let ta = f.pool.trigger(a).await.unwrap();
        let tb = f.pool.trigger(b).await.unwrap();
        let (ia, ib) = (ta.execution_id(), tb.execution_id());
        let (sa, sb) = tokio::join!(ta.wait(), tb.wait());
        assert_eq!(sa, Some(ExecutionStatus::Completed));
        assert_eq!(sb, Some(ExecutionStatus::Completed));

        let out_a = f.store.get_execution(ia).await.unwrap().output.unwrap();
        let out_b = f.store.get_execution(ib).await.unwrap().output.unwrap();
        assert!(out_a.get("b_root").is_none());
        assert!(out_b.get("a_root").is_none());
        assert!(f.agents.calls_for(ia)[0].prompt.contains("- a_root: Workflow Started"));
        assert!(f.agents.calls_for(ib)[0].prompt.contains("- b_root: Debug Echo: {}"));
    }

    #[tokio::test]
    async fn shutdown_drains_then_refuses() {
        let f = fixture(MockReply::Echo, PoolConfig { workers: 1, queue_capacity: 4 });
        let wf = store_workflow(&f.store, vec![NodeDefinition::new("s", "start")], vec![]).await;

        let first = f.pool.trigger(wf).await.unwrap();
        let second = f.pool.trigger(wf).await.unwrap();
        f.pool.shutdown().await;

        assert_eq!(first.wait().await, Some(ExecutionStatus::Completed));
        assert_eq!(second.wait().await, Some(ExecutionStatus::Completed));
        assert!(matches!(f.pool.trigger(wf).await, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn worker_survives_a_panicking_run() {
        let executions = Arc::new(ExplodingStore::default());
        let workflows = Arc::new(InMemoryStore::new());
        let coordinator = Arc::new(RunCoordinator::new(
            executions.clone(),
            Arc::new(MockAgentFactory::new(MockReply::Echo)),
            CoordinatorConfig::default(),
        ));
        let pool = WorkerPool::new(
            PoolConfig { workers: 1, queue_capacity: 4 },
            coordinator,
            executions.clone(),
            workflows.clone(),
        );
        let wf = store_workflow(&workflows, vec![NodeDefinition::new("s", "start")], vec![]).await;

        executions.explode.store(true, Ordering::SeqCst);
        let doomed = pool.trigger(wf).await.unwrap();
        let doomed_id = doomed.execution_id();
        assert_eq!(doomed.wait().await, None);
        assert_eq!(pool.in_flight().await, 0);
        assert!(!pool.cancel(doomed_id).await);

        executions.explode.store(false, Ordering::SeqCst);
        let next = pool.trigger(wf).await.unwrap();
        assert_eq!(next.wait().await, Some(ExecutionStatus::Completed));
    }
}
