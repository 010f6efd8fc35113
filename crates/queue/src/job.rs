//! Queued job and the ticket handed back to the caller.

use std::sync::Arc;

use engine::Workflow;
use store::{ExecutionRow, ExecutionStatus};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One execution waiting for (or held by) a worker.
pub(crate) struct Job {
    pub execution_id: Uuid,
    pub workflow: Arc<Workflow>,
    pub cancel: CancellationToken,
    pub done: oneshot::Sender<Option<ExecutionStatus>>,
}

/// Acknowledgement of a triggered execution.
///
/// The execution is already persisted as `PENDING` when a ticket exists.
/// Dropping the ticket does not affect the run.
#[derive(Debug)]
pub struct Ticket {
    pub execution: ExecutionRow,
    done: oneshot::Receiver<Option<ExecutionStatus>>,
}

impl Ticket {
    pub(crate) fn new(execution: ExecutionRow, done: oneshot::Receiver<Option<ExecutionStatus>>) -> Self {
        Self { execution, done }
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution.id
    }

    /// Wait for the run to end.
    ///
    /// `None` if the run was abandoned before reaching a terminal state
    /// (the `RUNNING` write failed) or the pool went away.
    pub async fn wait(self) -> Option<ExecutionStatus> {
        self.done.await.ok().flatten()
    }
}
