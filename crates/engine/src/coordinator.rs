//! Run coordinator.
//!
//! `RunCoordinator` owns the lifecycle of one execution record:
//! 1. Moves it to `RUNNING` (and gives up if that write fails).
//! 2. Validates the graph.
//! 3. Drives the scheduler, dispatching every node through a `NodeProcessor`.
//! 4. Writes exactly one terminal status.
//!
//! Panics after the `RUNNING` write are caught and end the run in `FAILED`,
//! so an execution never stays `RUNNING`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use nodes::{AgentFactory, ExecutionContext};
use store::{ExecutionStatus, ExecutionStore, LogLevel};

use crate::processor::NodeProcessor;
use crate::{EngineError, RunSignal, RunSummary, Scheduler, Workflow, validate_graph};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default wall-clock budget of a single run.
pub const DEFAULT_EXECUTION_BUDGET: Duration = Duration::from_secs(30 * 60);

/// Tuning knobs for the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Upper bound on a run's wall-clock time.  Exceeding it ends the run
    /// the same way a manual cancellation does.
    #[serde(with = "duration_secs")]
    pub execution_budget: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            execution_budget: DEFAULT_EXECUTION_BUDGET,
        }
    }
}

/// `Duration` as whole seconds in config files.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// RunCoordinator
// ---------------------------------------------------------------------------

/// Runs executions.  One instance is shared by every worker.
pub struct RunCoordinator {
    executions: Arc<dyn ExecutionStore>,
    agents: Arc<dyn AgentFactory>,
    config: CoordinatorConfig,
}

impl RunCoordinator {
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        agents: Arc<dyn AgentFactory>,
        config: CoordinatorConfig,
    ) -> Self {
        Self { executions, agents, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run a `PENDING` execution of `workflow` to its terminal state.
    ///
    /// Returns the terminal status that was written.  Everything that goes
    /// wrong during the run is recorded in the execution's log trail rather
    /// than returned.
    ///
    /// # Errors
    /// [`EngineError::Store`] only when the `RUNNING` transition itself
    /// fails; the run is then abandoned untouched.
    #[instrument(skip(self, workflow, cancel), fields(workflow_id = %workflow.id))]
    pub async fn run(
        &self,
        execution_id: Uuid,
        workflow: &Workflow,
        cancel: CancellationToken,
    ) -> Result<ExecutionStatus, EngineError> {
        if let Err(e) = self
            .executions
            .update_status(execution_id, ExecutionStatus::Running, None)
            .await
        {
            error!(error = %e, "failed to mark execution RUNNING; abandoning run");
            return Err(e.into());
        }

        let ctx = ExecutionContext {
            workflow_id: workflow.id,
            execution_id,
            store: self.executions.clone(),
            agents: self.agents.clone(),
        };
        let signal = RunSignal::new(cancel, self.config.execution_budget);

        let outcome = AssertUnwindSafe(Self::drive(workflow, &ctx, &signal))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(EngineError::Fault(panic_message(payload.as_ref()))));

        // Recording the outcome is guarded too; a fault there still ends
        // the run in FAILED.
        match AssertUnwindSafe(self.settle(&ctx, outcome)).catch_unwind().await {
            Ok(status) => Ok(status),
            Err(payload) => {
                error!(panic = %panic_message(payload.as_ref()), "fault while recording outcome");
                self.force_failed(execution_id).await;
                Ok(ExecutionStatus::Failed)
            }
        }
    }

    /// Log a failure if there is one, then write the terminal status.
    async fn settle(
        &self,
        ctx: &ExecutionContext,
        outcome: Result<RunSummary, EngineError>,
    ) -> ExecutionStatus {
        let (status, output) = match outcome {
            Ok(summary) => {
                info!(nodes = summary.processed(), "execution completed");
                (ExecutionStatus::Completed, Some(summary.output_json()))
            }
            Err(e) => {
                Self::record_failure(ctx, &e).await;
                (ExecutionStatus::Failed, None)
            }
        };

        if let Err(e) = self.executions.update_status(ctx.execution_id, status, output).await {
            warn!(error = %e, %status, "failed to write final execution status");
        }
        status
    }

    /// Last-resort `FAILED` write after a fault in `settle`.
    async fn force_failed(&self, execution_id: Uuid) {
        let write = self
            .executions
            .update_status(execution_id, ExecutionStatus::Failed, None);
        match AssertUnwindSafe(write).catch_unwind().await {
            Ok(Ok(())) => {}
            // Already terminal when the fault hit after the final write.
            Ok(Err(e)) => warn!(error = %e, "could not force execution to FAILED"),
            Err(payload) => {
                error!(panic = %panic_message(payload.as_ref()), "could not force execution to FAILED");
            }
        }
    }

    async fn drive(
        workflow: &Workflow,
        ctx: &ExecutionContext,
        signal: &RunSignal,
    ) -> Result<RunSummary, EngineError> {
        validate_graph(workflow)?;
        info!(nodes = workflow.nodes.len(), edges = workflow.edges.len(), "graph validated");

        let processor = NodeProcessor::new(ctx.clone());
        let processor = &processor;
        Scheduler::new(workflow)
            .run(signal, move |node, inputs| processor.process(node, inputs))
            .await
    }

    /// Log the cause of a failed run, tied to the node when there is one.
    async fn record_failure(ctx: &ExecutionContext, err: &EngineError) {
        error!(category = err.category(), error = %err, "execution failed");

        let (node_id, message) = match err {
            EngineError::NodeExecution { node_id, source } => {
                (Some(node_id.as_str()), format!("Node execution failed: {source}"))
            }
            e if e.is_validation() => (None, format!("Graph validation failed: {e}")),
            e @ (EngineError::Cancelled | EngineError::TimedOut(_)) => {
                (None, format!("Execution aborted: {e}"))
            }
            EngineError::Fault(msg) => (None, format!("Execution panicked: {msg}")),
            e => (None, e.to_string()),
        };
        ctx.log(node_id, LogLevel::Error, &message).await;
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn budget_reads_as_seconds() {
        let config: CoordinatorConfig = serde_json::from_str(r#"{ "execution_budget": 90 }"#).unwrap();
        assert_eq!(config.execution_budget, Duration::from_secs(90));
        let config: CoordinatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.execution_budget, DEFAULT_EXECUTION_BUDGET);
    }
}
