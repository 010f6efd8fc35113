//! Row structs for workflows, executions and execution logs.
//!
//! These are *persistence* models.  Domain types (the graph itself) live in
//! the `engine` crate; a workflow row only carries the JSON `definition`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON graph definition (nodes and edges).
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// executions
// ---------------------------------------------------------------------------

/// Possible statuses for a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// `true` for the absorbing states.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal edge of the lifecycle
    /// `PENDING -> RUNNING -> {COMPLETED | FAILED | CANCELLED}`.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        match self {
            Self::Pending => next == Self::Running,
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending   => write!(f, "PENDING"),
            Self::Running   => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed    => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING"   => Ok(Self::Pending),
            "RUNNING"   => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED"    => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other       => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// A persisted workflow execution row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub output: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock seconds between `started_at` and `finished_at`.
    pub duration_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// execution_logs
// ---------------------------------------------------------------------------

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info  => write!(f, "INFO"),
            Self::Warn  => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// An append-only log entry tied to an execution and optionally a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    /// `None` for system-level entries.
    pub node_id: Option<String>,
    pub level: LogLevel,
    pub message: String,
    /// Insertion order within the store; breaks timestamp ties.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}
