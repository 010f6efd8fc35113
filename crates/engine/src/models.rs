//! Core domain models for the workflow graph.
//!
//! These types are the source of truth for what a workflow looks like
//! in memory.  The `nodes`/`edges` part is stored as the JSON `definition`
//! of a [`store::WorkflowRow`]; field aliases accept the graph editor's
//! spelling (`type`, `data`, `sourceHandle`, `targetHandle`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::WorkflowRow;
use uuid::Uuid;

use crate::EngineError;

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    /// Type tag, resolved to a `nodes::NodeKind` at execution time.
    #[serde(alias = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Opaque configuration passed to the node at execution time.
    #[serde(default, alias = "data")]
    pub config: serde_json::Value,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            label: None,
            config: serde_json::Value::Null,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, alias = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, alias = "targetHandle", skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Edge without handles; its id is `"<source>-><target>"`.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{source}->{target}"),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// The stored `definition` document: just the graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A complete workflow snapshot.  Never mutated during an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(name: impl Into<String>, nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            nodes,
            edges,
            created_at: Utc::now(),
        }
    }

    /// Rebuild the snapshot from a persisted row.
    ///
    /// # Errors
    /// [`EngineError::InvalidDefinition`] if the definition is not a graph.
    pub fn from_row(row: &WorkflowRow) -> Result<Self, EngineError> {
        let graph: GraphDefinition = serde_json::from_value(row.definition.clone())?;
        Ok(Self {
            id: row.id,
            name: row.name.clone(),
            nodes: graph.nodes,
            edges: graph.edges,
            created_at: row.created_at,
        })
    }

    /// The JSON document stored in a workflow row.
    pub fn definition(&self) -> serde_json::Value {
        serde_json::json!({
            "nodes": self.nodes,
            "edges": self.edges,
        })
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
