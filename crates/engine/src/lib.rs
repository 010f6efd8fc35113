//! `engine` crate: graph model, validation, scheduling and the run
//! coordinator that drives one execution to a terminal state.

pub mod coordinator;
pub mod error;
pub mod models;
pub mod processor;
pub mod scheduler;
pub mod signal;
pub mod validator;

pub use coordinator::{CoordinatorConfig, RunCoordinator};
pub use error::EngineError;
pub use models::{Edge, NodeDefinition, Workflow};
pub use processor::NodeProcessor;
pub use scheduler::{Plan, RunSummary, Scheduler};
pub use signal::RunSignal;
pub use validator::validate_graph;
