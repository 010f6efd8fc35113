//! `workflow-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` validates a workflow JSON file.
//! - `plan` prints the order a run would process the nodes in.
//! - `run` executes a workflow in-process and prints its log trail.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine::models::GraphDefinition;
use engine::{RunCoordinator, Scheduler, Workflow, validate_graph};
use nodes::gemini::GeminiAgentFactory;
use nodes::mock::{MockAgentFactory, MockReply};
use nodes::{AgentFactory, DisabledAgentFactory};
use queue::WorkerPool;
use store::{ExecutionStatus, ExecutionStore, InMemoryStore};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "workflow-engine", about = "DAG workflow execution engine", version)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, short, global = true, env = "WORKFLOW_ENGINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Print the processing order of a workflow.
    Plan {
        path: PathBuf,
    },
    /// Run a workflow to completion.
    Run {
        path: PathBuf,
        /// Answer `llm` nodes with their own prompt instead of calling Gemini.
        #[arg(long)]
        echo: bool,
        /// Override the execution budget, in seconds.
        #[arg(long)]
        budget_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Command::Validate { path } => {
            let workflow = load_workflow(&path)?;
            validate_graph(&workflow).context("validation failed")?;
            let plan = Scheduler::new(&workflow).plan();
            if !plan.is_complete() {
                bail!("validation failed: cycle through {:?}", plan.blocked);
            }
            println!("Workflow is valid. Execution order: {:?}", plan.order);
        }
        Command::Plan { path } => {
            let workflow = load_workflow(&path)?;
            validate_graph(&workflow)?;
            let plan = Scheduler::new(&workflow).plan();
            for (step, node_id) in plan.order.iter().enumerate() {
                let node_type = workflow.node(node_id).map_or("?", |n| n.node_type.as_str());
                println!("{:>3}. {node_id} ({node_type})", step + 1);
            }
            if !plan.is_complete() {
                bail!("unschedulable nodes: {:?}", plan.blocked);
            }
        }
        Command::Run { path, echo, budget_secs } => {
            if let Some(secs) = budget_secs {
                config.engine.execution_budget = std::time::Duration::from_secs(secs);
            }
            let workflow = load_workflow(&path)?;
            run(workflow, &config, echo).await?;
        }
    }

    Ok(())
}

/// Read a `{ "nodes": [...], "edges": [...] }` document.
fn load_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let graph: GraphDefinition =
        serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workflow".to_owned());
    Ok(Workflow::new(name, graph.nodes, graph.edges))
}

fn agent_factory(config: &AppConfig, echo: bool) -> Arc<dyn AgentFactory> {
    if echo {
        return Arc::new(MockAgentFactory::new(MockReply::Echo));
    }
    if config.gemini.api_key.is_empty() {
        warn!("GEMINI_API_KEY is not set; llm nodes will fail");
        return Arc::new(DisabledAgentFactory);
    }
    Arc::new(GeminiAgentFactory::new(config.gemini.clone()))
}

async fn run(workflow: Workflow, config: &AppConfig, echo: bool) -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let row = store.insert_workflow(&workflow.name, workflow.definition()).await;

    let coordinator = Arc::new(RunCoordinator::new(
        store.clone(),
        agent_factory(config, echo),
        config.engine.clone(),
    ));
    let pool = WorkerPool::new(config.pool.clone(), coordinator, store.clone(), store.clone());

    let ticket = pool.trigger(row.id).await?;
    let execution_id = ticket.execution_id();
    info!(%execution_id, "execution started");

    let wait = ticket.wait();
    tokio::pin!(wait);
    let status = tokio::select! {
        status = &mut wait => status,
        _ = tokio::signal::ctrl_c() => {
            warn!(%execution_id, "interrupted; cancelling");
            pool.cancel(execution_id).await;
            (&mut wait).await
        }
    };
    pool.shutdown().await;

    for entry in store.list_logs(execution_id).await? {
        println!(
            "[{}] {} {}: {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.level,
            entry.node_id.as_deref().unwrap_or("SYSTEM"),
            entry.message
        );
    }

    let execution = store.get_execution(execution_id).await?;
    if let Some(secs) = execution.duration_secs {
        println!("Finished in {secs:.3}s");
    }
    if let Some(output) = &execution.output {
        println!("{}", serde_json::to_string_pretty(output)?);
    }

    match status {
        Some(ExecutionStatus::Completed) => {
            println!("Status: {}", ExecutionStatus::Completed);
            Ok(())
        }
        Some(other) => bail!("execution {execution_id} ended {other}"),
        None => bail!("execution {execution_id} was abandoned"),
    }
}
