//! CLI entry point for the warden boundary engine.
//!
//! Each subcommand performs one engine operation against Neo4j and writes
//! its result as JSON to stdout.

use std::io::IsTerminal;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use warden_boundary::BoundaryEngine;
use warden_core::{AgentId, Params, RuleOptions, SubgraphId, WardenConfig, WorkspaceId};
use warden_graph::{GraphClient, GraphConfig};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Agent subgraph ownership and boundary enforcement")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: warden).
    #[arg(short, long, default_value = "warden", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Create the standard subgraphs for a workspace.
    Seed {
        #[arg(long)]
        workspace: String,
    },
    /// Bind an agent to an unbound subgraph.
    Bind {
        #[arg(long)]
        subgraph: String,
        #[arg(long)]
        agent: String,
    },
    /// Show the subgraph owned by an agent.
    Show {
        #[arg(long)]
        agent: String,
    },
    /// Run a query inside the agent's subgraph (optional JSON params on stdin).
    Exec {
        #[arg(long)]
        agent: String,
        /// Operation label recorded in the audit log.
        #[arg(long)]
        label: String,
        #[arg(long)]
        query: String,
    },
    /// List a subgraph's inference rules in priority order.
    Rules {
        #[arg(long)]
        subgraph: String,
    },
    /// Attach an inference rule to a subgraph.
    AddRule {
        #[arg(long)]
        subgraph: String,
        #[arg(long)]
        name: String,
        /// READ query; empty means always.
        #[arg(long, default_value = "")]
        condition: String,
        #[arg(long)]
        action: String,
        #[arg(long)]
        priority: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        disabled: bool,
    },
    /// Show recent access records for a subgraph.
    History {
        #[arg(long)]
        subgraph: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = WardenConfig::load(&cli.config)?;

    let graph = GraphClient::connect(&GraphConfig::from(config.neo4j.clone())).await?;

    let engine =
        BoundaryEngine::new(Arc::new(graph)).with_rules_enabled(config.boundary.rules_enabled);

    match cli.command {
        Command::Seed { workspace } => {
            let created = engine
                .registry()
                .create_standard_subgraphs(&WorkspaceId::from(workspace))
                .await?;
            println!("{}", serde_json::to_string(&created)?);
        }
        Command::Bind { subgraph, agent } => {
            let bound = engine
                .registry()
                .bind_agent(&SubgraphId::from(subgraph), &AgentId::from(agent))
                .await?;
            println!("{}", serde_json::to_string(&bound)?);
        }
        Command::Show { agent } => {
            let subgraph = engine
                .registry()
                .get_subgraph_for_agent(&AgentId::from(agent))
                .await?;
            println!("{}", serde_json::to_string(&subgraph)?);
        }
        Command::Exec {
            agent,
            label,
            query,
        } => {
            let params = read_params()?;
            let records = engine
                .execute_within_subgraph(&AgentId::from(agent), &label, &query, params)
                .await?;
            println!("{}", serde_json::to_string(&records)?);
        }
        Command::Rules { subgraph } => {
            let rules = engine
                .registry()
                .list_inference_rules(&SubgraphId::from(subgraph))
                .await?;
            println!("{}", serde_json::to_string(&rules)?);
        }
        Command::AddRule {
            subgraph,
            name,
            condition,
            action,
            priority,
            description,
            disabled,
        } => {
            let options = RuleOptions {
                priority,
                description,
                enabled: Some(!disabled),
            };
            let rule = engine
                .registry()
                .add_inference_rule(
                    &SubgraphId::from(subgraph),
                    &name,
                    &condition,
                    &action,
                    options,
                )
                .await?;
            println!("{}", serde_json::to_string(&rule)?);
        }
        Command::History { subgraph, limit } => {
            let history = engine
                .auditor()
                .access_history(
                    &SubgraphId::from(subgraph),
                    limit.unwrap_or(config.boundary.history_limit),
                )
                .await?;
            println!("{}", serde_json::to_string(&history)?);
        }
    }

    Ok(())
}

/// Query parameters as a JSON object on stdin. Nothing piped means no params.
fn read_params() -> anyhow::Result<Params> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(Params::new());
    }
    let input = std::io::read_to_string(stdin)?;
    if input.trim().is_empty() {
        return Ok(Params::new());
    }
    let params: Params = serde_json::from_str(&input)?;
    Ok(params)
}
