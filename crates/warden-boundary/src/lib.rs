//! warden-boundary: Agent subgraph ownership and boundary enforcement.
//!
//! Every query an agent runs against the shared graph goes through
//! [`BoundaryEngine::execute_within_subgraph`], which looks up the agent's
//! subgraph, validates the query against it, injects the subgraph's boundary
//! constraints, executes, audits the attempt, and finally runs the
//! subgraph's inference rules.

pub mod auditor;
pub mod error;
pub mod inference;
pub mod injector;
pub mod pattern;
pub mod registry;
pub mod templates;
pub mod validator;

pub use auditor::{AccessAuditor, AccessOutcome};
pub use error::{AuthorizationError, BoundaryError};
pub use inference::{InferenceEngine, InferenceReport, RuleError};
pub use pattern::QueryFootprint;
pub use registry::SubgraphRegistry;
pub use templates::StandardTemplate;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use warden_core::{AgentId, Params, Record, Subgraph};
use warden_graph::{AccessLog, GraphExecutor, SubgraphRepository};

/// Parameter names the engine always binds itself.
pub const BOUND_PARAMS: [&str; 3] = ["workspaceId", "subgraphId", "agentId"];

/// The guarded entry point for agent queries.
#[derive(Clone)]
pub struct BoundaryEngine {
    executor: Arc<dyn GraphExecutor>,
    registry: SubgraphRegistry,
    auditor: AccessAuditor,
    inference: InferenceEngine,
    rules_enabled: bool,
}

impl BoundaryEngine {
    /// Build an engine whose collaborators are all served by one store.
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: GraphExecutor + SubgraphRepository + AccessLog + 'static,
    {
        Self::from_parts(store.clone(), store.clone(), store)
    }

    pub fn from_parts(
        executor: Arc<dyn GraphExecutor>,
        repository: Arc<dyn SubgraphRepository>,
        log: Arc<dyn AccessLog>,
    ) -> Self {
        let registry = SubgraphRegistry::new(repository);
        Self {
            inference: InferenceEngine::new(registry.clone(), executor.clone()),
            executor,
            registry,
            auditor: AccessAuditor::new(log),
            rules_enabled: true,
        }
    }

    /// Turn post-operation inference on or off.
    pub fn with_rules_enabled(mut self, enabled: bool) -> Self {
        self.rules_enabled = enabled;
        self
    }

    pub fn registry(&self) -> &SubgraphRegistry {
        &self.registry
    }

    pub fn auditor(&self) -> &AccessAuditor {
        &self.auditor
    }

    /// Run `query` on behalf of `agent_id`, confined to the agent's subgraph.
    ///
    /// Orchestrates: lookup → validate → inject → execute → audit → inference.
    /// Every attempt past the lookup is audited exactly once; a query the
    /// boundary constraints cannot attach to is denied like any violation.
    pub async fn execute_within_subgraph(
        &self,
        agent_id: &AgentId,
        operation: &str,
        query: &str,
        params: Params,
    ) -> error::Result<Vec<Record>> {
        let subgraph = self.registry.get_subgraph_for_agent(agent_id).await?;

        let footprint = QueryFootprint::of(query);
        let guarded = validator::validate_footprint(&subgraph, &footprint)
            .and_then(|()| injector::inject_constraints(query, &subgraph.boundary_constraints));
        let guarded = match guarded {
            Ok(guarded) => guarded,
            Err(violation) => {
                warn!(
                    agent_id = %agent_id,
                    subgraph_id = %subgraph.id,
                    operation,
                    error = %violation,
                    "Boundary violation"
                );
                self.auditor
                    .record_access(
                        agent_id,
                        &subgraph.id,
                        operation,
                        &footprint,
                        AccessOutcome::Denied(violation.violated_constraints()),
                    )
                    .await?;
                return Err(violation.into());
            }
        };

        debug!(subgraph_id = %subgraph.id, query = %guarded, "Executing guarded query");
        let params = bind_boundary_params(params, &subgraph, agent_id);

        let records = match self.executor.execute(&guarded, &params).await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    agent_id = %agent_id,
                    subgraph_id = %subgraph.id,
                    operation,
                    error = %e,
                    "Guarded query failed"
                );
                self.auditor
                    .record_access(
                        agent_id,
                        &subgraph.id,
                        operation,
                        &footprint,
                        AccessOutcome::Denied(vec![e.to_string()]),
                    )
                    .await?;
                return Err(BoundaryError::StoreExecution(e));
            }
        };

        self.auditor
            .record_access(
                agent_id,
                &subgraph.id,
                operation,
                &footprint,
                AccessOutcome::Allowed,
            )
            .await?;

        if self.rules_enabled {
            let report = self.inference.run_rules(&subgraph, &records).await;
            debug!(
                subgraph_id = %subgraph.id,
                evaluated = report.evaluated,
                fired = report.fired.len(),
                failed = report.failed.len(),
                "Inference pass complete"
            );
        }

        Ok(records)
    }
}

/// Bind the subgraph's identity into `params`, overriding caller values.
fn bind_boundary_params(mut params: Params, subgraph: &Subgraph, agent_id: &AgentId) -> Params {
    let bound = [
        Value::String(subgraph.workspace_id.to_string()),
        Value::String(subgraph.id.to_string()),
        Value::String(agent_id.to_string()),
    ];
    for (name, value) in BOUND_PARAMS.into_iter().zip(bound) {
        if let Some(previous) = params.insert(name.to_string(), value.clone()) {
            if previous != value {
                warn!(param = name, "Caller-supplied boundary parameter overridden");
            }
        }
    }
    params
}
