//! Subgraph Registry: owns subgraph definitions and their inference rules.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use warden_core::{
    AgentId, InferenceRule, RuleId, RuleOptions, Subgraph, SubgraphDefinition, SubgraphId,
    WorkspaceId,
};
use warden_graph::{BindOutcome, SubgraphRepository};

use crate::error::{BoundaryError, Result};
use crate::templates::{StandardTemplate, TEMPLATE_CATALOG_VERSION};

#[derive(Clone)]
pub struct SubgraphRegistry {
    repository: Arc<dyn SubgraphRepository>,
}

impl SubgraphRegistry {
    pub fn new(repository: Arc<dyn SubgraphRepository>) -> Self {
        Self { repository }
    }

    /// Persist a new subgraph built from `definition`, optionally bound to `agent_id`.
    ///
    /// The boundary enforcement hook runs afterwards; its failure is logged
    /// and never fails creation.
    pub async fn create_subgraph(
        &self,
        agent_id: Option<&AgentId>,
        workspace_id: &WorkspaceId,
        definition: SubgraphDefinition,
    ) -> Result<Subgraph> {
        if let Some(agent_id) = agent_id {
            if let Some(owned) = self.repository.find_subgraph_for_agent(agent_id).await? {
                return Err(BoundaryError::AgentAlreadyOwnsSubgraph {
                    agent_id: agent_id.to_string(),
                    subgraph_id: owned.id.to_string(),
                });
            }
        }

        let mut subgraph = definition.materialize(None, workspace_id.clone());
        self.repository.insert_subgraph(&subgraph).await?;

        if let Some(agent_id) = agent_id {
            subgraph = self.bind_agent(&subgraph.id, agent_id).await?;
        }

        if let Err(e) = self.repository.enforce_boundaries(&subgraph).await {
            warn!(
                subgraph_id = %subgraph.id,
                error = %e,
                "Boundary enforcement hook failed; subgraph created without it"
            );
        }

        info!(
            subgraph_id = %subgraph.id,
            workspace_id = %workspace_id,
            agent_id = subgraph.agent_id.as_ref().map(|a| a.as_str()).unwrap_or(""),
            isolation = %subgraph.isolation_level,
            "Created subgraph"
        );
        Ok(subgraph)
    }

    /// Set the owner of an unbound subgraph. Owners never change afterwards.
    pub async fn bind_agent(
        &self,
        subgraph_id: &SubgraphId,
        agent_id: &AgentId,
    ) -> Result<Subgraph> {
        match self.repository.bind_agent(subgraph_id, agent_id).await? {
            BindOutcome::Bound(subgraph) => {
                info!(subgraph_id = %subgraph_id, agent_id = %agent_id, "Bound agent to subgraph");
                Ok(subgraph)
            }
            BindOutcome::AlreadyBound(owner) => Err(BoundaryError::AlreadyBound {
                subgraph_id: subgraph_id.to_string(),
                agent_id: owner.to_string(),
            }),
            BindOutcome::AgentOwnsOther(other) => Err(BoundaryError::AgentAlreadyOwnsSubgraph {
                agent_id: agent_id.to_string(),
                subgraph_id: other.to_string(),
            }),
            BindOutcome::Missing => Err(not_found(subgraph_id)),
        }
    }

    pub async fn get_subgraph_for_agent(&self, agent_id: &AgentId) -> Result<Subgraph> {
        self.repository
            .find_subgraph_for_agent(agent_id)
            .await?
            .ok_or_else(|| BoundaryError::NotFound {
                kind: "Subgraph for agent",
                id: agent_id.to_string(),
            })
    }

    pub async fn get_subgraph_by_id(&self, subgraph_id: &SubgraphId) -> Result<Subgraph> {
        self.repository
            .find_subgraph(subgraph_id)
            .await?
            .ok_or_else(|| not_found(subgraph_id))
    }

    /// Attach a rule to a subgraph. The rule inherits the subgraph's owner.
    pub async fn add_inference_rule(
        &self,
        subgraph_id: &SubgraphId,
        name: &str,
        condition: &str,
        action: &str,
        options: RuleOptions,
    ) -> Result<InferenceRule> {
        let subgraph = self.get_subgraph_by_id(subgraph_id).await?;
        let rule = InferenceRule::new(&subgraph, name, condition, action, options);
        self.repository.insert_rule(&rule).await?;

        info!(
            rule_id = %rule.id,
            subgraph_id = %subgraph_id,
            priority = rule.priority,
            enabled = rule.enabled,
            "Added inference rule"
        );
        Ok(rule)
    }

    /// Rules ascending by priority; ties keep creation order.
    pub async fn list_inference_rules(&self, subgraph_id: &SubgraphId) -> Result<Vec<InferenceRule>> {
        Ok(self.repository.list_rules(subgraph_id).await?)
    }

    pub(crate) async fn record_rule_execution(
        &self,
        rule_id: &RuleId,
        elapsed_ms: f64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        Ok(self
            .repository
            .record_rule_execution(rule_id, elapsed_ms, at)
            .await?)
    }

    /// Instantiate every built-in template for `workspace_id`, unbound.
    pub async fn create_standard_subgraphs(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<BTreeMap<String, Subgraph>> {
        let mut created = BTreeMap::new();
        for template in StandardTemplate::ALL {
            let subgraph = self
                .create_subgraph(None, workspace_id, template.definition())
                .await?;
            created.insert(template.name().to_string(), subgraph);
        }

        info!(
            workspace_id = %workspace_id,
            catalog_version = TEMPLATE_CATALOG_VERSION,
            count = created.len(),
            "Created standard subgraphs"
        );
        Ok(created)
    }
}

fn not_found(subgraph_id: &SubgraphId) -> BoundaryError {
    BoundaryError::NotFound {
        kind: "Subgraph",
        id: subgraph_id.to_string(),
    }
}
