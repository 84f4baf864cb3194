//! Write operations for subgraph definitions, rules, and the access log.
//!
//! Subgraphs live as `:AgentSubgraph` nodes owned through
//! `(:Agent)-[:OWNS_SUBGRAPH]->(:AgentSubgraph)`; rules hang off their
//! subgraph via `:HAS_RULE`; audit records are standalone `:SubgraphAccess`
//! nodes that are only ever created.

use chrono::{DateTime, Utc};
use neo4rs::query;

use warden_core::{AgentId, InferenceRule, RuleId, Subgraph, SubgraphAccess, SubgraphId};

use crate::client::{GraphClient, GraphError};
use crate::queries::node_to_subgraph;
use crate::store::BindOutcome;

impl GraphClient {
    // ── Schema ───────────────────────────────────────────────────

    /// Uniqueness constraints the ownership writes rely on. Without them a
    /// concurrent `MERGE (:Agent)` could create two nodes for one agent.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        for statement in [
            "CREATE CONSTRAINT agent_id IF NOT EXISTS FOR (a:Agent) REQUIRE a.id IS UNIQUE",
            "CREATE CONSTRAINT agent_subgraph_id IF NOT EXISTS
             FOR (s:AgentSubgraph) REQUIRE s.id IS UNIQUE",
        ] {
            self.run(query(statement)).await?;
        }
        Ok(())
    }

    // ── Subgraphs ────────────────────────────────────────────────

    /// Create a subgraph node. Owners are attached separately by [`bind_subgraph`].
    ///
    /// [`bind_subgraph`]: GraphClient::bind_subgraph
    pub async fn create_subgraph_node(&self, sg: &Subgraph) -> Result<(), GraphError> {
        let q = query(
            "CREATE (s:AgentSubgraph {id: $id, workspace_id: $workspace_id})
             SET s.root_pattern = $root_pattern,
                 s.included_node_types = $included_node_types,
                 s.included_relationship_types = $included_relationship_types,
                 s.crud_permissions = $crud_permissions,
                 s.read_only_node_types = $read_only_node_types,
                 s.inference_rule_ids = $inference_rule_ids,
                 s.learning_pattern_ids = $learning_pattern_ids,
                 s.isolation_level = $isolation_level,
                 s.boundary_constraints = $boundary_constraints,
                 s.description = $description,
                 s.created_at = $created_at,
                 s.updated_at = $updated_at",
        )
        .param("id", sg.id.0.clone())
        .param("workspace_id", sg.workspace_id.0.clone())
        .param("root_pattern", sg.root_pattern.clone())
        .param("included_node_types", to_list(&sg.included_node_types))
        .param(
            "included_relationship_types",
            to_list(&sg.included_relationship_types),
        )
        .param(
            "crud_permissions",
            sg.crud_permissions
                .iter()
                .map(|op| op.as_str().to_string())
                .collect::<Vec<_>>(),
        )
        .param("read_only_node_types", to_list(&sg.read_only_node_types))
        .param(
            "inference_rule_ids",
            sg.inference_rule_ids
                .iter()
                .map(|id| id.0.clone())
                .collect::<Vec<_>>(),
        )
        .param("learning_pattern_ids", sg.learning_pattern_ids.clone())
        .param("isolation_level", sg.isolation_level.as_str())
        .param("boundary_constraints", sg.boundary_constraints.clone())
        .param("description", sg.description.clone())
        .param("created_at", sg.created_at.to_rfc3339())
        .param("updated_at", sg.updated_at.to_rfc3339());

        self.run(q).await
    }

    /// Conditionally bind an owner: succeeds only when the subgraph is
    /// unbound and the agent owns nothing else, in a single statement.
    ///
    /// Write locks on the agent and subgraph nodes are taken before either
    /// check, so concurrent binds touching the same agent or subgraph
    /// serialise and at most one of them matches.
    pub async fn bind_subgraph(
        &self,
        subgraph_id: &SubgraphId,
        agent_id: &AgentId,
    ) -> Result<BindOutcome, GraphError> {
        let q = query(
            "MERGE (a:Agent {id: $agent_id})
             SET a._bind_lock = true
             REMOVE a._bind_lock
             WITH a
             MATCH (s:AgentSubgraph {id: $id})
             SET s._bind_lock = true
             REMOVE s._bind_lock
             WITH a, s
             WHERE s.agent_id IS NULL
               AND NOT EXISTS { MATCH (a)-[:OWNS_SUBGRAPH]->(:AgentSubgraph) }
             SET s.agent_id = $agent_id, s.updated_at = $now
             MERGE (a)-[:OWNS_SUBGRAPH]->(s)
             RETURN s",
        )
        .param("id", subgraph_id.0.clone())
        .param("agent_id", agent_id.0.clone())
        .param("now", Utc::now().to_rfc3339());

        if let Some(row) = self.query_one(q).await? {
            let node: neo4rs::Node = row.get("s").map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize subgraph: {e}"))
            })?;
            return Ok(BindOutcome::Bound(node_to_subgraph(&node)?));
        }

        // The conditional write matched nothing; work out why.
        match self.get_subgraph_node(subgraph_id).await? {
            None => Ok(BindOutcome::Missing),
            Some(existing) => match existing.agent_id {
                Some(owner) => Ok(BindOutcome::AlreadyBound(owner)),
                None => {
                    let other = self.get_subgraph_for_agent(agent_id).await?;
                    Ok(other
                        .map(|sg| BindOutcome::AgentOwnsOther(sg.id))
                        .unwrap_or(BindOutcome::Missing))
                }
            },
        }
    }

    /// Stamp the subgraph as enforced. Neo4j has no native per-agent
    /// boundary primitive, so the marker is informational.
    pub async fn mark_boundaries_enforced(&self, sg: &Subgraph) -> Result<(), GraphError> {
        let q = query(
            "MATCH (s:AgentSubgraph {id: $id})
             SET s.boundary_enforced_at = $now",
        )
        .param("id", sg.id.0.clone())
        .param("now", Utc::now().to_rfc3339());

        self.run(q).await
    }

    // ── Inference Rules ──────────────────────────────────────────

    /// Create a rule node and append its id to the owning subgraph.
    pub async fn create_rule_node(&self, rule: &InferenceRule) -> Result<(), GraphError> {
        let q = query(
            "MATCH (s:AgentSubgraph {id: $subgraph_id})
             CREATE (s)-[:HAS_RULE]->(r:InferenceRule {id: $id})
             SET r.name = $name, r.subgraph_id = $subgraph_id,
                 r.agent_id = $agent_id,
                 r.condition = $condition, r.action = $action,
                 r.priority = $priority, r.description = $description,
                 r.enabled = $enabled, r.execution_count = 0,
                 r.average_execution_time_ms = 0.0,
                 r.created_at = $created_at,
                 s.inference_rule_ids = coalesce(s.inference_rule_ids, []) + $id,
                 s.updated_at = $created_at
             RETURN r.id AS id",
        )
        .param("subgraph_id", rule.subgraph_id.0.clone())
        .param("id", rule.id.0.clone())
        .param("name", rule.name.clone())
        .param("agent_id", opt_id(rule.agent_id.as_ref()))
        .param("condition", rule.condition.clone())
        .param("action", rule.action.clone())
        .param("priority", rule.priority)
        .param("description", rule.description.clone())
        .param("enabled", rule.enabled)
        .param("created_at", rule.created_at.to_rfc3339());

        match self.query_one(q).await? {
            Some(_) => Ok(()),
            None => Err(GraphError::NotFound {
                label: "AgentSubgraph".to_string(),
                id: rule.subgraph_id.0.clone(),
            }),
        }
    }

    /// Fold one execution into a rule's statistics in a single write.
    /// SET items apply in order, so the average reads the previous count.
    pub async fn update_rule_statistics(
        &self,
        rule_id: &RuleId,
        elapsed_ms: f64,
        at: DateTime<Utc>,
    ) -> Result<(), GraphError> {
        let q = query(
            "MATCH (r:InferenceRule {id: $id})
             SET r.average_execution_time_ms =
                   (coalesce(r.average_execution_time_ms, 0.0) * coalesce(r.execution_count, 0)
                    + $elapsed_ms) / (coalesce(r.execution_count, 0) + 1),
                 r.execution_count = coalesce(r.execution_count, 0) + 1,
                 r.last_executed_at = $at",
        )
        .param("id", rule_id.0.clone())
        .param("elapsed_ms", elapsed_ms)
        .param("at", at.to_rfc3339());

        self.run(q).await
    }

    // ── Access Log ───────────────────────────────────────────────

    /// Append an audit record. Records are never updated afterwards.
    pub async fn create_access_node(&self, record: &SubgraphAccess) -> Result<(), GraphError> {
        let q = query(
            "CREATE (a:SubgraphAccess {id: $id})
             SET a.agent_id = $agent_id, a.subgraph_id = $subgraph_id,
                 a.operation = $operation, a.operation_kind = $operation_kind,
                 a.node_types = $node_types,
                 a.relationship_types = $relationship_types,
                 a.success = $success,
                 a.violated_constraints = $violated_constraints,
                 a.timestamp = $timestamp,
                 a.content_hash = $content_hash",
        )
        .param("id", record.id.0.clone())
        .param("agent_id", record.agent_id.0.clone())
        .param("subgraph_id", record.subgraph_id.0.clone())
        .param("operation", record.operation.clone())
        .param("operation_kind", record.operation_kind.as_str())
        .param("node_types", record.node_types.clone())
        .param("relationship_types", record.relationship_types.clone())
        .param("success", record.success)
        .param("violated_constraints", record.violated_constraints.clone())
        .param("timestamp", record.timestamp.to_rfc3339())
        .param("content_hash", record.content_hash.clone().unwrap_or_default());

        self.run(q).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn to_list(set: &std::collections::BTreeSet<String>) -> Vec<String> {
    set.iter().cloned().collect()
}

fn opt_id(id: Option<&AgentId>) -> String {
    id.map(|a| a.0.clone()).unwrap_or_default()
}
