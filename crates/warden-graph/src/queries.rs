//! Read operations and node decoding for subgraphs, rules, and the access log.

use chrono::{DateTime, Utc};
use neo4rs::query;

use warden_core::{
    AccessId, AgentId, CrudOperation, InferenceRule, IsolationLevel, RuleId, Subgraph,
    SubgraphAccess, SubgraphId, WorkspaceId,
};

use crate::client::{GraphClient, GraphError};

impl GraphClient {
    // ── Subgraph Lookups ─────────────────────────────────────────

    /// Get a subgraph by id.
    pub async fn get_subgraph_node(
        &self,
        subgraph_id: &SubgraphId,
    ) -> Result<Option<Subgraph>, GraphError> {
        let q = query(
            "MATCH (s:AgentSubgraph {id: $id})
             RETURN s",
        )
        .param("id", subgraph_id.0.clone());

        self.single_subgraph(q).await
    }

    /// Get the subgraph owned by an agent.
    pub async fn get_subgraph_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<Subgraph>, GraphError> {
        let q = query(
            "MATCH (:Agent {id: $agent_id})-[:OWNS_SUBGRAPH]->(s:AgentSubgraph)
             RETURN s
             ORDER BY s.created_at ASC
             LIMIT 1",
        )
        .param("agent_id", agent_id.0.clone());

        self.single_subgraph(q).await
    }

    async fn single_subgraph(&self, q: neo4rs::Query) -> Result<Option<Subgraph>, GraphError> {
        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("s").map_err(|e| {
                    GraphError::Serialization(format!("Failed to deserialize subgraph: {e}"))
                })?;
                Ok(Some(node_to_subgraph(&node)?))
            }
            None => Ok(None),
        }
    }

    // ── Rule Queries ─────────────────────────────────────────────

    /// List the rules of a subgraph, lowest priority value first.
    pub async fn get_rules(
        &self,
        subgraph_id: &SubgraphId,
    ) -> Result<Vec<InferenceRule>, GraphError> {
        let q = query(
            "MATCH (r:InferenceRule {subgraph_id: $subgraph_id})
             RETURN r
             ORDER BY r.priority ASC, r.created_at ASC",
        )
        .param("subgraph_id", subgraph_id.0.clone());

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row.get("r").map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize rule: {e}"))
            })?;
            results.push(node_to_rule(&node)?);
        }
        Ok(results)
    }

    // ── Access Log Queries ───────────────────────────────────────

    /// Most recent audit records of a subgraph.
    pub async fn get_access_history(
        &self,
        subgraph_id: &SubgraphId,
        limit: usize,
    ) -> Result<Vec<SubgraphAccess>, GraphError> {
        let q = query(
            "MATCH (a:SubgraphAccess {subgraph_id: $subgraph_id})
             RETURN a
             ORDER BY a.timestamp DESC
             LIMIT $limit",
        )
        .param("subgraph_id", subgraph_id.0.clone())
        .param("limit", limit as i64);

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row.get("a").map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize access record: {e}"))
            })?;
            results.push(node_to_access(&node)?);
        }
        Ok(results)
    }
}

// ── Decoding ─────────────────────────────────────────────────────

pub(crate) fn node_to_subgraph(node: &neo4rs::Node) -> Result<Subgraph, GraphError> {
    let isolation: String = required(node, "isolation_level")?;
    let crud: Vec<String> = node.get("crud_permissions").unwrap_or_default();

    Ok(Subgraph {
        id: SubgraphId(required(node, "id")?),
        agent_id: optional_string(node, "agent_id").map(AgentId),
        workspace_id: WorkspaceId(required(node, "workspace_id")?),
        root_pattern: node.get("root_pattern").unwrap_or_default(),
        included_node_types: string_list(node, "included_node_types").into_iter().collect(),
        included_relationship_types: string_list(node, "included_relationship_types")
            .into_iter()
            .collect(),
        crud_permissions: crud
            .iter()
            .map(|op| {
                CrudOperation::parse(op).ok_or_else(|| {
                    GraphError::Serialization(format!("Unknown CRUD permission: {op}"))
                })
            })
            .collect::<Result<_, _>>()?,
        read_only_node_types: string_list(node, "read_only_node_types").into_iter().collect(),
        inference_rule_ids: string_list(node, "inference_rule_ids")
            .into_iter()
            .map(RuleId)
            .collect(),
        learning_pattern_ids: string_list(node, "learning_pattern_ids"),
        isolation_level: IsolationLevel::parse(&isolation).ok_or_else(|| {
            GraphError::Serialization(format!("Unknown isolation level: {isolation}"))
        })?,
        boundary_constraints: string_list(node, "boundary_constraints"),
        description: node.get("description").unwrap_or_default(),
        created_at: timestamp(node, "created_at")?,
        updated_at: timestamp(node, "updated_at")?,
    })
}

pub(crate) fn node_to_rule(node: &neo4rs::Node) -> Result<InferenceRule, GraphError> {
    let execution_count: i64 = node.get("execution_count").unwrap_or(0);
    let last_executed_at = match optional_string(node, "last_executed_at") {
        Some(raw) => Some(parse_timestamp(&raw)?),
        None => None,
    };

    Ok(InferenceRule {
        id: RuleId(required(node, "id")?),
        name: node.get("name").unwrap_or_default(),
        agent_id: optional_string(node, "agent_id").map(AgentId),
        subgraph_id: SubgraphId(required(node, "subgraph_id")?),
        condition: node.get("condition").unwrap_or_default(),
        action: required(node, "action")?,
        priority: node.get("priority").unwrap_or(warden_core::types::DEFAULT_RULE_PRIORITY),
        description: node.get("description").unwrap_or_default(),
        enabled: node.get("enabled").unwrap_or(true),
        execution_count: execution_count.max(0) as u64,
        last_executed_at,
        average_execution_time_ms: node.get("average_execution_time_ms").unwrap_or(0.0),
        created_at: timestamp(node, "created_at")?,
    })
}

pub(crate) fn node_to_access(node: &neo4rs::Node) -> Result<SubgraphAccess, GraphError> {
    let kind: String = required(node, "operation_kind")?;

    Ok(SubgraphAccess {
        id: AccessId(required(node, "id")?),
        agent_id: AgentId(required(node, "agent_id")?),
        subgraph_id: SubgraphId(required(node, "subgraph_id")?),
        operation: node.get("operation").unwrap_or_default(),
        operation_kind: CrudOperation::parse(&kind).ok_or_else(|| {
            GraphError::Serialization(format!("Unknown operation kind: {kind}"))
        })?,
        node_types: string_list(node, "node_types"),
        relationship_types: string_list(node, "relationship_types"),
        success: node.get("success").unwrap_or(false),
        violated_constraints: string_list(node, "violated_constraints"),
        timestamp: timestamp(node, "timestamp")?,
        content_hash: optional_string(node, "content_hash"),
    })
}

fn required(node: &neo4rs::Node, key: &str) -> Result<String, GraphError> {
    node.get::<String>(key)
        .map_err(|e| GraphError::Serialization(format!("Missing property {key}: {e}")))
}

/// Absent and empty string properties both decode to `None`.
fn optional_string(node: &neo4rs::Node, key: &str) -> Option<String> {
    node.get::<String>(key).ok().filter(|s| !s.is_empty())
}

fn string_list(node: &neo4rs::Node, key: &str) -> Vec<String> {
    node.get::<Vec<String>>(key).unwrap_or_default()
}

fn timestamp(node: &neo4rs::Node, key: &str) -> Result<DateTime<Utc>, GraphError> {
    parse_timestamp(&required(node, key)?)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, GraphError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GraphError::Serialization(format!("Invalid timestamp {raw}: {e}")))
}
