//! Store collaborator implementations for the Neo4j client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_core::{AgentId, InferenceRule, RuleId, Subgraph, SubgraphAccess, SubgraphId};

use crate::client::{GraphClient, GraphError};
use crate::store::{AccessLog, BindOutcome, SubgraphRepository};

#[async_trait]
impl SubgraphRepository for GraphClient {
    async fn insert_subgraph(&self, subgraph: &Subgraph) -> Result<(), GraphError> {
        self.create_subgraph_node(subgraph).await
    }

    async fn bind_agent(
        &self,
        subgraph_id: &SubgraphId,
        agent_id: &AgentId,
    ) -> Result<BindOutcome, GraphError> {
        self.bind_subgraph(subgraph_id, agent_id).await
    }

    async fn find_subgraph(&self, subgraph_id: &SubgraphId) -> Result<Option<Subgraph>, GraphError> {
        self.get_subgraph_node(subgraph_id).await
    }

    async fn find_subgraph_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<Subgraph>, GraphError> {
        self.get_subgraph_for_agent(agent_id).await
    }

    async fn enforce_boundaries(&self, subgraph: &Subgraph) -> Result<(), GraphError> {
        self.mark_boundaries_enforced(subgraph).await
    }

    async fn insert_rule(&self, rule: &InferenceRule) -> Result<(), GraphError> {
        self.create_rule_node(rule).await
    }

    async fn list_rules(&self, subgraph_id: &SubgraphId) -> Result<Vec<InferenceRule>, GraphError> {
        self.get_rules(subgraph_id).await
    }

    async fn record_rule_execution(
        &self,
        rule_id: &RuleId,
        elapsed_ms: f64,
        at: DateTime<Utc>,
    ) -> Result<(), GraphError> {
        self.update_rule_statistics(rule_id, elapsed_ms, at).await
    }
}

#[async_trait]
impl AccessLog for GraphClient {
    async fn append(&self, record: &SubgraphAccess) -> Result<(), GraphError> {
        self.create_access_node(record).await
    }

    async fn history(
        &self,
        subgraph_id: &SubgraphId,
        limit: usize,
    ) -> Result<Vec<SubgraphAccess>, GraphError> {
        self.get_access_history(subgraph_id, limit).await
    }
}
