//! Store collaborator traits consumed by the boundary engine.
//!
//! The engine never talks to Neo4j directly: it holds these traits behind
//! `Arc<dyn ...>` so a host can plug in the Neo4j [`GraphClient`](crate::GraphClient)
//! or the in-memory [`MemoryStore`](crate::MemoryStore).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_core::{
    AgentId, InferenceRule, Params, Record, RuleId, Subgraph, SubgraphAccess, SubgraphId,
};

use crate::client::GraphError;

/// Arbitrary parameterized query execution against the shared graph.
#[async_trait]
pub trait GraphExecutor: Send + Sync {
    /// Run a query and collect every record.
    async fn execute(&self, query: &str, params: &Params) -> Result<Vec<Record>, GraphError>;

    /// Run a query and return the first record, if any.
    async fn execute_single(
        &self,
        query: &str,
        params: &Params,
    ) -> Result<Option<Record>, GraphError> {
        Ok(self.execute(query, params).await?.into_iter().next())
    }
}

/// Result of an attempt to bind an agent to a subgraph.
#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    Bound(Subgraph),
    /// The subgraph already has an owner.
    AlreadyBound(AgentId),
    /// The agent already owns a different subgraph.
    AgentOwnsOther(SubgraphId),
    Missing,
}

/// Persistence of subgraph and inference rule definitions.
#[async_trait]
pub trait SubgraphRepository: Send + Sync {
    async fn insert_subgraph(&self, subgraph: &Subgraph) -> Result<(), GraphError>;

    /// Set the owner of an unbound subgraph. The check and the write must be
    /// a single atomic store operation.
    async fn bind_agent(
        &self,
        subgraph_id: &SubgraphId,
        agent_id: &AgentId,
    ) -> Result<BindOutcome, GraphError>;

    async fn find_subgraph(&self, subgraph_id: &SubgraphId) -> Result<Option<Subgraph>, GraphError>;

    async fn find_subgraph_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<Subgraph>, GraphError>;

    /// Apply any native boundary enforcement the store offers. Stores
    /// without such a primitive may treat this as a no-op.
    async fn enforce_boundaries(&self, subgraph: &Subgraph) -> Result<(), GraphError>;

    /// Persist a rule and append its id to the owning subgraph.
    async fn insert_rule(&self, rule: &InferenceRule) -> Result<(), GraphError>;

    /// Rules of a subgraph, ascending by priority then creation time.
    async fn list_rules(&self, subgraph_id: &SubgraphId) -> Result<Vec<InferenceRule>, GraphError>;

    /// Atomically fold one execution into a rule's statistics.
    async fn record_rule_execution(
        &self,
        rule_id: &RuleId,
        elapsed_ms: f64,
        at: DateTime<Utc>,
    ) -> Result<(), GraphError>;
}

/// Append-only persistence of access audit records.
#[async_trait]
pub trait AccessLog: Send + Sync {
    async fn append(&self, record: &SubgraphAccess) -> Result<(), GraphError>;

    /// Most recent records of a subgraph first.
    async fn history(
        &self,
        subgraph_id: &SubgraphId,
        limit: usize,
    ) -> Result<Vec<SubgraphAccess>, GraphError>;
}
