//! In-memory store for embedding the engine without Neo4j.
//!
//! Definitions, rules, and audit records are kept in maps. Arbitrary query
//! execution cannot be interpreted without a graph engine, so
//! [`GraphExecutor::execute`] records every call and answers from scripted
//! responses matched by query fragment (empty result when nothing matches).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_core::{
    AgentId, InferenceRule, Params, Record, RuleId, Subgraph, SubgraphAccess, SubgraphId,
};

use crate::client::GraphError;
use crate::store::{AccessLog, BindOutcome, GraphExecutor, SubgraphRepository};

/// A query seen by [`MemoryStore::execute`](GraphExecutor::execute).
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    pub query: String,
    pub params: Params,
}

#[derive(Debug, Clone)]
enum Scripted {
    Records(Vec<Record>),
    Failure(String),
}

#[derive(Default)]
struct MemoryState {
    subgraphs: HashMap<SubgraphId, Subgraph>,
    owners: HashMap<AgentId, SubgraphId>,
    rules: Vec<InferenceRule>,
    access: Vec<SubgraphAccess>,
    executed: Vec<ExecutedQuery>,
    scripted: Vec<(String, Scripted)>,
    enforced: Vec<SubgraphId>,
    fail_enforcement: bool,
    fail_access_writes: bool,
}

/// Mutex-guarded in-memory implementation of every store collaborator.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer queries containing `fragment` with `records`. Later scripts win.
    pub fn respond_to(&self, fragment: &str, records: Vec<Record>) {
        self.state()
            .scripted
            .push((fragment.to_string(), Scripted::Records(records)));
    }

    /// Fail queries containing `fragment` with `message`. Later scripts win.
    pub fn fail_on(&self, fragment: &str, message: &str) {
        self.state()
            .scripted
            .push((fragment.to_string(), Scripted::Failure(message.to_string())));
    }

    /// Make every audit append fail.
    pub fn fail_access_writes(&self, fail: bool) {
        self.state().fail_access_writes = fail;
    }

    /// Make the boundary enforcement hook fail.
    pub fn fail_enforcement(&self, fail: bool) {
        self.state().fail_enforcement = fail;
    }

    /// Every query passed to `execute`, in call order.
    pub fn executed(&self) -> Vec<ExecutedQuery> {
        self.state().executed.clone()
    }

    /// Every audit record appended so far, oldest first.
    pub fn access_records(&self) -> Vec<SubgraphAccess> {
        self.state().access.clone()
    }

    /// Subgraphs the enforcement hook has been applied to.
    pub fn enforced_subgraphs(&self) -> Vec<SubgraphId> {
        self.state().enforced.clone()
    }
}

#[async_trait]
impl GraphExecutor for MemoryStore {
    async fn execute(&self, query: &str, params: &Params) -> Result<Vec<Record>, GraphError> {
        let mut state = self.state();
        state.executed.push(ExecutedQuery {
            query: query.to_string(),
            params: params.clone(),
        });

        let scripted = state
            .scripted
            .iter()
            .rev()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
            .map(|(_, outcome)| outcome.clone());

        match scripted {
            Some(Scripted::Records(records)) => Ok(records),
            Some(Scripted::Failure(message)) => Err(GraphError::Execution(message)),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl SubgraphRepository for MemoryStore {
    async fn insert_subgraph(&self, subgraph: &Subgraph) -> Result<(), GraphError> {
        let mut state = self.state();
        if let Some(agent_id) = &subgraph.agent_id {
            state.owners.insert(agent_id.clone(), subgraph.id.clone());
        }
        state.subgraphs.insert(subgraph.id.clone(), subgraph.clone());
        Ok(())
    }

    async fn bind_agent(
        &self,
        subgraph_id: &SubgraphId,
        agent_id: &AgentId,
    ) -> Result<BindOutcome, GraphError> {
        let mut state = self.state();
        if let Some(other) = state.owners.get(agent_id) {
            if other != subgraph_id {
                return Ok(BindOutcome::AgentOwnsOther(other.clone()));
            }
        }

        let Some(subgraph) = state.subgraphs.get_mut(subgraph_id) else {
            return Ok(BindOutcome::Missing);
        };
        if let Some(owner) = &subgraph.agent_id {
            return Ok(BindOutcome::AlreadyBound(owner.clone()));
        }

        subgraph.agent_id = Some(agent_id.clone());
        subgraph.updated_at = Utc::now();
        let bound = subgraph.clone();
        state.owners.insert(agent_id.clone(), subgraph_id.clone());
        Ok(BindOutcome::Bound(bound))
    }

    async fn find_subgraph(&self, subgraph_id: &SubgraphId) -> Result<Option<Subgraph>, GraphError> {
        Ok(self.state().subgraphs.get(subgraph_id).cloned())
    }

    async fn find_subgraph_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<Subgraph>, GraphError> {
        let state = self.state();
        Ok(state
            .owners
            .get(agent_id)
            .and_then(|id| state.subgraphs.get(id))
            .cloned())
    }

    async fn enforce_boundaries(&self, subgraph: &Subgraph) -> Result<(), GraphError> {
        let mut state = self.state();
        if state.fail_enforcement {
            return Err(GraphError::Execution(
                "boundary enforcement unavailable".to_string(),
            ));
        }
        state.enforced.push(subgraph.id.clone());
        Ok(())
    }

    async fn insert_rule(&self, rule: &InferenceRule) -> Result<(), GraphError> {
        let mut state = self.state();
        let Some(subgraph) = state.subgraphs.get_mut(&rule.subgraph_id) else {
            return Err(GraphError::NotFound {
                label: "AgentSubgraph".to_string(),
                id: rule.subgraph_id.0.clone(),
            });
        };
        subgraph.inference_rule_ids.push(rule.id.clone());
        subgraph.updated_at = rule.created_at;
        state.rules.push(rule.clone());
        Ok(())
    }

    async fn list_rules(&self, subgraph_id: &SubgraphId) -> Result<Vec<InferenceRule>, GraphError> {
        let mut rules: Vec<InferenceRule> = self
            .state()
            .rules
            .iter()
            .filter(|r| &r.subgraph_id == subgraph_id)
            .cloned()
            .collect();
        // Stable sort keeps creation order among equal priorities.
        rules.sort_by_key(|r| r.priority);
        Ok(rules)
    }

    async fn record_rule_execution(
        &self,
        rule_id: &RuleId,
        elapsed_ms: f64,
        at: DateTime<Utc>,
    ) -> Result<(), GraphError> {
        let mut state = self.state();
        match state.rules.iter_mut().find(|r| &r.id == rule_id) {
            Some(rule) => {
                rule.record_execution(elapsed_ms, at);
                Ok(())
            }
            None => Err(GraphError::NotFound {
                label: "InferenceRule".to_string(),
                id: rule_id.0.clone(),
            }),
        }
    }
}

#[async_trait]
impl AccessLog for MemoryStore {
    async fn append(&self, record: &SubgraphAccess) -> Result<(), GraphError> {
        let mut state = self.state();
        if state.fail_access_writes {
            return Err(GraphError::Execution("access log unavailable".to_string()));
        }
        state.access.push(record.clone());
        Ok(())
    }

    async fn history(
        &self,
        subgraph_id: &SubgraphId,
        limit: usize,
    ) -> Result<Vec<SubgraphAccess>, GraphError> {
        Ok(self
            .state()
            .access
            .iter()
            .rev()
            .filter(|a| &a.subgraph_id == subgraph_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
