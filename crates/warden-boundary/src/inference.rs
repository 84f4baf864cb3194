//! Inference Engine: condition→action rules run after a successful guarded
//! operation.
//!
//! Rules are isolated from each other and from the triggering call. A rule
//! that fails is logged and counted in the [`InferenceReport`]; it never
//! aborts the remaining rules.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use warden_core::{CrudOperation, InferenceRule, Params, Record, RuleId, Subgraph};
use warden_graph::{GraphError, GraphExecutor};

use crate::error::AuthorizationError;
use crate::pattern::classify_operation;
use crate::registry::SubgraphRegistry;
use crate::validator::validate;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule {rule_id} condition must be a READ query, classified as {operation}")]
    ConditionNotReadOnly {
        rule_id: RuleId,
        operation: CrudOperation,
    },

    #[error("Rule {rule_id} condition failed: {source}")]
    Condition {
        rule_id: RuleId,
        #[source]
        source: GraphError,
    },

    #[error("Rule {rule_id} action is outside the subgraph boundary: {source}")]
    ActionOutOfBounds {
        rule_id: RuleId,
        #[source]
        source: AuthorizationError,
    },

    #[error("Rule {rule_id} action failed: {source}")]
    Action {
        rule_id: RuleId,
        #[source]
        source: GraphError,
    },
}

/// Summary of one inference pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InferenceReport {
    /// Enabled rules whose condition was evaluated.
    pub evaluated: usize,
    pub fired: Vec<RuleId>,
    /// Disabled rules.
    pub skipped: usize,
    pub failed: Vec<RuleId>,
}

#[derive(Clone)]
pub struct InferenceEngine {
    registry: SubgraphRegistry,
    executor: Arc<dyn GraphExecutor>,
}

impl InferenceEngine {
    pub fn new(registry: SubgraphRegistry, executor: Arc<dyn GraphExecutor>) -> Self {
        Self { registry, executor }
    }

    /// Evaluate every enabled rule of `subgraph` in priority order against
    /// the records of the operation that just succeeded.
    pub async fn run_rules(&self, subgraph: &Subgraph, result: &[Record]) -> InferenceReport {
        let mut report = InferenceReport::default();

        let rules = match self.registry.list_inference_rules(&subgraph.id).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(subgraph_id = %subgraph.id, error = %e, "Failed to load inference rules");
                return report;
            }
        };

        for rule in rules {
            if !rule.enabled {
                report.skipped += 1;
                continue;
            }
            report.evaluated += 1;

            let start = Instant::now();
            match self.apply_rule(subgraph, &rule, result).await {
                Ok(false) => {}
                Ok(true) => {
                    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                    if let Err(e) = self
                        .registry
                        .record_rule_execution(&rule.id, elapsed_ms, Utc::now())
                        .await
                    {
                        warn!(rule_id = %rule.id, error = %e, "Failed to update rule statistics");
                    }
                    debug!(rule_id = %rule.id, name = %rule.name, elapsed_ms, "Inference rule fired");
                    report.fired.push(rule.id);
                }
                Err(e) => {
                    warn!(
                        rule_id = %rule.id,
                        subgraph_id = %subgraph.id,
                        error = %e,
                        "Inference rule execution failed"
                    );
                    report.failed.push(rule.id);
                }
            }
        }

        report
    }

    /// Returns whether the action ran.
    async fn apply_rule(
        &self,
        subgraph: &Subgraph,
        rule: &InferenceRule,
        result: &[Record],
    ) -> Result<bool, RuleError> {
        let params = rule_params(subgraph, rule, result);

        if !rule.condition.trim().is_empty() {
            let operation = classify_operation(&rule.condition);
            if operation != CrudOperation::Read {
                return Err(RuleError::ConditionNotReadOnly {
                    rule_id: rule.id.clone(),
                    operation,
                });
            }

            let records = self
                .executor
                .execute(&rule.condition, &params)
                .await
                .map_err(|source| RuleError::Condition {
                    rule_id: rule.id.clone(),
                    source,
                })?;
            if !condition_holds(&records) {
                return Ok(false);
            }
        }

        validate(subgraph, &rule.action).map_err(|source| RuleError::ActionOutOfBounds {
            rule_id: rule.id.clone(),
            source,
        })?;

        self.executor
            .execute(&rule.action, &params)
            .await
            .map_err(|source| RuleError::Action {
                rule_id: rule.id.clone(),
                source,
            })?;
        Ok(true)
    }
}

fn rule_params(subgraph: &Subgraph, rule: &InferenceRule, result: &[Record]) -> Params {
    let mut params = Params::new();
    params.insert("subgraphId".into(), Value::String(subgraph.id.to_string()));
    params.insert(
        "workspaceId".into(),
        Value::String(subgraph.workspace_id.to_string()),
    );
    params.insert(
        "agentId".into(),
        subgraph
            .agent_id
            .as_ref()
            .map(|a| Value::String(a.to_string()))
            .unwrap_or(Value::Null),
    );
    params.insert("ruleId".into(), Value::String(rule.id.to_string()));
    params.insert(
        "result".into(),
        Value::Array(result.iter().cloned().map(Value::Object).collect()),
    );
    params
}

/// A condition holds when any returned record holds. A record made of a
/// single boolean holds iff it is true; a single null never holds.
pub fn condition_holds(records: &[Record]) -> bool {
    records.iter().any(|record| {
        let mut values = record.values();
        match (values.next(), values.next()) {
            (Some(Value::Bool(b)), None) => *b,
            (Some(Value::Null), None) => false,
            _ => true,
        }
    })
}
