//! Access Auditor: one sealed, append-only record per guarded operation.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use warden_core::{AccessId, AgentId, SubgraphAccess, SubgraphId};
use warden_graph::AccessLog;

use crate::error::{BoundaryError, Result};
use crate::pattern::QueryFootprint;

/// How a guarded operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    Allowed,
    Denied(Vec<String>),
}

#[derive(Clone)]
pub struct AccessAuditor {
    log: Arc<dyn AccessLog>,
}

impl AccessAuditor {
    pub fn new(log: Arc<dyn AccessLog>) -> Self {
        Self { log }
    }

    /// Seal and append an audit record for one attempt.
    ///
    /// A persistence failure is returned as [`BoundaryError::AuditWrite`].
    pub async fn record_access(
        &self,
        agent_id: &AgentId,
        subgraph_id: &SubgraphId,
        operation: &str,
        footprint: &QueryFootprint,
        outcome: AccessOutcome,
    ) -> Result<SubgraphAccess> {
        let (success, violated_constraints) = match outcome {
            AccessOutcome::Allowed => (true, Vec::new()),
            AccessOutcome::Denied(violations) => (false, violations),
        };

        let record = SubgraphAccess {
            id: AccessId::new(),
            agent_id: agent_id.clone(),
            subgraph_id: subgraph_id.clone(),
            operation: operation.to_string(),
            operation_kind: footprint.operation,
            node_types: footprint.node_types.clone(),
            relationship_types: footprint.relationship_types.clone(),
            success,
            violated_constraints,
            timestamp: Utc::now(),
            content_hash: None,
        }
        .seal();

        self.log
            .append(&record)
            .await
            .map_err(BoundaryError::AuditWrite)?;

        debug!(
            access_id = %record.id,
            subgraph_id = %subgraph_id,
            success,
            "Recorded subgraph access"
        );
        Ok(record)
    }

    /// Most recent first.
    pub async fn access_history(
        &self,
        subgraph_id: &SubgraphId,
        limit: usize,
    ) -> Result<Vec<SubgraphAccess>> {
        Ok(self.log.history(subgraph_id, limit).await?)
    }

    /// Whether the record still matches its sealed hash.
    pub fn verify(&self, record: &SubgraphAccess) -> bool {
        record.verify_integrity()
    }
}
