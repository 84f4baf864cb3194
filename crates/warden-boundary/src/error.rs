//! Error types for the warden-boundary crate.

use thiserror::Error;

use warden_core::CrudOperation;
use warden_graph::GraphError;

/// A policy violation detected by the boundary validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Operation {operation} is not permitted in this subgraph")]
    OperationNotPermitted { operation: CrudOperation },

    #[error("Unauthorized node access: {}", types.join(", "))]
    UnauthorizedNodeAccess { types: Vec<String> },

    #[error("Read-only node types cannot be modified: {}", types.join(", "))]
    ReadOnlyNodeMutation { types: Vec<String> },

    #[error("Unauthorized relationship access: {}", types.join(", "))]
    UnauthorizedRelationshipAccess { types: Vec<String> },

    /// The query touches existing data but has no clause a boundary filter
    /// can be attached to.
    #[error("Boundary constraints cannot be applied to this query")]
    UnconstrainedQuery,
}

impl AuthorizationError {
    /// One entry per violated constraint, as stored in the access log.
    pub fn violated_constraints(&self) -> Vec<String> {
        match self {
            Self::OperationNotPermitted { operation } => vec![format!("operation:{operation}")],
            Self::UnauthorizedNodeAccess { types } => prefixed("node_type", types),
            Self::ReadOnlyNodeMutation { types } => prefixed("read_only_node_type", types),
            Self::UnauthorizedRelationshipAccess { types } => {
                prefixed("relationship_type", types)
            }
            Self::UnconstrainedQuery => vec!["boundary_constraints:unanchored".to_string()],
        }
    }
}

fn prefixed(dimension: &str, types: &[String]) -> Vec<String> {
    types.iter().map(|t| format!("{dimension}:{t}")).collect()
}

#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),

    #[error("Subgraph {subgraph_id} is already bound to agent {agent_id}")]
    AlreadyBound {
        subgraph_id: String,
        agent_id: String,
    },

    #[error("Agent {agent_id} already owns subgraph {subgraph_id}")]
    AgentAlreadyOwnsSubgraph {
        agent_id: String,
        subgraph_id: String,
    },

    /// The guarded query itself failed in the store.
    #[error(transparent)]
    StoreExecution(GraphError),

    #[error("Failed to persist access audit record: {0}")]
    AuditWrite(#[source] GraphError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, BoundaryError>;
