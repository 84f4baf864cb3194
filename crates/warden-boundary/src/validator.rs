//! Boundary validation: CRUD, node types, read-only types, relationship types.
//!
//! Checks run in a fixed order and stop at the first violation, so a query
//! that breaks several rules always reports the same one.

use std::collections::BTreeSet;

use warden_core::{IsolationLevel, Subgraph};

use crate::error::AuthorizationError;
use crate::pattern::QueryFootprint;

/// Extract the footprint of `query` and check it against `subgraph`.
pub fn validate(subgraph: &Subgraph, query: &str) -> Result<QueryFootprint, AuthorizationError> {
    let footprint = QueryFootprint::of(query);
    validate_footprint(subgraph, &footprint)?;
    Ok(footprint)
}

pub fn validate_footprint(
    subgraph: &Subgraph,
    footprint: &QueryFootprint,
) -> Result<(), AuthorizationError> {
    if !subgraph.permits(footprint.operation) {
        return Err(AuthorizationError::OperationNotPermitted {
            operation: footprint.operation,
        });
    }

    let unauthorized = offending(&footprint.node_types, |t| !subgraph.allows_node_type(t));
    if !unauthorized.is_empty() {
        return Err(AuthorizationError::UnauthorizedNodeAccess {
            types: unauthorized,
        });
    }

    if footprint.operation.is_mutation() {
        let read_only = offending(&footprint.mutated_node_types, |t| {
            subgraph.read_only_node_types.contains(t)
        });
        if !read_only.is_empty() {
            return Err(AuthorizationError::ReadOnlyNodeMutation { types: read_only });
        }
    }

    // Only strict subgraphs pin relationship types.
    if subgraph.isolation_level == IsolationLevel::Strict {
        let unauthorized = offending(&footprint.relationship_types, |t| {
            !subgraph.included_relationship_types.contains(t)
        });
        if !unauthorized.is_empty() {
            return Err(AuthorizationError::UnauthorizedRelationshipAccess {
                types: unauthorized,
            });
        }
    }

    Ok(())
}

/// Distinct offenders in first-appearance order.
fn offending(types: &[String], rejects: impl Fn(&str) -> bool) -> Vec<String> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut offenders = Vec::new();
    for t in types {
        if rejects(t) && seen.insert(t) {
            offenders.push(t.clone());
        }
    }
    offenders
}
