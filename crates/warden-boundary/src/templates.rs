//! Built-in subgraph profiles instantiated by
//! [`SubgraphRegistry::create_standard_subgraphs`](crate::registry::SubgraphRegistry::create_standard_subgraphs).
//!
//! The catalog is fixed. Changing any profile means bumping
//! [`TEMPLATE_CATALOG_VERSION`].

use std::collections::BTreeSet;
use std::fmt;

use warden_core::{CrudOperation, IsolationLevel, SubgraphDefinition};

pub const TEMPLATE_CATALOG_VERSION: u32 = 1;

/// Constraint shared by every template. Guarded queries name their primary
/// node `n` for it to apply.
pub const WORKSPACE_CONSTRAINT: &str = "n.workspaceId = $workspaceId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StandardTemplate {
    Product,
    Marketing,
    Development,
    Task,
}

impl StandardTemplate {
    pub const ALL: [StandardTemplate; 4] = [
        Self::Product,
        Self::Marketing,
        Self::Development,
        Self::Task,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Marketing => "marketing",
            Self::Development => "development",
            Self::Task => "task",
        }
    }

    pub fn definition(&self) -> SubgraphDefinition {
        use CrudOperation::{Create, Delete, Read, Update};

        match self {
            Self::Product => profile(
                "(n:Product)",
                &["Product", "Feature", "Persona", "UserStory", "Requirement"],
                &["HAS_FEATURE", "TARGETS", "DESCRIBES", "REQUIRES"],
                &[Create, Read, Update, Delete],
                &["Task", "Initiative"],
                IsolationLevel::Strict,
                &["product-discovery"],
                "Product strategy: features, personas, stories, requirements",
            ),
            Self::Marketing => profile(
                "(n:Campaign)",
                &["Campaign", "Persona", "Channel", "Content", "Audience"],
                &["TARGETS", "PUBLISHED_ON", "PROMOTES", "REACHES"],
                &[Create, Read, Update],
                &["Product", "Feature"],
                IsolationLevel::Permissive,
                &["campaign-performance"],
                "Go-to-market: campaigns, channels, content, audiences",
            ),
            Self::Development => profile(
                "(n:Repository)",
                &["Repository", "Component", "Task", "Bug", "Release"],
                &["CONTAINS", "IMPLEMENTS", "FIXES", "SHIPS", "DEPENDS_ON"],
                &[Create, Read, Update, Delete],
                &["Product", "Feature", "Requirement"],
                IsolationLevel::Strict,
                &["delivery-cadence"],
                "Engineering: repositories, components, bugs, releases",
            ),
            Self::Task => profile(
                "(n:Task)",
                &["Task", "Subtask", "Initiative"],
                &["HAS_SUBTASK", "BLOCKS", "PART_OF", "ASSIGNED_TO"],
                &[Create, Read, Update],
                &["Persona", "Product"],
                IsolationLevel::Shared,
                &["task-throughput"],
                "Work tracking: tasks, subtasks, initiatives",
            ),
        }
    }
}

impl fmt::Display for StandardTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[allow(clippy::too_many_arguments)]
fn profile(
    root_pattern: &str,
    node_types: &[&str],
    relationship_types: &[&str],
    crud: &[CrudOperation],
    read_only: &[&str],
    isolation: IsolationLevel,
    learning_patterns: &[&str],
    description: &str,
) -> SubgraphDefinition {
    SubgraphDefinition {
        root_pattern: Some(root_pattern.to_string()),
        included_node_types: Some(strings(node_types)),
        included_relationship_types: Some(strings(relationship_types)),
        crud_permissions: Some(crud.iter().copied().collect()),
        read_only_node_types: Some(strings(read_only)),
        learning_pattern_ids: Some(learning_patterns.iter().map(|s| s.to_string()).collect()),
        isolation_level: Some(isolation),
        boundary_constraints: Some(vec![WORKSPACE_CONSTRAINT.to_string()]),
        description: Some(description.to_string()),
    }
}

fn strings(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
