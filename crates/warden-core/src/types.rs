//! Core domain types for agent subgraph ownership.
//!
//! These types describe the slice of the shared graph an agent owns, the
//! audit trail of every access attempt, and the inference rules fired
//! after successful operations. Storage layers serialize them at their own
//! boundary; in the domain layer collections stay natively typed.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query parameters bound by name (`$name`) into a graph query.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A single result row returned by the graph store.
pub type Record = serde_json::Map<String, serde_json::Value>;

// ── Identifiers ───────────────────────────────────────────────────

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Unique identifier of a subgraph.
    SubgraphId
);
string_id!(
    /// Identifier of an autonomous agent. Assigned by the host, not by Warden.
    AgentId
);
string_id!(
    /// Tenant scope every subgraph belongs to.
    WorkspaceId
);
string_id!(
    /// Unique identifier of an inference rule.
    RuleId
);
string_id!(
    /// Unique identifier of an audit record.
    AccessId
);

// ── Enums ─────────────────────────────────────────────────────────

/// The CRUD category of a graph operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrudOperation {
    Create,
    Read,
    Update,
    Delete,
}

impl CrudOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the operation writes to the graph.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Read)
    }

    /// Parse the stored upper-case form.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Some(Self::Create),
            "READ" => Some(Self::Read),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for CrudOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strictly cross-subgraph relationships are policed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    /// Relationship types outside the subgraph are rejected.
    Strict,
    #[default]
    Permissive,
    Shared,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Permissive => "permissive",
            Self::Shared => "shared",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "permissive" => Some(Self::Permissive),
            "shared" => Some(Self::Shared),
            _ => None,
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Subgraph ──────────────────────────────────────────────────────

/// The bounded slice of the shared graph one agent may operate on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subgraph {
    pub id: SubgraphId,
    /// Owning agent. `None` until the subgraph is bound.
    pub agent_id: Option<AgentId>,
    pub workspace_id: WorkspaceId,
    /// Seed pattern identifying the subgraph's members.
    pub root_pattern: String,
    pub included_node_types: BTreeSet<String>,
    pub included_relationship_types: BTreeSet<String>,
    pub crud_permissions: BTreeSet<CrudOperation>,
    /// Readable across subgraphs but never mutable, whatever `crud_permissions` says.
    pub read_only_node_types: BTreeSet<String>,
    pub inference_rule_ids: Vec<RuleId>,
    pub learning_pattern_ids: Vec<String>,
    pub isolation_level: IsolationLevel,
    /// Predicate fragments AND-ed into every query run inside the subgraph.
    pub boundary_constraints: Vec<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subgraph {
    pub fn permits(&self, operation: CrudOperation) -> bool {
        self.crud_permissions.contains(&operation)
    }

    /// Node types that may be referenced at all (owned or read-only).
    pub fn allows_node_type(&self, node_type: &str) -> bool {
        self.included_node_types.contains(node_type)
            || self.read_only_node_types.contains(node_type)
    }

    pub fn is_bound(&self) -> bool {
        self.agent_id.is_some()
    }
}

/// Caller-supplied subgraph definition. Unset fields fall back to defaults
/// when the registry materializes the subgraph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubgraphDefinition {
    pub root_pattern: Option<String>,
    pub included_node_types: Option<BTreeSet<String>>,
    pub included_relationship_types: Option<BTreeSet<String>>,
    pub crud_permissions: Option<BTreeSet<CrudOperation>>,
    pub read_only_node_types: Option<BTreeSet<String>>,
    pub learning_pattern_ids: Option<Vec<String>>,
    pub isolation_level: Option<IsolationLevel>,
    pub boundary_constraints: Option<Vec<String>>,
    pub description: Option<String>,
}

impl SubgraphDefinition {
    /// Merge the definition over defaults: READ-only CRUD, permissive isolation.
    pub fn materialize(self, agent_id: Option<AgentId>, workspace_id: WorkspaceId) -> Subgraph {
        let now = Utc::now();
        Subgraph {
            id: SubgraphId::new(),
            agent_id,
            workspace_id,
            root_pattern: self.root_pattern.unwrap_or_default(),
            included_node_types: self.included_node_types.unwrap_or_default(),
            included_relationship_types: self.included_relationship_types.unwrap_or_default(),
            crud_permissions: self
                .crud_permissions
                .unwrap_or_else(|| BTreeSet::from([CrudOperation::Read])),
            read_only_node_types: self.read_only_node_types.unwrap_or_default(),
            inference_rule_ids: Vec::new(),
            learning_pattern_ids: self.learning_pattern_ids.unwrap_or_default(),
            isolation_level: self.isolation_level.unwrap_or_default(),
            boundary_constraints: self.boundary_constraints.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ── Audit ─────────────────────────────────────────────────────────

/// Immutable audit record of one attempted guarded operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubgraphAccess {
    pub id: AccessId,
    pub agent_id: AgentId,
    pub subgraph_id: SubgraphId,
    /// Caller-supplied label, e.g. "createPersona".
    pub operation: String,
    /// Classified CRUD kind of the query.
    pub operation_kind: CrudOperation,
    pub node_types: Vec<String>,
    pub relationship_types: Vec<String>,
    pub success: bool,
    /// Populated only when `success` is false.
    pub violated_constraints: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// BLAKE3 hash (hex) over every other field, set when sealed.
    pub content_hash: Option<String>,
}

/// Hashable view of an access record (everything except the hash itself).
#[derive(Serialize)]
struct HashableAccess<'a> {
    id: &'a AccessId,
    agent_id: &'a AgentId,
    subgraph_id: &'a SubgraphId,
    operation: &'a str,
    operation_kind: &'a CrudOperation,
    node_types: &'a [String],
    relationship_types: &'a [String],
    success: bool,
    violated_constraints: &'a [String],
    timestamp: &'a DateTime<Utc>,
}

impl SubgraphAccess {
    pub fn compute_hash(&self) -> String {
        let hashable = HashableAccess {
            id: &self.id,
            agent_id: &self.agent_id,
            subgraph_id: &self.subgraph_id,
            operation: &self.operation,
            operation_kind: &self.operation_kind,
            node_types: &self.node_types,
            relationship_types: &self.relationship_types,
            success: self.success,
            violated_constraints: &self.violated_constraints,
            timestamp: &self.timestamp,
        };
        let json = serde_json::to_vec(&hashable).expect("access record serialization should not fail");
        blake3::hash(&json).to_hex().to_string()
    }

    /// Compute and attach the content hash. Consumes the record so a sealed
    /// record is only ever produced once.
    pub fn seal(mut self) -> Self {
        self.content_hash = Some(self.compute_hash());
        self
    }

    pub fn verify_integrity(&self) -> bool {
        match &self.content_hash {
            Some(stored) => stored == &self.compute_hash(),
            None => false,
        }
    }
}

// ── Inference rules ───────────────────────────────────────────────

pub const DEFAULT_RULE_PRIORITY: i64 = 100;

/// A condition → action pair evaluated after successful operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceRule {
    pub id: RuleId,
    pub name: String,
    pub agent_id: Option<AgentId>,
    pub subgraph_id: SubgraphId,
    /// Read-only query evaluated against the operation result.
    pub condition: String,
    /// Mutating query run when the condition holds.
    pub action: String,
    /// Lower runs first.
    pub priority: i64,
    pub description: String,
    pub enabled: bool,
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub average_execution_time_ms: f64,
    pub created_at: DateTime<Utc>,
}

/// Optional knobs for a new inference rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleOptions {
    pub priority: Option<i64>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

impl InferenceRule {
    pub fn new(
        subgraph: &Subgraph,
        name: &str,
        condition: &str,
        action: &str,
        options: RuleOptions,
    ) -> Self {
        Self {
            id: RuleId::new(),
            name: name.to_string(),
            agent_id: subgraph.agent_id.clone(),
            subgraph_id: subgraph.id.clone(),
            condition: condition.to_string(),
            action: action.to_string(),
            priority: options.priority.unwrap_or(DEFAULT_RULE_PRIORITY),
            description: options.description.unwrap_or_default(),
            enabled: options.enabled.unwrap_or(true),
            execution_count: 0,
            last_executed_at: None,
            average_execution_time_ms: 0.0,
            created_at: Utc::now(),
        }
    }

    /// Fold one execution into the statistics.
    pub fn record_execution(&mut self, elapsed_ms: f64, at: DateTime<Utc>) {
        let count = self.execution_count as f64;
        self.average_execution_time_ms =
            (self.average_execution_time_ms * count + elapsed_ms) / (count + 1.0);
        self.execution_count += 1;
        self.last_executed_at = Some(at);
    }
}
