//! warden-core: Shared types, configuration, and error handling for the Warden
//! boundary engine.
//!
//! This crate provides the foundational types used across all Warden components:
//! - Subgraph definitions and their permission dimensions
//! - Audit records for every guarded access attempt
//! - Inference rules and their execution statistics
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::WardenConfig;
pub use error::CoreError;
pub use types::{
    AccessId, AgentId, CrudOperation, InferenceRule, IsolationLevel, Params, Record, RuleId,
    RuleOptions, Subgraph, SubgraphAccess, SubgraphDefinition, SubgraphId, WorkspaceId,
};
