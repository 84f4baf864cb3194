//! warden-graph: Store collaborators for the boundary engine.
//!
//! This crate is the single point where the boundary engine touches the
//! shared property graph: arbitrary guarded query execution, persistence of
//! subgraph and rule definitions, and the append-only access log. Neo4j is
//! the production backend; the in-memory store serves embedded hosts and tests.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod repository;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::{ExecutedQuery, MemoryStore};
pub use store::{AccessLog, BindOutcome, GraphExecutor, SubgraphRepository};
