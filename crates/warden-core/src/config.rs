//! Configuration management for Warden services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (WARDEN__ prefix, `__` section separator)
//! 2. Config file (warden.toml)
//! 3. Defaults

use serde::Deserialize;

use crate::error::CoreError;

/// Top-level Warden configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    #[serde(default)]
    pub boundary: BoundarySettings,
}

/// Connection settings for the Neo4j store.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Engine behaviour knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundarySettings {
    /// Run inference rules after successful guarded operations.
    #[serde(default = "default_true")]
    pub rules_enabled: bool,

    /// Default number of audit records returned by history lookups.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "warden-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_history_limit() -> usize {
    100
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for BoundarySettings {
    fn default() -> Self {
        Self {
            rules_enabled: default_true(),
            history_limit: default_history_limit(),
        }
    }
}

impl WardenConfig {
    /// Load configuration from `{file_prefix}.toml` (optional) layered under
    /// `WARDEN__`-prefixed environment variables.
    pub fn load(file_prefix: &str) -> Result<Self, CoreError> {
        let cfg = ::config::Config::builder()
            .add_source(::config::File::with_name(file_prefix).required(false))
            .add_source(
                ::config::Environment::with_prefix("WARDEN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: WardenConfig = cfg.try_deserialize()?;
        tracing::debug!(uri = %loaded.neo4j.uri, rules_enabled = loaded.boundary.rules_enabled, "Configuration loaded");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WardenConfig::default();
        assert_eq!(config.neo4j.uri, "bolt://localhost:7687");
        assert_eq!(config.neo4j.max_connections, 16);
        assert!(config.boundary.rules_enabled);
        assert_eq!(config.boundary.history_limit, 100);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden-test.toml");
        std::fs::write(
            &path,
            "[neo4j]\nuri = \"bolt://graph.internal:7687\"\n\n[boundary]\nrules_enabled = false\n",
        )
        .unwrap();

        let prefix = dir.path().join("warden-test");
        let config = WardenConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.neo4j.uri, "bolt://graph.internal:7687");
        assert_eq!(config.neo4j.user, "neo4j");
        assert!(!config.boundary.rules_enabled);
        assert_eq!(config.boundary.history_limit, 100);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("does-not-exist");
        let config = WardenConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.neo4j.fetch_size, 256);
    }
}
