use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarbormindError, Result};

/// Top-level Harbormind configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub graphs: GraphsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum nodes visited per run. Bounds accidental cycles.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Hard ceiling on any single handler invocation, on top of the
    /// handler's own timeout.
    #[serde(default = "default_max_handler_secs")]
    pub max_handler_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_handler_secs: default_max_handler_secs(),
        }
    }
}

fn default_max_steps() -> usize {
    64
}

fn default_max_handler_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Path to the SQLite database. In-memory store when absent.
    #[serde(default)]
    pub db_path: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { db_path: None }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphsConfig {
    /// Directory of extra TOML graph definitions, loaded alongside the
    /// built-in catalog.
    #[serde(default)]
    pub dir: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HarbormindError::ConfigNotFound(
                path.display().to_string(),
            ));
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| HarbormindError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_on_empty_config() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.executor.max_steps, 64);
        assert_eq!(config.executor.max_handler_secs, 60);
        assert!(config.memory.db_path.is_none());
        assert!(config.graphs.dir.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [executor]
            max_steps = 8

            [memory]
            db_path = "/tmp/harbormind.db"

            [graphs]
            dir = "graphs"
            "#,
        )
        .unwrap();
        assert_eq!(config.executor.max_steps, 8);
        assert_eq!(config.executor.max_handler_secs, 60);
        assert_eq!(config.memory.db_path.as_deref(), Some("/tmp/harbormind.db"));
        assert_eq!(config.graphs.dir.as_deref(), Some("graphs"));
    }

    #[test]
    fn missing_file_is_distinguished() {
        let err = AppConfig::load(Path::new("/nonexistent/harbormind.toml")).unwrap_err();
        assert!(matches!(err, HarbormindError::ConfigNotFound(_)));
    }
}
