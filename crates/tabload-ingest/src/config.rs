//! Ingestion configuration
//!
//! One explicit [`IngestConfig`] value is resolved at startup and handed to the
//! pipeline. Layers, lowest precedence first: defaults, an optional TOML file,
//! `.env` / process environment, then command-line flags (applied by the CLI).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cleaner::CleaningPolicy;
use crate::error::{IngestError, Result};

// ============================================================================
// Defaults
// ============================================================================

/// Default destination table name.
pub const DEFAULT_TABLE_NAME: &str = "analytics_data";

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Default SQLite busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Prefix of every environment variable read by [`IngestConfig::merge_env`].
pub const ENV_PREFIX: &str = "TABLOAD_";

/// Resolved configuration for one ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Delimited-text source file (required)
    pub source_path: PathBuf,
    /// SQLite database file (required)
    pub sink_path: PathBuf,
    /// Destination table, dropped and recreated by the first batch
    pub table_name: String,
    /// Records per batch; must be at least 1
    pub batch_size: usize,
    /// Take over a table still flagged as loading by another run
    pub force: bool,
    /// How long the sink driver waits on a locked database
    pub busy_timeout_ms: u64,
    /// Cleaning rules applied to every batch
    pub policy: CleaningPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::new(),
            sink_path: PathBuf::new(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            force: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            policy: CleaningPolicy::default(),
        }
    }
}

impl IngestConfig {
    pub fn new(source_path: impl Into<PathBuf>, sink_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            sink_path: sink_path.into(),
            ..Self::default()
        }
    }

    /// Load defaults, then the optional TOML file, then the environment
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        dotenvy::dotenv().ok();
        config.merge_env()
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| IngestError::config(format!("'{}': {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `TABLOAD_*` overrides from the process environment
    pub fn merge_env(self) -> Result<Self> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Apply `TABLOAD_*` overrides from an arbitrary variable lookup
    pub fn merge_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(path) = var("SOURCE_PATH") {
            self.source_path = PathBuf::from(path);
        }

        if let Some(path) = var("SINK_PATH") {
            self.sink_path = PathBuf::from(path);
        }

        if let Some(table) = var("TABLE_NAME") {
            self.table_name = table;
        }

        if let Some(size) = var("BATCH_SIZE") {
            self.batch_size = size.trim().parse().map_err(|_| {
                IngestError::config(format!("{}BATCH_SIZE '{}' is not a number", ENV_PREFIX, size))
            })?;
        }

        if let Some(timeout) = var("BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = timeout.trim().parse().map_err(|_| {
                IngestError::config(format!(
                    "{}BUSY_TIMEOUT_MS '{}' is not a number",
                    ENV_PREFIX, timeout
                ))
            })?;
        }

        Ok(self)
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_policy(mut self, policy: CleaningPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.source_path.as_os_str().is_empty() {
            return Err(IngestError::config("source_path is required"));
        }

        if self.sink_path.as_os_str().is_empty() {
            return Err(IngestError::config("sink_path is required"));
        }

        if self.table_name.trim().is_empty() {
            return Err(IngestError::config("table_name cannot be empty"));
        }

        if self.table_name.starts_with("_tabload") {
            return Err(IngestError::config(format!(
                "table_name '{}' is reserved for loader bookkeeping",
                self.table_name
            )));
        }

        if self.batch_size == 0 {
            return Err(IngestError::config("batch_size must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cleaner::CleaningRule;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.table_name, "analytics_data");
        assert_eq!(config.batch_size, 100_000);
        assert!(!config.force);
        assert!(config.policy.rules.is_empty());
    }

    #[test]
    fn test_validate_requires_paths() {
        assert!(IngestConfig::default().validate().is_err());
        assert!(IngestConfig::new("data.csv", "out.db").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = IngestConfig::new("data.csv", "out.db").with_batch_size(0);
        assert!(matches!(config.validate(), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_reserved_table() {
        let config = IngestConfig::new("data.csv", "out.db").with_table_name("_tabload_runs");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_with_policy() {
        let config = IngestConfig::from_toml_str(
            r#"
            source_path = "data/raw/data.csv"
            sink_path = "data/processed/analytics.db"
            batch_size = 500

            [[policy.rules]]
            rule = "rename"
            from = "old_column_1"
            to = "new_column_1"

            [[policy.rules]]
            rule = "impute_constant"
            column = "new_column_2"
            "#,
        )
        .unwrap();

        assert_eq!(config.source_path, PathBuf::from("data/raw/data.csv"));
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.table_name, DEFAULT_TABLE_NAME);
        assert_eq!(config.policy.rules.len(), 2);
        assert_eq!(
            config.policy.rules[1],
            CleaningRule::ImputeConstant {
                column: "new_column_2".to_string(),
                value: "Unknown".to_string()
            }
        );
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        assert!(IngestConfig::from_toml_str("chunk_size = 10").is_err());
    }

    #[test]
    fn test_merge_vars_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("TABLOAD_TABLE_NAME", "sales"),
            ("TABLOAD_BATCH_SIZE", "250"),
        ]
        .into_iter()
        .collect();

        let config = IngestConfig::new("a.csv", "b.db")
            .merge_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.table_name, "sales");
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.source_path, PathBuf::from("a.csv"));
    }

    #[test]
    fn test_merge_vars_rejects_bad_batch_size() {
        let result = IngestConfig::default().merge_vars(|key| {
            (key == "TABLOAD_BATCH_SIZE").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(IngestError::Config(_))));
    }
}
