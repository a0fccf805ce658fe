//! Document store configuration (TOML).
//!
//! ```toml
//! path = "/var/lib/warpgrid/docs.redb"
//!
//! [retry]
//! max_attempts = 5
//! ```
//!
//! Omitting `path` selects the in-memory backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::redb_store::RedbDocStore;
use crate::txn::{RetryConfig, TxnRunner};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl StoreConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: StoreConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Open the configured backend.
    pub fn open(&self) -> StoreResult<RedbDocStore> {
        match &self.path {
            Some(path) => RedbDocStore::open(path),
            None => RedbDocStore::open_in_memory(),
        }
    }

    /// Open the configured backend and wrap it in a runner with the
    /// configured retry budget.
    pub fn runner(&self) -> StoreResult<TxnRunner<RedbDocStore>> {
        Ok(TxnRunner::new(Arc::new(self.open()?), self.retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Op;
    use crate::store::DocumentStore;
    use serde_json::json;

    #[test]
    fn test_parse_minimal() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config.path, None);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
path = "/tmp/docs.redb"

[retry]
max_attempts = 7
"#;
        let config = StoreConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.path, Some(PathBuf::from("/tmp/docs.redb")));
        assert_eq!(config.retry.max_attempts, 7);
    }

    #[test]
    fn test_single_attempt_budget_is_raised() {
        let config = StoreConfig::from_toml_str("[retry]\nmax_attempts = 1").unwrap();
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.attempts(), crate::txn::MIN_ATTEMPTS);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = StoreConfig {
            path: Some(PathBuf::from("docs.redb")),
            retry: RetryConfig::default().with_max_attempts(4),
        };
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("max_attempts = 4"));
        assert_eq!(StoreConfig::from_toml_str(&toml_str).unwrap(), config);
    }

    #[test]
    fn test_from_file_opens_disk_backend() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("docs.redb");
        let config_path = dir.path().join("store.toml");
        let config = StoreConfig {
            path: Some(db_path.clone()),
            retry: RetryConfig::default(),
        };
        std::fs::write(&config_path, config.to_toml_string().unwrap()).unwrap();

        let runner = StoreConfig::from_file(&config_path).unwrap().runner().unwrap();
        runner
            .run(|_| Ok(vec![Op::insert("things", "a", &json!({}))?]))
            .unwrap();

        assert!(db_path.exists());
        assert!(runner.store().fetch_one("things", "a").is_ok());
    }
}
