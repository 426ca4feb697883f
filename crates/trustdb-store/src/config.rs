use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{TrustDbError, TrustDbResult};
use crate::wal::SyncMode;

/// Configuration for opening a [`Database`](crate::Database).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustDbConfig {
    /// Commit log location. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// Maximum open connections; zero or negative means unlimited.
    pub max_open_conns: i64,
    /// Maximum idle connections retained; zero or negative retains none.
    pub max_idle_conns: i64,
    /// Flush strategy for the commit log.
    pub sync_mode: SyncMode,
    /// Deadline applied by [`TrustDbConfig::context`]; zero disables it.
    pub default_timeout_ms: u64,
}

impl Default for TrustDbConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_open_conns: 0,
            max_idle_conns: 2,
            sync_mode: SyncMode::EveryWrite,
            default_timeout_ms: 5_000,
        }
    }
}

impl TrustDbConfig {
    /// An in-memory configuration with default pool limits.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A durable configuration logging to `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn from_toml_str(s: &str) -> TrustDbResult<Self> {
        toml::from_str(s).map_err(|e| TrustDbError::Validation(format!("invalid config: {e}")))
    }

    pub fn from_toml_file(path: &Path) -> TrustDbResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> TrustDbResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TrustDbError::Validation(format!("config not serializable: {e}")))
    }

    /// A fresh context carrying the default timeout.
    pub fn context(&self) -> Context {
        match self.default_timeout_ms {
            0 => Context::background(),
            ms => Context::with_timeout(Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = TrustDbConfig::default();
        assert!(c.path.is_none());
        assert_eq!(c.max_open_conns, 0);
        assert_eq!(c.max_idle_conns, 2);
        assert_eq!(c.sync_mode, SyncMode::EveryWrite);
        assert_eq!(c.default_timeout_ms, 5_000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = TrustDbConfig::from_toml_str(
            r#"
            path = "/var/lib/trustdb/trust.log"
            max_open_conns = 8
            sync_mode = "os_default"
            "#,
        )
        .unwrap();
        assert_eq!(c.path, Some(PathBuf::from("/var/lib/trustdb/trust.log")));
        assert_eq!(c.max_open_conns, 8);
        assert_eq!(c.max_idle_conns, 2);
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
    }

    #[test]
    fn toml_survives_rewrite() {
        let c = TrustDbConfig {
            max_idle_conns: 4,
            default_timeout_ms: 0,
            ..TrustDbConfig::at("trust.log")
        };
        let text = c.to_toml_string().unwrap();
        assert_eq!(TrustDbConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn malformed_toml_is_a_validation_error() {
        let err = TrustDbConfig::from_toml_str("max_open_conns = \"many\"").unwrap_err();
        assert!(matches!(err, TrustDbError::Validation(_)));
    }

    #[tokio::test]
    async fn zero_timeout_means_no_deadline() {
        let c = TrustDbConfig {
            default_timeout_ms: 0,
            ..Default::default()
        };
        assert!(c.context().deadline().is_none());
        assert!(TrustDbConfig::default().context().deadline().is_some());
    }
}
