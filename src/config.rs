use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LONG_REVIEW_CHARS: i64 = 300;

/// Engine tuning knobs (`[engine]`-style TOML file, all keys optional).
///
/// A missing config file yields the defaults; unknown keys are ignored so
/// the file can be shared with the surrounding application's own settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of ledger entries shown on the achievement page.
    pub history_limit: i64,
    /// Upper bound for each individual store query, in seconds.
    pub query_timeout_secs: u64,
    /// Queries slower than this are logged at WARN. 0 disables the check.
    pub slow_query_ms: u64,
    /// Review length (chars) at which a review counts as "long".
    pub long_review_chars: i64,
    /// Entry statuses counted as completed-like by the stats aggregator.
    pub completed_statuses: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            slow_query_ms: 0,
            long_review_chars: DEFAULT_LONG_REVIEW_CHARS,
            completed_statuses: vec!["completed".to_string(), "replayed".to_string()],
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Parsing engine config")
    }

    /// Load config from `path`, or defaults when the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("Reading engine config at {}", p.display()))?;
                Self::from_toml_str(&raw)
            }
            Some(p) => {
                debug!(path = %p.display(), "engine config file missing; using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.query_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.history_limit, 20);
        assert_eq!(cfg.long_review_chars, 300);
        assert!(cfg.completed_statuses.contains(&"completed".to_string()));
    }

    #[test]
    fn partial_toml_falls_back_per_field() {
        let cfg = EngineConfig::from_toml_str("history_limit = 5").unwrap();
        assert_eq!(cfg.history_limit, 5);
        assert_eq!(cfg.query_timeout_secs, 30);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = EngineConfig::load(Some(Path::new("/nonexistent/engine.toml"))).unwrap();
        assert_eq!(cfg.history_limit, 20);
    }
}
