//! Application configuration.
//!
//! Loaded from an optional TOML file; every section falls back to its
//! defaults.  `GEMINI_API_KEY` and `GEMINI_MODEL` override the file.

use std::path::Path;

use anyhow::Context;
use engine::CoordinatorConfig;
use nodes::gemini::GeminiConfig;
use queue::PoolConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    pub engine: CoordinatorConfig,
    pub pool: PoolConfig,
    pub gemini: GeminiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            engine: CoordinatorConfig::default(),
            pool: PoolConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config file {}", path.display()))?;
                Self::parse(&content)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|v| !v.is_empty()) {
            self.gemini.api_key = key;
        }
        if let Some(model) = lookup("GEMINI_MODEL").filter(|v| !v.is_empty()) {
            self.gemini.model = model;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.engine.execution_budget, Duration::from_secs(30 * 60));
        assert_eq!(config.gemini.model, nodes::gemini::DEFAULT_MODEL);
    }

    #[test]
    fn sections_override_defaults() {
        let config = AppConfig::parse(
            r#"
            log_level = "debug,engine=trace"

            [engine]
            execution_budget = 120

            [pool]
            workers = 2
            queue_capacity = 10

            [gemini]
            model = "gemini-pro"
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug,engine=trace");
        assert_eq!(config.engine.execution_budget, Duration::from_secs(120));
        assert_eq!(config.pool.queue_capacity, 10);
        assert_eq!(config.gemini.model, "gemini-pro");
        assert!(config.gemini.api_key.is_empty());
    }

    #[test]
    fn environment_wins_over_file() {
        let mut config = AppConfig::parse("[gemini]\napi_key = \"from-file\"").unwrap();
        let env = HashMap::from([("GEMINI_API_KEY", "from-env"), ("GEMINI_MODEL", "")]);
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.gemini.api_key, "from-env");
        assert_eq!(config.gemini.model, nodes::gemini::DEFAULT_MODEL);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(AppConfig::parse("[pool]\nworkers = \"many\"").is_err());
    }
}
