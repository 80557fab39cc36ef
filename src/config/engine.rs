// src/config/engine.rs
//! Engine configuration: `config/engine.toml` (or `$ENGINE_CONFIG_PATH`),
//! then a couple of env overrides. Every section is optional.
//!
//! ```toml
//! [weights]
//! volume = 0.35
//! difficulty = 0.30
//! cpc = 0.20
//! competition = 0.15
//!
//! [significance]
//! min_sample_size = 100
//! improvement_threshold_pct = 10.0
//!
//! [tasks]
//! ttl_secs = 3600
//! capacity = 1000
//!
//! [paths]
//! weights_file = "config/weights.json"
//! provider_fixture = "config/keywords.json"
//! ```

use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::abtest::SignificanceConfig;
use crate::error::ConfigError;
use crate::weights::{ScoringWeights, DEFAULT_WEIGHTS_PATH};

pub const DEFAULT_ENGINE_CONFIG_PATH: &str = "config/engine.toml";
pub const ENV_ENGINE_CONFIG_PATH: &str = "ENGINE_CONFIG_PATH";
pub const ENV_MIN_SAMPLE_SIZE: &str = "ENGINE_MIN_SAMPLE_SIZE";
pub const ENV_TASK_TTL_SECS: &str = "ENGINE_TASK_TTL_SECS";

fn default_ttl_secs() -> u64 {
    3600
}
fn default_capacity() -> usize {
    1000
}
fn default_weights_file() -> PathBuf {
    PathBuf::from(DEFAULT_WEIGHTS_PATH)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Hot-reloaded weights file; overrides `[weights]` once it exists.
    #[serde(default = "default_weights_file")]
    pub weights_file: PathBuf,
    /// JSON fixture for the static keyword provider.
    #[serde(default)]
    pub provider_fixture: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            weights_file: default_weights_file(),
            provider_fixture: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub significance: SignificanceConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

impl EngineConfig {
    /// Resolve the path, read the file (a missing default file means
    /// defaults), apply env overrides, validate.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = env::var(ENV_ENGINE_CONFIG_PATH).ok().map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE_CONFIG_PATH));

        let cfg = if explicit.is_none() && !path.exists() {
            info!(path = %path.display(), "no engine config file, using defaults");
            Self::default()
        } else {
            Self::from_file(&path)?
        };

        cfg.with_env_overrides()?.validated()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cfg = Self::from_toml_str(&data)?;
        info!(path = %path.display(), "engine config loaded");
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// `ENGINE_MIN_SAMPLE_SIZE` and `ENGINE_TASK_TTL_SECS`; unparsable values are errors.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(n) = env_u64(ENV_MIN_SAMPLE_SIZE)? {
            self.significance.min_sample_size = n;
        }
        if let Some(n) = env_u64(ENV_TASK_TTL_SECS)? {
            self.tasks.ttl_secs = n;
        }
        Ok(self)
    }

    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.weights = self.weights.validated()?;
        self.significance = self.significance.validated()?;
        if self.tasks.ttl_secs == 0 {
            return Err(ConfigError::InvalidThreshold {
                name: "tasks.ttl_secs",
                value: 0.0,
            });
        }
        if self.tasks.capacity == 0 {
            return Err(ConfigError::InvalidThreshold {
                name: "tasks.capacity",
                value: 0.0,
            });
        }
        Ok(self)
    }

    pub fn task_ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.tasks.ttl_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        chrono::Duration::seconds(secs)
    }
}

fn env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("{key}={v}: {e}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap().validated().unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.significance.min_sample_size, 100);
        assert_eq!(cfg.tasks.ttl_secs, 3600);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [significance]
            min_sample_size = 250

            [tasks]
            capacity = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.significance.min_sample_size, 250);
        assert_eq!(cfg.significance.improvement_threshold_pct, 10.0);
        assert_eq!(cfg.tasks.capacity, 10);
        assert_eq!(cfg.tasks.ttl_secs, 3600);
    }

    #[test]
    fn bad_weights_fail_validation() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [weights]
            volume = 0.5
            difficulty = 0.5
            cpc = 0.5
            competition = 0.5
            "#,
        )
        .unwrap();
        assert!(matches!(
            cfg.validated(),
            Err(ConfigError::InvalidWeights { .. })
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("[tasks\nttl_secs = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        env::set_var(ENV_MIN_SAMPLE_SIZE, "42");
        env::set_var(ENV_TASK_TTL_SECS, "60");
        let cfg = EngineConfig::default().with_env_overrides();
        env::remove_var(ENV_MIN_SAMPLE_SIZE);
        env::remove_var(ENV_TASK_TTL_SECS);
        let cfg = cfg.unwrap();
        assert_eq!(cfg.significance.min_sample_size, 42);
        assert_eq!(cfg.task_ttl(), chrono::Duration::seconds(60));
    }

    #[test]
    #[serial]
    fn unparsable_env_override_is_rejected() {
        env::set_var(ENV_TASK_TTL_SECS, "soon");
        let res = EngineConfig::default().with_env_overrides();
        env::remove_var(ENV_TASK_TTL_SECS);
        assert!(matches!(res, Err(ConfigError::Parse(_))));
    }

    #[test]
    #[serial]
    fn explicit_missing_path_is_an_io_error() {
        env::set_var(ENV_ENGINE_CONFIG_PATH, "/definitely/not/here/engine.toml");
        let res = EngineConfig::load();
        env::remove_var(ENV_ENGINE_CONFIG_PATH);
        assert!(matches!(res, Err(ConfigError::Io { .. })));
    }
}
