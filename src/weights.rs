//! Composite weights with validation and hot-reload from `config/weights.json`.
//!
//! JSON shape:
//! {
//!   "volume": 0.35,
//!   "difficulty": 0.30,
//!   "cpc": 0.20,
//!   "competition": 0.15
//! }
//!
//! Weights must sum to 1.0. A file that doesn't is rejected (logged) and the
//! last valid weights stay in effect; we never renormalize silently.

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::SystemTime,
};
use tracing::{info, warn};

use crate::error::ConfigError;

pub const DEFAULT_WEIGHTS_PATH: &str = "config/weights.json";
const SUM_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    volume: f64,
    difficulty: f64,
    cpc: f64,
    competition: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            volume: 0.35,
            difficulty: 0.30,
            cpc: 0.20,
            competition: 0.15,
        }
    }
}

impl ScoringWeights {
    /// Validating constructor: every weight finite and non-negative, sum == 1.0.
    pub fn new(volume: f64, difficulty: f64, cpc: f64, competition: f64) -> Result<Self, ConfigError> {
        Self {
            volume,
            difficulty,
            cpc,
            competition,
        }
        .validated()
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        let parts = [self.volume, self.difficulty, self.cpc, self.competition];
        let sum: f64 = parts.iter().sum();
        let parts_ok = parts.iter().all(|w| w.is_finite() && *w >= 0.0);
        if !parts_ok || (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(ConfigError::InvalidWeights { sum });
        }
        Ok(self)
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }
    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }
    pub fn cpc(&self) -> f64 {
        self.cpc
    }
    pub fn competition(&self) -> f64 {
        self.competition
    }
}

/// Hot-reload wrapper: reloads when the config file mtime changes.
#[derive(Debug)]
pub struct HotReloadWeights {
    path: PathBuf,
    inner: RwLock<State>,
}

#[derive(Debug)]
struct State {
    weights: ScoringWeights,
    last_modified: Option<SystemTime>,
}

impl HotReloadWeights {
    /// Create with a path (defaults to "config/weights.json" if `None`) and the
    /// weights to use until a valid file shows up.
    pub fn new(path: Option<&Path>, initial: ScoringWeights) -> Self {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS_PATH));
        Self {
            path,
            inner: RwLock::new(State {
                weights: initial,
                last_modified: None,
            }),
        }
    }

    /// Get the latest weights, reloading if the config file changed.
    pub fn current(&self) -> ScoringWeights {
        let mtime = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(t) => t,
            // No file: keep whatever we have.
            Err(_) => return self.read().weights,
        };

        {
            let guard = self.read();
            if guard.last_modified == Some(mtime) {
                return guard.weights;
            }
        }

        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Double-check in case another thread reloaded meanwhile.
        if guard.last_modified != Some(mtime) {
            // Remember the mtime even on failure so a broken file is reported once.
            guard.last_modified = Some(mtime);
            match load_weights_file(&self.path) {
                Ok(w) => {
                    info!(path = %self.path.display(), ?w, "scoring weights reloaded");
                    guard.weights = w;
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "rejected weights file, keeping previous weights");
                }
            }
        }
        guard.weights
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Load and validate weights directly (no caching). Public for tests/tools.
pub fn load_weights_file(path: &Path) -> Result<ScoringWeights, ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let w: ScoringWeights =
        serde_json::from_slice(&bytes).map_err(|e| ConfigError::Parse(e.to_string()))?;
    w.validated()
}
