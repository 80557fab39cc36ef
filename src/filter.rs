//! Pre-scoring filter. Records failing any bound are dropped *before* scoring,
//! they never show up in the output with a zero score.
//!
//! Missing metrics are resolved the same way the normalizer resolves them:
//! absent difficulty counts as 50, absent cpc counts as 0.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{KeywordRecord, SearchIntent};
use crate::normalize::MIDPOINT_SCORE;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_volume: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_difficulty: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cpc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cpc: Option<f64>,
    /// Empty or absent means "any intent".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_intents: Vec<SearchIntent>,
}

impl KeywordFilter {
    /// A filter that lets everything through.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn min_volume(mut self, v: u64) -> Self {
        self.min_volume = Some(v);
        self
    }

    pub fn max_difficulty(mut self, d: u8) -> Self {
        self.max_difficulty = Some(d);
        self
    }

    pub fn cpc_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_cpc = min;
        self.max_cpc = max;
        self
    }

    pub fn intents(mut self, intents: impl IntoIterator<Item = SearchIntent>) -> Self {
        self.allowed_intents = intents.into_iter().collect();
        self
    }

    /// Check the bounds are coherent. Called by the scorer constructor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(d) = self.max_difficulty {
            if d > 100 {
                return Err(ConfigError::InvalidFilter(format!(
                    "max_difficulty {d} outside 0..=100"
                )));
            }
        }
        for (name, v) in [("min_cpc", self.min_cpc), ("max_cpc", self.max_cpc)] {
            if let Some(x) = v {
                if !x.is_finite() || x < 0.0 {
                    return Err(ConfigError::InvalidFilter(format!(
                        "{name} {x} must be a non-negative number"
                    )));
                }
            }
        }
        if let (Some(lo), Some(hi)) = (self.min_cpc, self.max_cpc) {
            if lo > hi {
                return Err(ConfigError::InvalidFilter(format!(
                    "min_cpc {lo} greater than max_cpc {hi}"
                )));
            }
        }
        Ok(())
    }

    pub fn matches(&self, rec: &KeywordRecord) -> bool {
        let m = &rec.metrics;

        if let Some(min) = self.min_volume {
            if m.search_volume < min {
                return false;
            }
        }

        if let Some(max) = self.max_difficulty {
            let d = m
                .keyword_difficulty
                .map(f64::from)
                .unwrap_or(MIDPOINT_SCORE);
            if d > f64::from(max) {
                return false;
            }
        }

        let cpc = m.cpc.unwrap_or(0.0);
        if let Some(min) = self.min_cpc {
            if cpc < min {
                return false;
            }
        }
        if let Some(max) = self.max_cpc {
            if cpc > max {
                return false;
            }
        }

        if !self.allowed_intents.is_empty() {
            match rec.intent {
                Some(i) if self.allowed_intents.contains(&i) => {}
                _ => return false,
            }
        }

        true
    }
}
