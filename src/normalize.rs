//! Metric normalizer: raw keyword metrics → bounded component scores in `[0, 100]`.
//!
//! Curves:
//! - volume: `10 * log10(volume)`, so 10 searches → 10 pts, 10k → 40 pts
//! - difficulty: `100 - difficulty` (absent → 50)
//! - cpc: `10 * log10(cpc * 10)`, so $1 → 10, $10 → 20, $100 → 30
//! - competition: `100 * (1 - competition)` (absent → 50)
//!
//! All functions are total. Anything that would land outside `[0, 100]` is clamped.

use crate::model::{ComponentScores, MetricSet};

/// Score used when difficulty or competition is unknown.
pub const MIDPOINT_SCORE: f64 = 50.0;

pub fn score_volume(volume: i64) -> f64 {
    if volume <= 0 {
        return 0.0;
    }
    clamp100(10.0 * (volume as f64).log10())
}

pub fn score_difficulty(difficulty: Option<u8>) -> f64 {
    match difficulty {
        None => MIDPOINT_SCORE,
        Some(d) => clamp100(100.0 - f64::from(d.min(100))),
    }
}

pub fn score_cpc(cpc: Option<f64>) -> f64 {
    match cpc {
        Some(c) if c.is_finite() && c > 0.0 => clamp100(10.0 * (c * 10.0).log10()),
        _ => 0.0,
    }
}

pub fn score_competition(competition: Option<f64>) -> f64 {
    match competition {
        Some(c) if c.is_finite() => clamp100(100.0 * (1.0 - c)),
        _ => MIDPOINT_SCORE,
    }
}

/// All four component scores for one metric set.
pub fn component_scores(m: &MetricSet) -> ComponentScores {
    ComponentScores {
        volume_score: score_volume(i64::try_from(m.search_volume).unwrap_or(i64::MAX)),
        difficulty_score: score_difficulty(m.keyword_difficulty),
        cpc_score: score_cpc(m.cpc),
        competition_score: score_competition(m.competition),
    }
}

#[inline]
pub(crate) fn clamp100(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 100.0)
    }
}
