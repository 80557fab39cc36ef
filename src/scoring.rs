//! # Opportunity Scorer
//! Pure, testable logic that maps `KeywordRecord` → `ScoredKeyword`.
//! No I/O; safe to call from sync or async code and from many threads at once.
//!
//! Pipeline per batch: filter → validate → normalize → weighted composite →
//! tier → ROI. Filtered records are counted, invalid ones are skipped and
//! counted; neither aborts the batch.

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::filter::KeywordFilter;
use crate::model::{ComponentScores, KeywordRecord, OpportunityLevel, ScoredKeyword};
use crate::normalize::{clamp100, component_scores, MIDPOINT_SCORE};
use crate::rank::rank_keywords;
use crate::weights::ScoringWeights;

/// Weighted sum of component scores, in `[0, 100]` for valid weights.
pub fn composite(c: &ComponentScores, w: &ScoringWeights) -> f64 {
    let raw = c.volume_score * w.volume()
        + c.difficulty_score * w.difficulty()
        + c.cpc_score * w.cpc()
        + c.competition_score * w.competition();
    clamp100(raw)
}

/// `(volume * cpc) / max(difficulty, 1)`. Difficulty 0 is treated as 1;
/// unknown difficulty uses the same midpoint as the normalizer.
pub fn roi(volume: u64, cpc: Option<f64>, difficulty: Option<u8>) -> f64 {
    let cpc = match cpc {
        Some(c) if c.is_finite() && c > 0.0 => c,
        _ => return 0.0,
    };
    let d = difficulty.map(f64::from).unwrap_or(MIDPOINT_SCORE).max(1.0);
    (volume as f64 * cpc) / d
}

/// Result of scoring a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringReport {
    pub scored: Vec<ScoredKeyword>,
    /// Records excluded by the filter before scoring.
    pub filtered_out: usize,
    /// Records skipped because their metrics were malformed.
    pub skipped: usize,
}

impl ScoringReport {
    pub fn top(mut self, n: usize) -> Self {
        self.scored.truncate(n);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpportunityScorer {
    weights: ScoringWeights,
    filter: KeywordFilter,
}

impl OpportunityScorer {
    /// Fails fast on invalid weights or incoherent filter bounds.
    pub fn new(weights: ScoringWeights, filter: KeywordFilter) -> Result<Self, ConfigError> {
        let weights = weights.validated()?;
        filter.validate()?;
        Ok(Self { weights, filter })
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn filter(&self) -> &KeywordFilter {
        &self.filter
    }

    /// Same weights, different filter.
    pub fn with_filter(&self, filter: KeywordFilter) -> Result<Self, ConfigError> {
        Self::new(self.weights, filter)
    }

    /// Score a single record. No filtering, no validation.
    pub fn score(&self, rec: &KeywordRecord) -> ScoredKeyword {
        let components = component_scores(&rec.metrics);
        let composite_score = composite(&components, &self.weights);
        let m = &rec.metrics;
        ScoredKeyword {
            entity_id: rec.keyword.clone(),
            intent: rec.intent,
            metrics: *m,
            component_scores: components,
            composite_score,
            opportunity_level: OpportunityLevel::from_score(composite_score),
            roi: roi(m.search_volume, m.cpc, m.keyword_difficulty),
        }
    }

    /// Filter and score a batch, preserving input order.
    pub fn score_batch(&self, records: &[KeywordRecord]) -> ScoringReport {
        let mut report = ScoringReport {
            scored: Vec::with_capacity(records.len()),
            ..ScoringReport::default()
        };

        for rec in records {
            if !self.filter.matches(rec) {
                report.filtered_out += 1;
                continue;
            }
            if rec.keyword.trim().is_empty() {
                debug!("skipping keyword record with empty text");
                report.skipped += 1;
                continue;
            }
            if let Err(reason) = rec.metrics.validate() {
                debug!(keyword = %rec.keyword, %reason, "skipping malformed keyword record");
                report.skipped += 1;
                continue;
            }
            report.scored.push(self.score(rec));
        }

        counter!("opportunity_keywords_scored_total").increment(report.scored.len() as u64);
        counter!("opportunity_keywords_filtered_total").increment(report.filtered_out as u64);
        counter!("opportunity_keywords_skipped_total").increment(report.skipped as u64);
        debug!(
            scored = report.scored.len(),
            filtered_out = report.filtered_out,
            skipped = report.skipped,
            "scored keyword batch"
        );

        report
    }

    /// `score_batch` followed by a stable descending ranking.
    pub fn score_and_rank(&self, records: &[KeywordRecord]) -> ScoringReport {
        let mut report = self.score_batch(records);
        report.scored = rank_keywords(report.scored);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetricSet, SearchIntent};
    use rand::Rng;

    fn scorer() -> OpportunityScorer {
        OpportunityScorer::new(ScoringWeights::default(), KeywordFilter::any()).unwrap()
    }

    #[test]
    fn composite_uses_reference_weights() {
        let c = ComponentScores {
            volume_score: 40.0,
            difficulty_score: 70.0,
            cpc_score: 10.0,
            competition_score: 80.0,
        };
        // 40*.35 + 70*.30 + 10*.20 + 80*.15 = 14 + 21 + 2 + 12
        let s = composite(&c, &ScoringWeights::default());
        assert!((s - 49.0).abs() < 1e-9);
        assert_eq!(OpportunityLevel::from_score(s), OpportunityLevel::Moderate);
    }

    #[test]
    fn composite_stays_in_range_for_random_inputs() {
        let mut rng = rand::rng();
        for _ in 0..2_000 {
            let mut w = [0.0f64; 4];
            for x in w.iter_mut() {
                *x = rng.random_range(0.0..1.0);
            }
            let sum: f64 = w.iter().sum();
            if sum <= 0.0 {
                continue;
            }
            // last weight absorbs rounding so the sum is exactly 1 within tolerance
            let w0 = w[0] / sum;
            let w1 = w[1] / sum;
            let w2 = w[2] / sum;
            let w3 = 1.0 - w0 - w1 - w2;
            let Ok(weights) = ScoringWeights::new(w0, w1, w2, w3.max(0.0)) else {
                continue;
            };
            let c = ComponentScores {
                volume_score: rng.random_range(0.0..=100.0),
                difficulty_score: rng.random_range(0.0..=100.0),
                cpc_score: rng.random_range(0.0..=100.0),
                competition_score: rng.random_range(0.0..=100.0),
            };
            let s = composite(&c, &weights);
            assert!((0.0..=100.0).contains(&s), "composite out of range: {s}");
        }
    }

    #[test]
    fn roi_guards_zero_difficulty() {
        assert_eq!(roi(1000, Some(2.0), Some(0)), 2000.0);
        assert_eq!(roi(1000, Some(2.0), Some(1)), 2000.0);
        assert_eq!(roi(1000, Some(2.0), Some(40)), 50.0);
        assert_eq!(roi(1000, None, Some(40)), 0.0);
        assert_eq!(roi(1000, Some(2.0), None), 40.0);
    }

    #[test]
    fn filtered_records_are_absent_not_zero_scored() {
        let s = scorer()
            .with_filter(KeywordFilter::any().min_volume(100))
            .unwrap();
        let recs = vec![
            KeywordRecord::new("tiny", MetricSet::new(50)),
            KeywordRecord::new("big", MetricSet::new(5_000).difficulty(20)),
        ];
        let report = s.score_batch(&recs);
        assert_eq!(report.filtered_out, 1);
        assert_eq!(report.scored.len(), 1);
        assert!(report.scored.iter().all(|k| k.entity_id != "tiny"));
    }

    #[test]
    fn malformed_records_are_skipped_not_fatal() {
        let recs = vec![
            KeywordRecord::new("ok", MetricSet::new(100)),
            KeywordRecord::new("bad cpc", MetricSet::new(100).cpc(-1.0)),
            KeywordRecord::new("bad difficulty", MetricSet::new(100).difficulty(180)),
            KeywordRecord::new("   ", MetricSet::new(100)),
            KeywordRecord::new("also ok", MetricSet::new(10)),
        ];
        let report = scorer().score_batch(&recs);
        assert_eq!(report.skipped, 3);
        let ids: Vec<_> = report.scored.iter().map(|k| k.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "also ok"]);
    }

    #[test]
    fn score_carries_all_output_fields() {
        let rec = KeywordRecord::new(
            "buy trail shoes",
            MetricSet::new(10_000).difficulty(10).cpc(10.0).competition(0.2),
        )
        .with_intent(SearchIntent::Transactional);
        let k = scorer().score(&rec);
        // 40*.35 + 90*.30 + 20*.20 + 80*.15 = 14 + 27 + 4 + 12
        assert!((k.composite_score - 57.0).abs() < 1e-9);
        assert_eq!(k.opportunity_level, OpportunityLevel::Moderate);
        assert_eq!(k.roi, 10_000.0);
        assert_eq!(k.intent, Some(SearchIntent::Transactional));
    }

    #[test]
    fn score_and_rank_orders_descending() {
        let recs = vec![
            KeywordRecord::new("hard", MetricSet::new(100).difficulty(90)),
            KeywordRecord::new("easy", MetricSet::new(100).difficulty(5)),
            KeywordRecord::new("mid", MetricSet::new(100).difficulty(50)),
        ];
        let report = scorer().score_and_rank(&recs);
        let ids: Vec<_> = report.scored.iter().map(|k| k.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["easy", "mid", "hard"]);
    }

    #[test]
    fn constructor_rejects_bad_filter() {
        let bad = KeywordFilter::any().cpc_range(Some(5.0), Some(1.0));
        assert!(OpportunityScorer::new(ScoringWeights::default(), bad).is_err());
    }
}
