// tests/scoring_properties.rs
//
// Property-style checks over the public scoring API: normalizer bounds and
// monotonicity, composite range, tier boundaries, stable ranking, filtering
// before scoring and the ROI divide-by-zero guard.

use rand::Rng;

use seo_opportunity_engine::normalize::{
    score_competition, score_difficulty, score_volume,
};
use seo_opportunity_engine::rank::rank_keywords;
use seo_opportunity_engine::scoring::{composite, roi};
use seo_opportunity_engine::{
    ComponentScores, KeywordFilter, KeywordRecord, MetricSet, OpportunityLevel,
    OpportunityScorer, ScoringWeights,
};

#[test]
fn non_positive_volume_scores_zero() {
    for v in [i64::MIN, -1_000_000, -1, 0] {
        assert_eq!(score_volume(v), 0.0, "volume {v}");
    }
}

#[test]
fn difficulty_score_is_exact_inverse() {
    for d in 0u8..=100 {
        let s = score_difficulty(Some(d));
        assert!((s + f64::from(d) - 100.0).abs() < 1e-9, "difficulty {d}");
    }
}

#[test]
fn normalizers_are_monotonic_on_random_inputs() {
    let mut rng = rand::rng();
    for _ in 0..1_000 {
        let a: i64 = rng.random_range(-10..10_000_000);
        let b: i64 = rng.random_range(-10..10_000_000);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        assert!(score_volume(lo) <= score_volume(hi));

        let c1: f64 = rng.random_range(0.0..=1.0);
        let c2: f64 = rng.random_range(0.0..=1.0);
        let (lo, hi) = if c1 <= c2 { (c1, c2) } else { (c2, c1) };
        assert!(score_competition(Some(lo)) >= score_competition(Some(hi)));

        let d1: u8 = rng.random_range(0..=100);
        let d2: u8 = rng.random_range(0..=100);
        let (lo, hi) = if d1 <= d2 { (d1, d2) } else { (d2, d1) };
        assert!(score_difficulty(Some(lo)) >= score_difficulty(Some(hi)));
    }
}

#[test]
fn composite_extremes_stay_in_range() {
    let w = ScoringWeights::default();
    let zero = ComponentScores::default();
    let full = ComponentScores {
        volume_score: 100.0,
        difficulty_score: 100.0,
        cpc_score: 100.0,
        competition_score: 100.0,
    };
    assert_eq!(composite(&zero, &w), 0.0);
    assert!((composite(&full, &w) - 100.0).abs() < 1e-9);
}

#[test]
fn tier_boundaries_are_exact() {
    assert_eq!(OpportunityLevel::from_score(80.0), OpportunityLevel::Excellent);
    assert_eq!(OpportunityLevel::from_score(79.999), OpportunityLevel::Good);
    assert_eq!(OpportunityLevel::from_score(60.0), OpportunityLevel::Good);
    assert_eq!(OpportunityLevel::from_score(40.0), OpportunityLevel::Moderate);
    assert_eq!(OpportunityLevel::from_score(39.9), OpportunityLevel::Low);
}

#[test]
fn equal_scores_keep_input_order() {
    let scorer = OpportunityScorer::new(ScoringWeights::default(), KeywordFilter::any()).unwrap();
    let same = MetricSet::new(1_000).difficulty(40).cpc(2.0).competition(0.3);
    let records = vec![
        KeywordRecord::new("first", same),
        KeywordRecord::new("better", MetricSet::new(50_000).difficulty(5)),
        KeywordRecord::new("second", same),
        KeywordRecord::new("third", same),
    ];
    let ranked = rank_keywords(scorer.score_batch(&records).scored);
    let ids: Vec<&str> = ranked.iter().map(|k| k.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["better", "first", "second", "third"]);
}

#[test]
fn filtered_records_are_absent_not_zeroed() {
    let scorer = OpportunityScorer::new(
        ScoringWeights::default(),
        KeywordFilter::any().min_volume(100),
    )
    .unwrap();
    let records = vec![
        KeywordRecord::new("tiny", MetricSet::new(50)),
        KeywordRecord::new("fine", MetricSet::new(500)),
    ];
    let report = scorer.score_and_rank(&records);
    assert_eq!(report.filtered_out, 1);
    assert_eq!(report.scored.len(), 1);
    assert!(report.scored.iter().all(|k| k.entity_id != "tiny"));
}

#[test]
fn roi_with_zero_difficulty_uses_one() {
    let r = roi(1_000, Some(2.5), Some(0));
    assert!(r.is_finite());
    assert!((r - 2_500.0).abs() < 1e-9);
}

#[test]
fn scorer_rejects_bad_weights_and_bounds() {
    assert!(ScoringWeights::new(0.5, 0.5, 0.5, 0.5).is_err());
    assert!(ScoringWeights::new(1.2, -0.2, 0.0, 0.0).is_err());
    let bad_filter = KeywordFilter::any().cpc_range(Some(5.0), Some(1.0));
    assert!(OpportunityScorer::new(ScoringWeights::default(), bad_filter).is_err());
}
