//! Niche analysis: roll a keyword set up into one market-level view.
//!
//! Averages are taken over the keywords that actually report a metric; a
//! niche where nobody reports CPC has `avg_cpc: None`, not 0.

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

use crate::model::{KeywordRecord, OpportunityLevel, ScoredKeyword};
use crate::rank::{rank_by, top_n};
use crate::scoring::OpportunityScorer;

pub const CLUSTER_SIMILARITY: f64 = 0.85;
const QUICK_WIN_MAX_DIFFICULTY: u8 = 30;
const QUICK_WIN_MIN_VOLUME: u64 = 100;
const TOP_OPPORTUNITIES: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyDistribution {
    /// difficulty < 30
    pub easy: usize,
    /// 30..=59
    pub medium: usize,
    /// >= 60
    pub hard: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCluster {
    pub seed: String,
    pub keywords: Vec<String>,
    pub total_volume: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicheReport {
    pub niche: String,
    pub keyword_count: usize,
    pub total_volume: u64,
    pub avg_volume: f64,
    pub avg_difficulty: Option<f64>,
    pub avg_cpc: Option<f64>,
    pub avg_competition: Option<f64>,
    /// Mean composite score of the scored keywords.
    pub opportunity_score: f64,
    pub opportunity_level: OpportunityLevel,
    pub difficulty_distribution: DifficultyDistribution,
    pub top_opportunities: Vec<ScoredKeyword>,
    pub quick_wins: Vec<ScoredKeyword>,
    pub clusters: Vec<TopicCluster>,
    pub filtered_out: usize,
    pub skipped: usize,
    pub recommendation: String,
}

pub fn analyze_niche(
    niche: &str,
    records: &[KeywordRecord],
    scorer: &OpportunityScorer,
) -> NicheReport {
    let report = scorer.score_and_rank(records);
    let scored = report.scored;
    let n = scored.len();

    let total_volume = scored
        .iter()
        .fold(0u64, |acc, k| acc.saturating_add(k.metrics.search_volume));
    let avg_volume = if n == 0 {
        0.0
    } else {
        total_volume as f64 / n as f64
    };
    let avg_difficulty = mean(scored.iter().filter_map(|k| k.metrics.keyword_difficulty.map(f64::from)));
    let avg_cpc = mean(scored.iter().filter_map(|k| k.metrics.cpc));
    let avg_competition = mean(scored.iter().filter_map(|k| k.metrics.competition));
    let opportunity_score = mean(scored.iter().map(|k| k.composite_score)).unwrap_or(0.0);
    let opportunity_level = OpportunityLevel::from_score(opportunity_score);

    let mut dist = DifficultyDistribution::default();
    for k in &scored {
        match k.metrics.keyword_difficulty {
            None => dist.unknown += 1,
            Some(d) if d < 30 => dist.easy += 1,
            Some(d) if d < 60 => dist.medium += 1,
            Some(_) => dist.hard += 1,
        }
    }

    // `scored` is already ranked, so filtering keeps the ranking.
    let quick_wins: Vec<ScoredKeyword> = scored
        .iter()
        .filter(|k| {
            k.metrics
                .keyword_difficulty
                .is_some_and(|d| d <= QUICK_WIN_MAX_DIFFICULTY)
                && k.metrics.search_volume >= QUICK_WIN_MIN_VOLUME
        })
        .cloned()
        .collect();

    let clusters = cluster_keywords(&scored, CLUSTER_SIMILARITY);
    let recommendation = recommend(opportunity_level, &dist, quick_wins.len(), n);

    NicheReport {
        niche: niche.to_string(),
        keyword_count: n,
        total_volume,
        avg_volume,
        avg_difficulty,
        avg_cpc,
        avg_competition,
        opportunity_score,
        opportunity_level,
        difficulty_distribution: dist,
        top_opportunities: top_n(scored, TOP_OPPORTUNITIES),
        quick_wins,
        clusters,
        filtered_out: report.filtered_out,
        skipped: report.skipped,
        recommendation,
    }
}

/// Greedy seed clustering: each keyword joins the first cluster whose seed is
/// at least `threshold` similar (Jaro-Winkler on normalized text), otherwise it
/// seeds a new one. Seeds are visited in rank order, clusters come out sorted
/// by total volume.
pub fn cluster_keywords(scored: &[ScoredKeyword], threshold: f64) -> Vec<TopicCluster> {
    let mut clusters: Vec<(String, TopicCluster)> = Vec::new();
    for k in scored {
        let norm = normalize_keyword(&k.entity_id);
        let volume = k.metrics.search_volume;
        match clusters
            .iter_mut()
            .find(|(seed_norm, _)| jaro_winkler(seed_norm, &norm) >= threshold)
        {
            Some((_, c)) => {
                c.keywords.push(k.entity_id.clone());
                c.total_volume = c.total_volume.saturating_add(volume);
            }
            None => clusters.push((
                norm,
                TopicCluster {
                    seed: k.entity_id.clone(),
                    keywords: vec![k.entity_id.clone()],
                    total_volume: volume,
                },
            )),
        }
    }
    rank_by(
        clusters.into_iter().map(|(_, c)| c).collect(),
        |c| c.total_volume as f64,
    )
}

/// Lowercase, decode HTML entities, keep alphanumerics, single spaces.
pub fn normalize_keyword(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_lowercase();
    decoded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn mean(it: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = it.fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn recommend(
    level: OpportunityLevel,
    dist: &DifficultyDistribution,
    quick_wins: usize,
    total: usize,
) -> String {
    if total == 0 {
        return "No keywords passed the filters; widen the filter or add seed keywords.".to_string();
    }
    let headline = match level {
        OpportunityLevel::Excellent => "Strong niche: prioritize content production now.",
        OpportunityLevel::Good => "Promising niche: worth a focused content plan.",
        OpportunityLevel::Moderate => "Mixed niche: target the easier keywords first.",
        OpportunityLevel::Low => "Weak niche: expect slow returns unless you have topical authority.",
    };
    let mut out = headline.to_string();
    if quick_wins > 0 {
        out.push_str(&format!(" {quick_wins} quick win(s) with low difficulty and real volume."));
    }
    if dist.hard * 2 > total {
        out.push_str(" Most keywords are hard; plan for link building.");
    }
    out
}
