//! Competitive analysis over SERP snapshots.
//!
//! For every domain seen in the supplied SERPs we collect how often it ranks,
//! where, and how much traffic that position is worth, then score and rank the
//! domains. The target domain is reported separately and never competes with
//! itself. Keywords where competitors hold the top 10 and the target doesn't
//! are reported as gaps.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::OpportunityLevel;
use crate::normalize::clamp100;
use crate::rank::{rank_by, rank_competitors};

// coverage / position / visibility
const W_COVERAGE: f64 = 0.50;
const W_POSITION: f64 = 0.30;
const W_VISIBILITY: f64 = 0.20;

/// Positions beyond this are ignored for gap detection.
const TOP_TEN: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerpResult {
    /// Bare domain or a full URL; normalized before aggregation.
    #[serde(alias = "url")]
    pub domain: String,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerpSnapshot {
    pub keyword: String,
    #[serde(default)]
    pub search_volume: u64,
    #[serde(default)]
    pub results: Vec<SerpResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorStats {
    pub domain: String,
    pub appearance_count: usize,
    pub avg_position: f64,
    pub best_position: u32,
    pub keywords: Vec<String>,
    /// Σ search_volume × expected CTR at the ranked position.
    pub estimated_traffic: f64,
    /// Estimated traffic as a share of the traffic a #1 ranking everywhere would get.
    pub visibility_score: f64,
    /// Percentage of all estimated traffic across the analysed SERPs.
    pub share_of_voice: f64,
    pub composite_score: f64,
    pub threat_level: OpportunityLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordGap {
    pub keyword: String,
    pub search_volume: u64,
    pub best_competitor: String,
    pub competitor_position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitiveReport {
    pub target_domain: String,
    pub keywords_analyzed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<CompetitorStats>,
    pub competitors: Vec<CompetitorStats>,
    pub keyword_gaps: Vec<KeywordGap>,
    /// SERP rows dropped because the domain or position was unusable.
    pub skipped_results: usize,
}

/// Expected organic CTR by position. Rough industry curve; beyond 20 → 0.
pub fn expected_ctr(position: u32) -> f64 {
    match position {
        0 => 0.0,
        1 => 0.28,
        2 => 0.15,
        3 => 0.11,
        4 => 0.08,
        5 => 0.07,
        6 => 0.05,
        7 => 0.04,
        8 | 9 => 0.03,
        10 => 0.02,
        11..=20 => 0.01,
        _ => 0.0,
    }
}

/// `https://www.Example.com:443/path?q` → `example.com`. Empty when nothing usable remains.
pub fn normalize_domain(raw: &str) -> String {
    static RE_HOST: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?:[a-z][a-z0-9+.\-]*://)?(?:[^@/]*@)?(?:www\.)?([^/:?#\s]+)")
            .expect("domain regex")
    });
    let lowered = raw.trim().to_ascii_lowercase();
    RE_HOST
        .captures(&lowered)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .unwrap_or_default()
}

#[derive(Default)]
struct Acc {
    positions: Vec<u32>,
    keywords: Vec<String>,
    traffic: f64,
}

pub fn analyze_competitors(target_domain: &str, serps: &[SerpSnapshot]) -> CompetitiveReport {
    let target = normalize_domain(target_domain);
    let mut order: Vec<String> = Vec::new();
    let mut accs: HashMap<String, Acc> = HashMap::new();
    let mut skipped = 0usize;
    let mut gaps = Vec::new();
    let mut max_traffic = 0.0f64;

    for serp in serps {
        max_traffic += serp.search_volume as f64 * expected_ctr(1);

        // Best position per domain within this SERP (a domain can rank twice).
        let mut best: Vec<(String, u32)> = Vec::new();
        for r in &serp.results {
            let domain = normalize_domain(&r.domain);
            if domain.is_empty() || r.position == 0 {
                skipped += 1;
                continue;
            }
            match best.iter_mut().find(|(d, _)| *d == domain) {
                Some((_, p)) => *p = (*p).min(r.position),
                None => best.push((domain, r.position)),
            }
        }

        let target_pos = best.iter().find(|(d, _)| *d == target).map(|(_, p)| *p);
        let best_competitor = best
            .iter()
            .filter(|(d, p)| *d != target && *p <= TOP_TEN)
            .min_by_key(|(_, p)| *p);
        if let Some((d, p)) = best_competitor {
            if target_pos.map_or(true, |tp| tp > TOP_TEN) {
                gaps.push(KeywordGap {
                    keyword: serp.keyword.clone(),
                    search_volume: serp.search_volume,
                    best_competitor: d.clone(),
                    competitor_position: *p,
                });
            }
        }

        for (domain, pos) in best {
            let acc = accs.entry(domain.clone()).or_insert_with(|| {
                order.push(domain.clone());
                Acc::default()
            });
            acc.positions.push(pos);
            acc.keywords.push(serp.keyword.clone());
            acc.traffic += serp.search_volume as f64 * expected_ctr(pos);
        }
    }

    let total_traffic: f64 = accs.values().map(|a| a.traffic).sum();
    let keywords_analyzed = serps.len();

    let mut target_stats = None;
    let mut competitors = Vec::with_capacity(order.len());
    for domain in order {
        let Some(acc) = accs.remove(&domain) else {
            continue;
        };
        let stats = build_stats(domain, acc, keywords_analyzed, max_traffic, total_traffic);
        if stats.domain == target {
            target_stats = Some(stats);
        } else {
            competitors.push(stats);
        }
    }

    debug!(
        target = %target,
        keywords = keywords_analyzed,
        competitors = competitors.len(),
        gaps = gaps.len(),
        skipped,
        "competitive analysis finished"
    );

    CompetitiveReport {
        target_domain: target,
        keywords_analyzed,
        target: target_stats,
        competitors: rank_competitors(competitors),
        keyword_gaps: rank_by(gaps, |g| g.search_volume as f64),
        skipped_results: skipped,
    }
}

fn build_stats(
    domain: String,
    acc: Acc,
    keywords_analyzed: usize,
    max_traffic: f64,
    total_traffic: f64,
) -> CompetitorStats {
    let n = acc.positions.len();
    let avg_position = if n == 0 {
        0.0
    } else {
        acc.positions.iter().map(|&p| f64::from(p)).sum::<f64>() / n as f64
    };
    let best_position = acc.positions.iter().copied().min().unwrap_or(0);

    let coverage = if keywords_analyzed == 0 {
        0.0
    } else {
        clamp100(100.0 * n as f64 / keywords_analyzed as f64)
    };
    // #1 → 100, #10 → 10, worse than #10 → 0
    let position_score = if n == 0 {
        0.0
    } else {
        clamp100(10.0 * (11.0 - avg_position))
    };
    let visibility_score = if max_traffic > 0.0 {
        clamp100(100.0 * acc.traffic / max_traffic)
    } else {
        0.0
    };
    let share_of_voice = if total_traffic > 0.0 {
        100.0 * acc.traffic / total_traffic
    } else {
        0.0
    };

    let composite_score = clamp100(
        coverage * W_COVERAGE + position_score * W_POSITION + visibility_score * W_VISIBILITY,
    );

    // unique keywords, first-seen order
    let mut seen = HashSet::new();
    let keywords = acc
        .keywords
        .into_iter()
        .filter(|k| seen.insert(k.clone()))
        .collect();

    CompetitorStats {
        domain,
        appearance_count: n,
        avg_position,
        best_position,
        keywords,
        estimated_traffic: acc.traffic,
        visibility_score,
        share_of_voice,
        composite_score,
        threat_level: OpportunityLevel::from_score(composite_score),
    }
}
