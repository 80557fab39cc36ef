//! Ranker: deterministic ordering of scored entities.
//!
//! - keywords: composite score descending; exact ties keep input order
//! - competitors: composite score descending, then more appearances, then
//!   lower (better) average position, then input order

use std::cmp::Ordering;

use crate::competitive::CompetitorStats;
use crate::model::ScoredKeyword;

/// Stable descending sort by an `f64` key. NaN keys sort last.
pub fn rank_by<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    // `sort_by` is stable, so equal keys keep their relative order.
    items.sort_by(|a, b| desc(key(a), key(b)));
    items
}

pub fn rank_keywords(items: Vec<ScoredKeyword>) -> Vec<ScoredKeyword> {
    rank_by(items, |k| k.composite_score)
}

pub fn rank_competitors(mut items: Vec<CompetitorStats>) -> Vec<CompetitorStats> {
    items.sort_by(|a, b| {
        desc(a.composite_score, b.composite_score)
            .then_with(|| b.appearance_count.cmp(&a.appearance_count))
            .then_with(|| asc(a.avg_position, b.avg_position))
    });
    items
}

/// First `n` entries of an already ranked list.
pub fn top_n<T>(mut ranked: Vec<T>, n: usize) -> Vec<T> {
    ranked.truncate(n);
    ranked
}

fn desc(a: f64, b: f64) -> Ordering {
    asc(b, a)
}

fn asc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}
