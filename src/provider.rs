// src/provider.rs
//! Keyword data provider boundary.
//!
//! Providers hand us loosely-shaped JSON (flat fields or DataForSEO-style
//! nested `keyword_info` / `keyword_properties` objects). It is converted to
//! typed `KeywordRecord`s here, item by item, so the scoring core never sees
//! raw maps and one bad item never sinks a batch.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::competitive::SerpSnapshot;
use crate::model::{KeywordRecord, MetricSet, SearchIntent};

#[async_trait::async_trait]
pub trait KeywordDataProvider: Send + Sync {
    /// Metrics for the given keywords. Unknown keywords are simply absent.
    async fn keyword_metrics(&self, keywords: &[String]) -> Result<Vec<KeywordRecord>>;
    /// Current organic results for one keyword.
    async fn serp(&self, keyword: &str) -> Result<SerpSnapshot>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawKeywordInfo {
    #[serde(default)]
    pub search_volume: Option<f64>,
    #[serde(default)]
    pub cpc: Option<f64>,
    #[serde(default)]
    pub competition: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawKeywordProperties {
    #[serde(default)]
    pub keyword_difficulty: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawIntentInfo {
    #[serde(default)]
    pub main_intent: Option<String>,
}

/// One keyword item as a provider returns it. Flat fields win over nested ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawKeywordItem {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub search_volume: Option<f64>,
    #[serde(default)]
    pub keyword_difficulty: Option<f64>,
    #[serde(default)]
    pub cpc: Option<f64>,
    #[serde(default)]
    pub competition: Option<f64>,
    #[serde(default, alias = "search_intent")]
    pub intent: Option<String>,
    #[serde(default)]
    pub keyword_info: Option<RawKeywordInfo>,
    #[serde(default)]
    pub keyword_properties: Option<RawKeywordProperties>,
    #[serde(default)]
    pub search_intent_info: Option<RawIntentInfo>,
}

impl TryFrom<RawKeywordItem> for KeywordRecord {
    type Error = String;

    fn try_from(raw: RawKeywordItem) -> Result<Self, Self::Error> {
        let keyword = raw
            .keyword
            .as_deref()
            .map(clean_keyword)
            .filter(|k| !k.is_empty())
            .ok_or("missing keyword")?;

        let info = raw.keyword_info.unwrap_or_default();
        let volume = raw.search_volume.or(info.search_volume).unwrap_or(0.0);
        if !volume.is_finite() || volume < 0.0 {
            return Err(format!("`{keyword}`: bad search_volume {volume}"));
        }

        let difficulty = match raw
            .keyword_difficulty
            .or(raw.keyword_properties.and_then(|p| p.keyword_difficulty))
        {
            None => None,
            Some(d) if d.is_finite() && (0.0..=100.0).contains(&d) => Some(d.round() as u8),
            Some(d) => return Err(format!("`{keyword}`: bad keyword_difficulty {d}")),
        };

        let intent = raw
            .intent
            .or(raw.search_intent_info.and_then(|i| i.main_intent))
            .as_deref()
            .and_then(SearchIntent::parse);

        let metrics = MetricSet {
            search_volume: volume.round() as u64,
            keyword_difficulty: difficulty,
            cpc: raw.cpc.or(info.cpc),
            competition: raw.competition.or(info.competition),
        };
        metrics
            .validate()
            .map_err(|reason| format!("`{keyword}`: {reason}"))?;

        Ok(KeywordRecord {
            keyword,
            metrics,
            intent,
        })
    }
}

/// Convert provider items one by one. Returns the records and a skip count.
pub fn parse_keyword_items(items: &[serde_json::Value]) -> (Vec<KeywordRecord>, usize) {
    let mut out = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for item in items {
        let parsed = serde_json::from_value::<RawKeywordItem>(item.clone())
            .map_err(|e| e.to_string())
            .and_then(KeywordRecord::try_from);
        match parsed {
            Ok(rec) => out.push(rec),
            Err(reason) => {
                debug!(%reason, "skipping provider keyword item");
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, kept = out.len(), "provider returned malformed keyword items");
    }
    (out, skipped)
}

/// Decode HTML entities, collapse whitespace.
fn clean_keyword(s: &str) -> String {
    html_escape::decode_html_entities(s)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fixed dataset provider for local runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    keywords: HashMap<String, KeywordRecord>,
    serps: HashMap<String, SerpSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    keywords: Vec<serde_json::Value>,
    #[serde(default)]
    serps: Vec<SerpSnapshot>,
}

impl StaticProvider {
    pub fn new(keywords: Vec<KeywordRecord>, serps: Vec<SerpSnapshot>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| (k.keyword.to_lowercase(), k))
                .collect(),
            serps: serps
                .into_iter()
                .map(|s| (s.keyword.to_lowercase(), s))
                .collect(),
        }
    }

    /// Fixture shape: `{"keywords": [<provider items>], "serps": [<SerpSnapshot>]}`.
    pub fn from_json(s: &str) -> Result<Self> {
        let fx: Fixture = serde_json::from_str(s).context("parsing provider fixture")?;
        let (keywords, _skipped) = parse_keyword_items(&fx.keywords);
        Ok(Self::new(keywords, fx.serps))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading provider fixture from {}", path.display()))?;
        Self::from_json(&s)
    }
}

#[async_trait::async_trait]
impl KeywordDataProvider for StaticProvider {
    async fn keyword_metrics(&self, keywords: &[String]) -> Result<Vec<KeywordRecord>> {
        Ok(keywords
            .iter()
            .filter_map(|k| self.keywords.get(&k.trim().to_lowercase()).cloned())
            .collect())
    }

    async fn serp(&self, keyword: &str) -> Result<SerpSnapshot> {
        self.serps
            .get(&keyword.trim().to_lowercase())
            .cloned()
            .ok_or_else(|| anyhow!("no SERP data for `{keyword}`"))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
