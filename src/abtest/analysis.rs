//! A/B significance checker.
//!
//! This is the simplified heuristic the product has always used, NOT a
//! textbook hypothesis test:
//! - control = first variant, challenger = best CTR (first wins ties)
//! - improvement = (best_ctr - control_ctr) / control_ctr * 100 (0 if control_ctr is 0)
//! - confidence = 0.95 when |improvement| > 10%, else 0.85
//! - significant when |improvement| > 10% and confidence >= the configured threshold
//!
//! Bad records are skipped and counted, too few variants or too small samples
//! are reported as a status. Nothing here returns an error.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

pub const CONFIDENCE_HIGH: f64 = 0.95;
pub const CONFIDENCE_LOW: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceConfig {
    /// Minimum impressions per variant before significance is evaluated.
    pub min_sample_size: u64,
    /// Improvement (in percent) that must be exceeded.
    pub improvement_threshold_pct: f64,
    pub confidence_threshold: f64,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 100,
            improvement_threshold_pct: 10.0,
            confidence_threshold: 0.95,
        }
    }
}

impl SignificanceConfig {
    pub fn validated(self) -> Result<Self, ConfigError> {
        if !self.improvement_threshold_pct.is_finite() || self.improvement_threshold_pct < 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "improvement_threshold_pct",
                value: self.improvement_threshold_pct,
            });
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::InvalidThreshold {
                name: "confidence_threshold",
                value: self.confidence_threshold,
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Impression,
    Click,
    Conversion,
}

impl EventType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "impression" | "view" => Some(Self::Impression),
            "click" => Some(Self::Click),
            "conversion" => Some(Self::Conversion),
            _ => None,
        }
    }
}

/// Event as it arrives from the tracking layer; any field may be missing or junk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Validated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbEvent {
    pub variant_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<&RawEvent> for AbEvent {
    type Error = String;

    fn try_from(raw: &RawEvent) -> Result<Self, Self::Error> {
        let variant_id = raw
            .variant_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or("missing variant_id")?;
        let et = raw.event_type.as_deref().ok_or("missing event_type")?;
        let event_type = EventType::parse(et).ok_or_else(|| format!("unknown event_type `{et}`"))?;
        Ok(Self {
            variant_id: variant_id.to_string(),
            event_type,
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

/// Per-variant counts as supplied by a caller. Signed on purpose so that
/// negative junk can be detected and skipped instead of failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawVariantResult {
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub impressions: Option<i64>,
    #[serde(default)]
    pub clicks: Option<i64>,
    #[serde(default)]
    pub conversions: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantCounts {
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
}

impl VariantCounts {
    pub fn record(&mut self, et: EventType) {
        let slot = match et {
            EventType::Impression => &mut self.impressions,
            EventType::Click => &mut self.clicks,
            EventType::Conversion => &mut self.conversions,
        };
        *slot = slot.saturating_add(1);
    }

    /// Counters saturate at `u64::MAX`.
    fn add(&mut self, other: VariantCounts) {
        self.impressions = self.impressions.saturating_add(other.impressions);
        self.clicks = self.clicks.saturating_add(other.clicks);
        self.conversions = self.conversions.saturating_add(other.conversions);
    }
}

/// Counts plus derived rates. Rates are 0 when their denominator is 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantMetrics {
    pub variant_id: String,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub ctr: f64,
    pub conversion_rate: f64,
}

impl VariantMetrics {
    pub fn from_counts(variant_id: impl Into<String>, c: VariantCounts) -> Self {
        Self {
            variant_id: variant_id.into(),
            impressions: c.impressions,
            clicks: c.clicks,
            conversions: c.conversions,
            ctr: ratio(c.clicks, c.impressions),
            conversion_rate: ratio(c.conversions, c.clicks),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Analyzed,
    InsufficientSample,
    NeedMoreVariants,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzed => "analyzed",
            Self::InsufficientSample => "insufficient_sample",
            Self::NeedMoreVariants => "need_more_variants",
        }
    }
}

/// Callers must branch on `status` before reading the derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbAnalysis {
    pub status: AnalysisStatus,
    pub message: String,
    pub variant_metrics: Vec<VariantMetrics>,
    pub is_significant: bool,
    pub confidence_level: f64,
    pub winner_variant_id: Option<String>,
    /// CTR improvement of the best variant over control, in percent.
    pub improvement: f64,
    pub recommendation: String,
    pub skipped_records: usize,
}

/// Aggregate raw events into per-variant counts, in first-seen order.
/// Returns the counts and the number of skipped events.
pub fn aggregate_events(events: &[RawEvent]) -> (Vec<(String, VariantCounts)>, usize) {
    let mut out: Vec<(String, VariantCounts)> = Vec::new();
    let mut skipped = 0usize;
    for raw in events {
        match AbEvent::try_from(raw) {
            Ok(ev) => bump(&mut out, &ev.variant_id).record(ev.event_type),
            Err(reason) => {
                debug!(%reason, "skipping malformed a/b event");
                skipped += 1;
            }
        }
    }
    (out, skipped)
}

/// Validate caller-supplied per-variant results. Duplicated ids are summed.
pub fn aggregate_results(results: &[RawVariantResult]) -> (Vec<(String, VariantCounts)>, usize) {
    let mut out: Vec<(String, VariantCounts)> = Vec::new();
    let mut skipped = 0usize;
    for raw in results {
        match validate_result(raw) {
            Ok((id, counts)) => bump(&mut out, &id).add(counts),
            Err(reason) => {
                debug!(%reason, "skipping malformed variant result");
                skipped += 1;
            }
        }
    }
    (out, skipped)
}

fn validate_result(raw: &RawVariantResult) -> Result<(String, VariantCounts), String> {
    let id = raw
        .variant_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or("missing variant_id")?;
    let nonneg = |name: &str, v: Option<i64>| -> Result<u64, String> {
        let v = v.unwrap_or(0);
        u64::try_from(v).map_err(|_| format!("{name} is negative ({v})"))
    };
    let counts = VariantCounts {
        impressions: nonneg("impressions", raw.impressions)?,
        clicks: nonneg("clicks", raw.clicks)?,
        conversions: nonneg("conversions", raw.conversions)?,
    };
    if counts.clicks > counts.impressions {
        return Err(format!(
            "clicks ({}) exceed impressions ({})",
            counts.clicks, counts.impressions
        ));
    }
    Ok((id.to_string(), counts))
}

fn bump<'a>(out: &'a mut Vec<(String, VariantCounts)>, id: &str) -> &'a mut VariantCounts {
    let idx = match out.iter().position(|(v, _)| v == id) {
        Some(i) => i,
        None => {
            out.push((id.to_string(), VariantCounts::default()));
            out.len() - 1
        }
    };
    &mut out[idx].1
}

/// Analyze caller-supplied per-variant results.
pub fn analyze(results: &[RawVariantResult], cfg: &SignificanceConfig) -> AbAnalysis {
    let (counts, skipped) = aggregate_results(results);
    analyze_counts(&counts, skipped, cfg)
}

/// Analyze raw events.
pub fn analyze_events(events: &[RawEvent], cfg: &SignificanceConfig) -> AbAnalysis {
    let (counts, skipped) = aggregate_events(events);
    analyze_counts(&counts, skipped, cfg)
}

/// Core rule over already aggregated counts. The first entry is the control.
pub fn analyze_counts(
    counts: &[(String, VariantCounts)],
    skipped_records: usize,
    cfg: &SignificanceConfig,
) -> AbAnalysis {
    let variant_metrics: Vec<VariantMetrics> = counts
        .iter()
        .map(|(id, c)| VariantMetrics::from_counts(id.clone(), *c))
        .collect();

    let analysis = if variant_metrics.len() < 2 {
        not_evaluated(
            AnalysisStatus::NeedMoreVariants,
            "need at least 2 variants".to_string(),
            "Add a second variant before analyzing.".to_string(),
            variant_metrics,
            skipped_records,
        )
    } else if let Some(short) = variant_metrics
        .iter()
        .find(|v| v.impressions < cfg.min_sample_size)
    {
        let msg = format!(
            "variant `{}` has {} impressions, need at least {}",
            short.variant_id, short.impressions, cfg.min_sample_size
        );
        not_evaluated(
            AnalysisStatus::InsufficientSample,
            msg,
            "Keep the test running until every variant reaches the minimum sample size.".to_string(),
            variant_metrics,
            skipped_records,
        )
    } else {
        evaluate(variant_metrics, skipped_records, cfg)
    };

    counter!("abtest_analyses_total", "status" => analysis.status.as_str()).increment(1);
    analysis
}

fn evaluate(
    variant_metrics: Vec<VariantMetrics>,
    skipped_records: usize,
    cfg: &SignificanceConfig,
) -> AbAnalysis {
    let control = &variant_metrics[0];
    let mut best = control;
    for v in &variant_metrics[1..] {
        if v.ctr > best.ctr {
            best = v;
        }
    }

    let improvement = if control.ctr > 0.0 {
        (best.ctr - control.ctr) / control.ctr * 100.0
    } else {
        0.0
    };
    let clears_threshold = improvement.abs() > cfg.improvement_threshold_pct;
    let confidence_level = if clears_threshold {
        CONFIDENCE_HIGH
    } else {
        CONFIDENCE_LOW
    };
    let is_significant = clears_threshold && confidence_level >= cfg.confidence_threshold;
    let winner_variant_id = is_significant.then(|| best.variant_id.clone());

    let recommendation = match &winner_variant_id {
        Some(w) if *w != control.variant_id => format!(
            "Variant `{w}` beats control `{}` by {improvement:.1}% CTR; roll it out.",
            control.variant_id
        ),
        Some(w) => format!("Control `{w}` remains the best performer."),
        None => "No significant difference yet; keep the test running or end it as a draw."
            .to_string(),
    };

    AbAnalysis {
        status: AnalysisStatus::Analyzed,
        message: format!("analyzed {} variants", variant_metrics.len()),
        is_significant,
        confidence_level,
        winner_variant_id,
        improvement,
        recommendation,
        variant_metrics,
        skipped_records,
    }
}

fn not_evaluated(
    status: AnalysisStatus,
    message: String,
    recommendation: String,
    variant_metrics: Vec<VariantMetrics>,
    skipped_records: usize,
) -> AbAnalysis {
    AbAnalysis {
        status,
        message,
        variant_metrics,
        is_significant: false,
        confidence_level: 0.0,
        winner_variant_id: None,
        improvement: 0.0,
        recommendation,
        skipped_records,
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
