//! model.rs: typed records exchanged between the provider boundary, the
//! scoring core and the API.
//!
//! Everything here is plain data. Scores live in `[0, 100]`; the raw metrics
//! are whatever the provider reported, validated by [`MetricSet::validate`]
//! before they reach the scorer.

use serde::{Deserialize, Serialize};

/// Raw per-keyword metrics as reported by a keyword data provider.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSet {
    #[serde(default)]
    pub search_volume: u64,
    /// 0..=100, absent when the provider has no estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_difficulty: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpc: Option<f64>,
    /// 0.0..=1.0 (paid competition index).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<f64>,
}

impl MetricSet {
    pub fn new(search_volume: u64) -> Self {
        Self {
            search_volume,
            ..Self::default()
        }
    }

    pub fn difficulty(mut self, d: u8) -> Self {
        self.keyword_difficulty = Some(d);
        self
    }

    pub fn cpc(mut self, cpc: f64) -> Self {
        self.cpc = Some(cpc);
        self
    }

    pub fn competition(mut self, c: f64) -> Self {
        self.competition = Some(c);
        self
    }

    /// Reject values outside the documented domains. The batch scorer skips
    /// records failing this check instead of scoring garbage.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(d) = self.keyword_difficulty {
            if d > 100 {
                return Err(format!("keyword_difficulty {d} outside 0..=100"));
            }
        }
        if let Some(cpc) = self.cpc {
            if !cpc.is_finite() || cpc < 0.0 {
                return Err(format!("cpc {cpc} must be a non-negative number"));
            }
        }
        if let Some(c) = self.competition {
            if !c.is_finite() || !(0.0..=1.0).contains(&c) {
                return Err(format!("competition {c} outside 0.0..=1.0"));
            }
        }
        Ok(())
    }
}

/// Search intent tag attached by the provider (or by a classifier upstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchIntent {
    Informational,
    Navigational,
    Commercial,
    Transactional,
}

impl SearchIntent {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "informational" => Some(Self::Informational),
            "navigational" => Some(Self::Navigational),
            "commercial" => Some(Self::Commercial),
            "transactional" => Some(Self::Transactional),
            _ => None,
        }
    }
}

/// A keyword plus its metrics; the entity scored by the opportunity scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub keyword: String,
    #[serde(flatten)]
    pub metrics: MetricSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<SearchIntent>,
}

impl KeywordRecord {
    pub fn new(keyword: impl Into<String>, metrics: MetricSet) -> Self {
        Self {
            keyword: keyword.into(),
            metrics,
            intent: None,
        }
    }

    pub fn with_intent(mut self, intent: SearchIntent) -> Self {
        self.intent = Some(intent);
        self
    }
}

/// Normalized component scores, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentScores {
    pub volume_score: f64,
    pub difficulty_score: f64,
    pub cpc_score: f64,
    pub competition_score: f64,
}

/// Ordinal tier derived from a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityLevel {
    Low,
    Moderate,
    Good,
    Excellent,
}

impl OpportunityLevel {
    /// Fixed, inclusive lower bounds: 80 / 60 / 40.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Excellent
        } else if score >= 60.0 {
            Self::Good
        } else if score >= 40.0 {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Moderate => "moderate",
            Self::Low => "low",
        }
    }
}

/// Output record of the opportunity scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredKeyword {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<SearchIntent>,
    pub metrics: MetricSet,
    pub component_scores: ComponentScores,
    pub composite_score: f64,
    pub opportunity_level: OpportunityLevel,
    pub roi: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn level_boundaries_are_inclusive() {
        assert_eq!(OpportunityLevel::from_score(80.0), OpportunityLevel::Excellent);
        assert_eq!(OpportunityLevel::from_score(79.999), OpportunityLevel::Good);
        assert_eq!(OpportunityLevel::from_score(60.0), OpportunityLevel::Good);
        assert_eq!(OpportunityLevel::from_score(40.0), OpportunityLevel::Moderate);
        assert_eq!(OpportunityLevel::from_score(39.999), OpportunityLevel::Low);
        assert_eq!(OpportunityLevel::from_score(0.0), OpportunityLevel::Low);
    }

    #[test]
    fn validate_rejects_out_of_domain_values() {
        assert!(MetricSet::new(10).difficulty(101).validate().is_err());
        assert!(MetricSet::new(10).cpc(-0.5).validate().is_err());
        assert!(MetricSet::new(10).cpc(f64::NAN).validate().is_err());
        assert!(MetricSet::new(10).competition(1.2).validate().is_err());
        assert!(MetricSet::new(10)
            .difficulty(100)
            .cpc(0.0)
            .competition(1.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn keyword_record_json_shape_is_flat() {
        let rec = KeywordRecord::new("running shoes", MetricSet::new(1200).difficulty(35).cpc(1.5))
            .with_intent(SearchIntent::Commercial);
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["keyword"], json!("running shoes"));
        assert_eq!(v["search_volume"], json!(1200));
        assert_eq!(v["keyword_difficulty"], json!(35));
        assert_eq!(v["intent"], json!("commercial"));
        assert!(v.get("competition").is_none());

        let back: KeywordRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn intent_parse_is_case_insensitive() {
        assert_eq!(SearchIntent::parse(" Transactional "), Some(SearchIntent::Transactional));
        assert_eq!(SearchIntent::parse("local"), None);
    }
}
