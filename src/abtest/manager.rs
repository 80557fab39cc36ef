//! A/B test lifecycle: `draft → running → completed`, `cancelled` from draft or running.
//!
//! The manager owns test records in memory; the HTTP layer wraps it in a mutex.
//! `analyze` never changes a test's status, it only appends an analysis record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::analysis::{
    analyze_counts, AbAnalysis, EventType, RawEvent, SignificanceConfig, VariantCounts,
};
use crate::error::AbTestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Draft,
    Running,
    Completed,
    Cancelled,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: TestStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Draft, Self::Cancelled)
                | (Self::Running, Self::Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Title/meta/content under test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Variant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub at: DateTime<Utc>,
    pub analysis: AbAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTest {
    pub id: String,
    pub name: String,
    pub variants: Vec<Variant>,
    pub status: TestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_variant_id: Option<String>,
    /// Per-variant counters, same order as `variants`. Only ever incremented.
    pub counts: Vec<VariantCounts>,
    pub events_recorded: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analyses: Vec<AnalysisRecord>,
}

impl AbTest {
    fn variant_index(&self, variant_id: &str) -> Option<usize> {
        self.variants.iter().position(|v| v.id == variant_id)
    }

    fn transition(&mut self, next: TestStatus) -> Result<(), AbTestError> {
        if !self.status.can_transition_to(next) {
            return Err(AbTestError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        debug!(test = %self.id, from = self.status.as_str(), to = next.as_str(), "a/b test transition");
        self.status = next;
        Ok(())
    }

    fn labelled_counts(&self) -> Vec<(String, VariantCounts)> {
        self.variants
            .iter()
            .zip(self.counts.iter())
            .map(|(v, c)| (v.id.clone(), *c))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct AbTestManager {
    tests: HashMap<String, AbTest>,
    /// Creation order, for stable listing.
    order: Vec<String>,
    config: SignificanceConfig,
    next_id: u64,
}

impl AbTestManager {
    pub fn new(config: SignificanceConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SignificanceConfig {
        &self.config
    }

    pub fn create_test(
        &mut self,
        name: &str,
        variants: Vec<Variant>,
        now: DateTime<Utc>,
    ) -> Result<&AbTest, AbTestError> {
        if name.trim().is_empty() {
            return Err(AbTestError::InvalidDefinition("name must not be empty".into()));
        }
        if variants.len() < 2 {
            return Err(AbTestError::InvalidDefinition(
                "need at least 2 variants".into(),
            ));
        }
        for (i, v) in variants.iter().enumerate() {
            if v.id.trim().is_empty() {
                return Err(AbTestError::InvalidDefinition(format!(
                    "variant #{i} has an empty id"
                )));
            }
            if variants[..i].iter().any(|o| o.id == v.id) {
                return Err(AbTestError::InvalidDefinition(format!(
                    "duplicate variant id `{}`",
                    v.id
                )));
            }
        }

        self.next_id += 1;
        let id = format!("ab_{:06}", self.next_id);
        let test = AbTest {
            id: id.clone(),
            name: name.trim().to_string(),
            counts: vec![VariantCounts::default(); variants.len()],
            variants,
            status: TestStatus::Draft,
            created_at: now,
            started_at: None,
            ended_at: None,
            winner_variant_id: None,
            events_recorded: 0,
            analyses: Vec::new(),
        };
        info!(test = %id, name = %test.name, variants = test.variants.len(), "a/b test created");
        self.order.push(id.clone());
        Ok(&*self.tests.entry(id).or_insert(test))
    }

    pub fn get(&self, id: &str) -> Result<&AbTest, AbTestError> {
        self.tests
            .get(id)
            .ok_or_else(|| AbTestError::NotFound(id.to_string()))
    }

    /// All tests in creation order.
    pub fn list(&self) -> Vec<&AbTest> {
        self.order.iter().filter_map(|id| self.tests.get(id)).collect()
    }

    pub fn start(&mut self, id: &str, now: DateTime<Utc>) -> Result<&AbTest, AbTestError> {
        let test = self.get_mut(id)?;
        test.transition(TestStatus::Running)?;
        test.started_at = Some(now);
        Ok(&*test)
    }

    pub fn cancel(&mut self, id: &str, now: DateTime<Utc>) -> Result<&AbTest, AbTestError> {
        let test = self.get_mut(id)?;
        test.transition(TestStatus::Cancelled)?;
        test.ended_at = Some(now);
        Ok(&*test)
    }

    /// Final analysis, then `running → completed`. The winner is stored only
    /// when the analysis is significant.
    pub fn complete(&mut self, id: &str, now: DateTime<Utc>) -> Result<AbAnalysis, AbTestError> {
        let cfg = self.config;
        let test = self.get_mut(id)?;
        if !test.status.can_transition_to(TestStatus::Completed) {
            return Err(AbTestError::InvalidTransition {
                from: test.status.as_str().to_string(),
                to: TestStatus::Completed.as_str().to_string(),
            });
        }
        let analysis = analyze_counts(&test.labelled_counts(), 0, &cfg);
        test.transition(TestStatus::Completed)?;
        test.ended_at = Some(now);
        test.winner_variant_id = analysis.winner_variant_id.clone();
        test.analyses.push(AnalysisRecord {
            at: now,
            analysis: analysis.clone(),
        });
        info!(
            test = %id,
            winner = ?test.winner_variant_id,
            significant = analysis.is_significant,
            "a/b test completed"
        );
        Ok(analysis)
    }

    pub fn record_event(
        &mut self,
        id: &str,
        variant_id: &str,
        event_type: EventType,
    ) -> Result<(), AbTestError> {
        let test = self.get_mut(id)?;
        if test.status != TestStatus::Running {
            return Err(AbTestError::NotRunning(id.to_string()));
        }
        let idx = test
            .variant_index(variant_id)
            .ok_or_else(|| AbTestError::UnknownVariant(variant_id.to_string()))?;
        test.counts[idx].record(event_type);
        test.events_recorded = test.events_recorded.saturating_add(1);
        counter!("abtest_events_total", "event_type" => event_name(event_type)).increment(1);
        Ok(())
    }

    /// Record a batch of raw events. Malformed events and unknown variants are
    /// skipped; a test that isn't running rejects the whole batch.
    /// Returns `(accepted, skipped)`.
    pub fn record_events(
        &mut self,
        id: &str,
        events: &[RawEvent],
    ) -> Result<(usize, usize), AbTestError> {
        {
            let test = self.get(id)?;
            if test.status != TestStatus::Running {
                return Err(AbTestError::NotRunning(id.to_string()));
            }
        }
        let mut accepted = 0usize;
        let mut skipped = 0usize;
        for raw in events {
            let parsed = super::analysis::AbEvent::try_from(raw);
            match parsed {
                Ok(ev) => match self.record_event(id, &ev.variant_id, ev.event_type) {
                    Ok(()) => accepted += 1,
                    Err(e) => {
                        debug!(test = %id, error = %e, "skipping a/b event");
                        skipped += 1;
                    }
                },
                Err(reason) => {
                    debug!(test = %id, %reason, "skipping malformed a/b event");
                    skipped += 1;
                }
            }
        }
        Ok((accepted, skipped))
    }

    /// Analyze the current counters. Status is untouched; the analysis is
    /// appended to the test's history.
    pub fn analyze(&mut self, id: &str, now: DateTime<Utc>) -> Result<AbAnalysis, AbTestError> {
        let cfg = self.config;
        let test = self.get_mut(id)?;
        let analysis = analyze_counts(&test.labelled_counts(), 0, &cfg);
        test.analyses.push(AnalysisRecord {
            at: now,
            analysis: analysis.clone(),
        });
        Ok(analysis)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut AbTest, AbTestError> {
        self.tests
            .get_mut(id)
            .ok_or_else(|| AbTestError::NotFound(id.to_string()))
    }
}

fn event_name(et: EventType) -> &'static str {
    match et {
        EventType::Impression => "impression",
        EventType::Click => "click",
        EventType::Conversion => "conversion",
    }
}
