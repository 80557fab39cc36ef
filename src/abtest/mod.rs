//! A/B testing: significance analysis and test lifecycle management.

pub mod analysis;
pub mod manager;

pub use analysis::{
    aggregate_events, analyze, analyze_counts, analyze_events, AbAnalysis, AbEvent,
    AnalysisStatus, EventType, RawEvent, RawVariantResult, SignificanceConfig, VariantCounts,
    VariantMetrics,
};
pub use manager::{AbTest, AbTestManager, AnalysisRecord, TestStatus, Variant};
