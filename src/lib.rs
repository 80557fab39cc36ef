// src/lib.rs
// Public library surface for the binary, integration tests and reuse.

pub mod error;
pub mod model;

// Scoring core (pure, no I/O apart from the weights file watcher)
pub mod filter;
pub mod normalize;
pub mod rank;
pub mod scoring;
pub mod weights;

// Analyses built on the scorer
pub mod competitive;
pub mod niche;

// A/B testing
pub mod abtest;

// Service plumbing
pub mod api;
pub mod config;
pub mod metrics;
pub mod provider;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, router, ApiError, AppState};
pub use crate::error::{AbTestError, ConfigError};
pub use crate::filter::KeywordFilter;
pub use crate::model::{
    ComponentScores, KeywordRecord, MetricSet, OpportunityLevel, ScoredKeyword, SearchIntent,
};
pub use crate::scoring::{OpportunityScorer, ScoringReport};
pub use crate::weights::ScoringWeights;

