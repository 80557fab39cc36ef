//! Error types shared by the scoring core, the A/B test manager and the HTTP layer.
//!
//! Configuration problems fail fast at construction time. Data problems
//! (missing metrics, too few variants) are *not* errors: they are reported as
//! statuses in the output records.

use thiserror::Error;

/// Invalid configuration: weights, filter bounds, thresholds or config files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("weights must be finite and non-negative and sum to 1.0 (got sum {sum:.6})")]
    InvalidWeights { sum: f64 },

    #[error("invalid filter bounds: {0}")]
    InvalidFilter(String),

    #[error("invalid threshold `{name}`: {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("reading config from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(String),
}

/// Lifecycle errors of a single A/B test.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbTestError {
    #[error("a/b test `{0}` not found")]
    NotFound(String),

    #[error("cannot move a/b test from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("a/b test `{0}` is not running")]
    NotRunning(String),

    #[error("variant `{0}` is not part of this test")]
    UnknownVariant(String),

    #[error("invalid test definition: {0}")]
    InvalidDefinition(String),
}
