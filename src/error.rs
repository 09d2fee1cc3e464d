// src/error.rs
//
// Error types for the offline build and the persisted catalog.
//
// Online decisions never fail: unclassified parameters degrade to
// FetchFresh and are counted, not raised.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{CategoryKeyError, LocationKey};

/// Invalid solver configuration or failed convergence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("invalid solver parameter `{field}` = {value}: {reason}")]
    InvalidParameter {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error("value iteration did not converge after {sweeps} sweeps (residual {residual:e}, epsilon {epsilon:e})")]
    NotConverged {
        sweeps: u32,
        residual: f64,
        epsilon: f64,
    },
}

/// Invalid per-parameter score input.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("score table is empty")]
    Empty,
    #[error("duplicate parameter {0:?} in score table")]
    DuplicateParameter(String),
    #[error("parameter {name:?} has non-finite {axis} score {value}")]
    NonFinite {
        name: String,
        axis: &'static str,
        value: f64,
    },
    #[error("invalid target range `{field}`: [{min}, {max}]")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
    },
    #[error("failed to read score table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse score table YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Catalog build or load failure. A catalog is either complete or absent.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to solve policy for category {category}: {source}")]
    Solver {
        category: String,
        #[source]
        source: SolverError,
    },
    #[error(transparent)]
    Scores(#[from] ScoreError),
    #[error("catalog I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog checksum mismatch (stored {stored}, computed {computed})")]
    ChecksumMismatch { stored: String, computed: String },
    #[error("unsupported catalog schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },
    #[error(transparent)]
    CategoryKey(#[from] CategoryKeyError),
    #[error("policy for {category} has {found} actions, expected max_aoi = {expected}")]
    PolicyLength {
        category: String,
        found: usize,
        expected: usize,
    },
    #[error("invalid max_aoi {0} in catalog")]
    InvalidMaxAoi(u32),
}

/// Misuse of the AoI store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("cache hit recorded for unknown key (location {location}, parameter {parameter:?})")]
    MissingEntry {
        location: LocationKey,
        parameter: String,
    },
}

/// Invalid synthetic workload settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkloadError {
    #[error("invalid workload setting `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
    #[error("recipe book is empty")]
    EmptyRecipeBook,
}
