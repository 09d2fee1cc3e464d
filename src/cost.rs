// src/cost.rs
//
// Staleness cost model.
//
//   cache_cost(aoi) = beta * aoi^alpha      (alpha > 0, beta > 0)
//   fetch_cost      = resource_cost         (state independent)
//
// Only defined for aoi >= 1.

use serde::{Deserialize, Serialize};

use crate::error::SolverError;
use crate::types::Aoi;

/// Cost of serving a value of age `aoi` from cache.
#[inline]
pub fn cache_cost(aoi: Aoi, alpha: f64, beta: f64) -> f64 {
    beta * (aoi as f64).powf(alpha)
}

/// Cost of fetching a fresh reading.
#[inline]
pub fn fetch_cost(resource_cost: f64) -> f64 {
    resource_cost
}

/// Shape of a category's staleness cost curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostShape {
    /// Curvature; larger means staleness is penalised faster.
    pub alpha: f64,
    /// Scale.
    pub beta: f64,
}

impl CostShape {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    #[inline]
    pub fn cache_cost(&self, aoi: Aoi) -> f64 {
        cache_cost(aoi, self.alpha, self.beta)
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        // `!(x > 0)` also rejects NaN.
        if !(self.alpha > 0.0) || !self.alpha.is_finite() {
            return Err(SolverError::InvalidParameter {
                field: "alpha",
                value: self.alpha,
                reason: "must be finite and > 0",
            });
        }
        if !(self.beta > 0.0) || !self.beta.is_finite() {
            return Err(SolverError::InvalidParameter {
                field: "beta",
                value: self.beta,
                reason: "must be finite and > 0",
            });
        }
        Ok(())
    }
}
