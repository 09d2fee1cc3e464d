// src/solver.rs
//
// Offline value-iteration solver for the cache/fetch MDP.
//
// State: AoI in 1..=max_aoi (index i <-> AoI i+1).
// Actions per state:
//   UseCache   -> pay cache_cost(aoi), AoI advances one step (saturating)
//   FetchFresh -> pay resource_cost,   AoI resets to 1 (index 0)
//
// Sweeps update V in place and stop once the max absolute change in a
// sweep drops below epsilon. The policy is then read off the converged V.
//
// Tie-break: FetchFresh only when v_fetch < v_cache strictly.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cost::{fetch_cost, CostShape};
use crate::error::SolverError;
use crate::types::{Action, Aoi};

/// Default iteration cap; hitting it is treated as a configuration error.
pub const DEFAULT_MAX_SWEEPS: u32 = 100_000;

/// Inputs to one solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    pub alpha: f64,
    pub beta: f64,
    pub resource_cost: f64,
    pub max_aoi: u32,
    /// Discount factor in (0, 1).
    pub gamma: f64,
    /// Bellman residual threshold.
    pub epsilon: f64,
    pub max_sweeps: u32,
}

impl SolverParams {
    pub fn validate(&self) -> Result<(), SolverError> {
        CostShape::new(self.alpha, self.beta).validate()?;

        if !(self.resource_cost > 0.0) || !self.resource_cost.is_finite() {
            return Err(SolverError::InvalidParameter {
                field: "resource_cost",
                value: self.resource_cost,
                reason: "must be finite and > 0",
            });
        }
        if self.max_aoi < 1 {
            return Err(SolverError::InvalidParameter {
                field: "max_aoi",
                value: self.max_aoi as f64,
                reason: "must be >= 1",
            });
        }
        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(SolverError::InvalidParameter {
                field: "gamma",
                value: self.gamma,
                reason: "must lie in (0, 1)",
            });
        }
        if !(self.epsilon > 0.0) || !self.epsilon.is_finite() {
            return Err(SolverError::InvalidParameter {
                field: "epsilon",
                value: self.epsilon,
                reason: "must be finite and > 0",
            });
        }
        if self.max_sweeps == 0 {
            return Err(SolverError::InvalidParameter {
                field: "max_sweeps",
                value: 0.0,
                reason: "must be >= 1",
            });
        }
        Ok(())
    }

    fn shape(&self) -> CostShape {
        CostShape::new(self.alpha, self.beta)
    }
}

/// Deterministic stationary policy over AoI states 1..=len.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    actions: Vec<Action>,
}

impl Policy {
    /// Build from an explicit action list. Returns `None` if empty.
    pub fn from_actions(actions: Vec<Action>) -> Option<Self> {
        if actions.is_empty() {
            None
        } else {
            Some(Self { actions })
        }
    }

    /// Constant policy, mostly useful for tests and baselines.
    pub fn uniform(action: Action, len: usize) -> Option<Self> {
        Self::from_actions(vec![action; len])
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Action for a given AoI. The index is clamped to the policy's range so a
    /// stale or out-of-range AoI still yields a defined action.
    pub fn action_for(&self, aoi: Aoi) -> Action {
        let idx = (aoi.saturating_sub(1) as usize).min(self.actions.len() - 1);
        self.actions[idx]
    }

    /// First index whose action is FetchFresh.
    pub fn threshold(&self) -> Option<usize> {
        self.actions.iter().position(|a| a.is_fetch())
    }

    /// True when every state at or after the first FetchFresh also fetches.
    pub fn is_threshold_shaped(&self) -> bool {
        match self.threshold() {
            None => true,
            Some(k) => self.actions[k..].iter().all(|a| a.is_fetch()),
        }
    }

    pub fn codes(&self) -> Vec<u8> {
        self.actions.iter().map(|a| a.code()).collect()
    }
}

impl Serialize for Policy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.actions.iter().map(|a| a.code()))
    }
}

impl<'de> Deserialize<'de> for Policy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let codes = Vec::<u8>::deserialize(deserializer)?;
        let actions = codes
            .iter()
            .map(|&c| {
                Action::from_code(c)
                    .ok_or_else(|| de::Error::custom(format!("invalid action code {c}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Policy::from_actions(actions).ok_or_else(|| de::Error::custom("empty policy"))
    }
}

/// Result of a converged solve.
#[derive(Debug, Clone)]
pub struct Solution {
    pub policy: Policy,
    /// Converged value function, index i <-> AoI i+1.
    pub values: Vec<f64>,
    pub sweeps: u32,
    /// Max absolute change in the final sweep.
    pub residual: f64,
}

#[inline]
fn action_values(params: &SolverParams, shape: &CostShape, v: &[f64], i: usize) -> (f64, f64) {
    let last = v.len() - 1;
    let v_cache = shape.cache_cost(i as Aoi + 1) + params.gamma * v[(i + 1).min(last)];
    let v_fetch = fetch_cost(params.resource_cost) + params.gamma * v[0];
    (v_cache, v_fetch)
}

/// Solve for the optimal threshold policy by value iteration.
pub fn solve(params: &SolverParams) -> Result<Solution, SolverError> {
    params.validate()?;

    let shape = params.shape();
    let n = params.max_aoi as usize;
    let mut v = vec![0.0_f64; n];
    let mut sweeps: u32 = 0;
    let mut residual = f64::INFINITY;

    while residual >= params.epsilon {
        if sweeps >= params.max_sweeps {
            return Err(SolverError::NotConverged {
                sweeps,
                residual,
                epsilon: params.epsilon,
            });
        }
        sweeps += 1;

        let mut delta = 0.0_f64;
        for i in 0..n {
            let (v_cache, v_fetch) = action_values(params, &shape, &v, i);
            let updated = v_cache.min(v_fetch);
            delta = delta.max((v[i] - updated).abs());
            v[i] = updated;
        }
        residual = delta;
    }

    let actions = (0..n)
        .map(|i| {
            let (v_cache, v_fetch) = action_values(params, &shape, &v, i);
            if v_fetch < v_cache {
                Action::FetchFresh
            } else {
                Action::UseCache
            }
        })
        .collect::<Vec<_>>();

    // n >= 1 is guaranteed by validate().
    let policy = Policy { actions };

    debug!(
        alpha = params.alpha,
        beta = params.beta,
        resource_cost = params.resource_cost,
        sweeps,
        residual,
        threshold = ?policy.threshold(),
        "value iteration converged"
    );

    Ok(Solution {
        policy,
        values: v,
        sweeps,
        residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(alpha: f64, beta: f64, resource_cost: f64, max_aoi: u32) -> SolverParams {
        SolverParams {
            alpha,
            beta,
            resource_cost,
            max_aoi,
            gamma: 0.95,
            epsilon: 1e-4,
            max_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }

    #[test]
    fn reference_scenario_threshold() {
        let sol = solve(&params(2.0, 1.0, 50.0, 10)).unwrap();
        assert!(sol.policy.is_threshold_shaped());
        assert_eq!(sol.policy.threshold(), Some(4));
        assert_eq!(sol.policy.len(), 10);
        assert!(sol.residual < 1e-4);
    }

    #[test]
    fn cheap_fetch_fetches_everywhere() {
        let sol = solve(&params(2.0, 1.0, 1.0, 10)).unwrap();
        assert_eq!(sol.policy.threshold(), Some(0));
        assert!(sol.policy.actions().iter().all(|a| a.is_fetch()));
    }

    #[test]
    fn expensive_fetch_never_fetches() {
        let sol = solve(&params(0.5, 0.01, 1000.0, 10)).unwrap();
        assert_eq!(sol.policy.threshold(), None);
        assert!(sol.policy.is_threshold_shaped());
    }

    #[test]
    fn single_state_solves() {
        let sol = solve(&params(2.0, 1.0, 50.0, 1)).unwrap();
        assert_eq!(sol.policy.len(), 1);
        // Both branches self-loop at AoI 1: cache costs 1, fetch costs 50.
        assert_eq!(sol.policy.action_for(1), Action::UseCache);
    }

    #[test]
    fn not_converged_is_an_error() {
        let mut p = params(2.0, 1.0, 50.0, 10);
        p.max_sweeps = 3;
        match solve(&p) {
            Err(SolverError::NotConverged { sweeps, .. }) => assert_eq!(sweeps, 3),
            other => panic!("expected NotConverged, got {other:?}"),
        }
    }

    #[test]
    fn action_for_clamps_out_of_range_aoi() {
        let policy = Policy::from_actions(vec![
            Action::UseCache,
            Action::UseCache,
            Action::FetchFresh,
        ])
        .unwrap();
        assert_eq!(policy.action_for(0), Action::UseCache);
        assert_eq!(policy.action_for(1), Action::UseCache);
        assert_eq!(policy.action_for(3), Action::FetchFresh);
        assert_eq!(policy.action_for(500), Action::FetchFresh);
    }

    #[test]
    fn policy_serde_uses_codes_and_rejects_bad_input() {
        let policy = Policy::from_actions(vec![Action::UseCache, Action::FetchFresh]).unwrap();
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, "[0,1]");
        assert_eq!(serde_json::from_str::<Policy>(&json).unwrap(), policy);

        assert!(serde_json::from_str::<Policy>("[0,2]").is_err());
        assert!(serde_json::from_str::<Policy>("[]").is_err());
    }

    #[test]
    fn non_threshold_policy_is_detected() {
        let p = Policy::from_actions(vec![Action::FetchFresh, Action::UseCache]).unwrap();
        assert!(!p.is_threshold_shaped());
    }
}
