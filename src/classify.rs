// src/classify.rs
//
// Category aggregation: per-parameter (volatility, criticality) scores ->
// tertile tiers -> Category -> representative CostShape per category.
//
// Tertiles are pure rank-index cutoffs on the list sorted by score
// descending; equal scores are ordered by parameter name so the result
// never depends on input order.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ShapeConfig;
use crate::cost::CostShape;
use crate::error::ScoreError;
use crate::types::{Category, ParameterId, Tier};

/// Externally produced scores for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterScore {
    pub name: ParameterId,
    pub volatility: f64,
    pub criticality: f64,
}

/// Scores for the full parameter catalog, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    pub parameters: Vec<ParameterScore>,
}

impl ScoreTable {
    pub fn new(parameters: Vec<ParameterScore>) -> Result<Self, ScoreError> {
        let table = Self { parameters };
        table.validate()?;
        Ok(table)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ScoreError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|source| ScoreError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ScoreError> {
        let table: ScoreTable = serde_yaml::from_str(yaml)?;
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        if self.parameters.is_empty() {
            return Err(ScoreError::Empty);
        }
        let mut seen = HashSet::with_capacity(self.parameters.len());
        for p in &self.parameters {
            if !seen.insert(p.name.as_str()) {
                return Err(ScoreError::DuplicateParameter(p.name.clone()));
            }
            for (axis, value) in [("volatility", p.volatility), ("criticality", p.criticality)] {
                if !value.is_finite() {
                    return Err(ScoreError::NonFinite {
                        name: p.name.clone(),
                        axis,
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    fn volatility_scores(&self) -> Vec<(&str, f64)> {
        self.parameters
            .iter()
            .map(|p| (p.name.as_str(), p.volatility))
            .collect()
    }

    fn criticality_scores(&self) -> Vec<(&str, f64)> {
        self.parameters
            .iter()
            .map(|p| (p.name.as_str(), p.criticality))
            .collect()
    }
}

/// Rank by score descending (ties by name ascending) and cut into thirds.
///
/// Index `i` of `n` is High when `i < n/3`, Medium when `i < 2n/3`,
/// Low otherwise; evaluated as `3i < n` and `3i < 2n`.
pub fn categorize_scores(scores: &[(&str, f64)]) -> BTreeMap<ParameterId, Tier> {
    let mut ranked: Vec<(&str, f64)> = scores.to_vec();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let n = ranked.len();
    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (name, _))| {
            let tier = if 3 * i < n {
                Tier::High
            } else if 3 * i < 2 * n {
                Tier::Medium
            } else {
                Tier::Low
            };
            (name.to_string(), tier)
        })
        .collect()
}

/// Immutable Parameter -> Category assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Classification {
    assignments: BTreeMap<ParameterId, Category>,
}

impl Classification {
    pub fn from_assignments(assignments: BTreeMap<ParameterId, Category>) -> Self {
        Self { assignments }
    }

    pub fn category_of(&self, parameter: &str) -> Option<Category> {
        self.assignments.get(parameter).copied()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Category)> {
        self.assignments.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Members of each populated category, names sorted.
    pub fn groups(&self) -> BTreeMap<Category, Vec<&str>> {
        let mut out: BTreeMap<Category, Vec<&str>> = BTreeMap::new();
        for (name, cat) in &self.assignments {
            out.entry(*cat).or_default().push(name.as_str());
        }
        out
    }
}

/// Tertile-classify every parameter on both axes.
pub fn classify(table: &ScoreTable) -> Classification {
    let vol = categorize_scores(&table.volatility_scores());
    let crit = categorize_scores(&table.criticality_scores());

    let assignments = vol
        .into_iter()
        .filter_map(|(name, v)| crit.get(&name).map(|&c| (name, Category::new(v, c))))
        .collect();

    Classification { assignments }
}

/// Linear map from `[global_min, global_max]` into `[target_min, target_max]`.
/// A degenerate source range maps everything to `target_min`.
pub fn scale_score(
    value: f64,
    global_min: f64,
    global_max: f64,
    target_min: f64,
    target_max: f64,
) -> f64 {
    if global_max == global_min {
        return target_min;
    }
    target_min + (value - global_min) * (target_max - target_min) / (global_max - global_min)
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
        (lo.min(x), hi.max(x))
    })
}

/// Representative cost shape per populated category.
///
/// Group means are rescaled against the global min/max of the raw scores
/// over all parameters: volatility -> alpha range, criticality -> beta range.
pub fn derive_cost_shapes(
    table: &ScoreTable,
    classification: &Classification,
    shaping: &ShapeConfig,
) -> Result<BTreeMap<Category, CostShape>, ScoreError> {
    shaping.validate()?;

    let (vol_min, vol_max) = min_max(table.parameters.iter().map(|p| p.volatility));
    let (crit_min, crit_max) = min_max(table.parameters.iter().map(|p| p.criticality));

    let mut sums: BTreeMap<Category, (f64, f64, usize)> = BTreeMap::new();
    for p in &table.parameters {
        if let Some(cat) = classification.category_of(&p.name) {
            let e = sums.entry(cat).or_insert((0.0, 0.0, 0));
            e.0 += p.volatility;
            e.1 += p.criticality;
            e.2 += 1;
        }
    }

    let (alpha_lo, alpha_hi) = shaping.alpha_range;
    let (beta_lo, beta_hi) = shaping.beta_range;

    Ok(sums
        .into_iter()
        .map(|(cat, (vol_sum, crit_sum, count))| {
            let n = count as f64;
            let alpha = scale_score(vol_sum / n, vol_min, vol_max, alpha_lo, alpha_hi);
            let beta = scale_score(crit_sum / n, crit_min, crit_max, beta_lo, beta_hi);
            (cat, CostShape::new(alpha, beta))
        })
        .collect())
}

/// Mean absolute percentage change of a time series.
///
/// Fewer than two samples score 0. A tiny constant keeps zero-valued
/// samples from dividing by zero.
pub fn volatility_score(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let total: f64 = series
        .windows(2)
        .map(|w| ((w[1] - w[0]) / (w[0] + 1e-9)).abs())
        .sum();
    total / (series.len() - 1) as f64
}
