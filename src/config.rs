// src/config.rs
//
// Central configuration for the aoi_cache decision engine.
//
// Single source of truth for the offline solver (discount, convergence,
// AoI ceiling, fetch resource cost), the category cost-shape ranges, the
// online energy/latency accounting, and the synthetic workload used by
// the research harnesses.

use std::env;
use std::str::FromStr;

use tracing::{info, warn};

use crate::cost::CostShape;
use crate::error::ScoreError;
use crate::solver::{SolverParams, DEFAULT_MAX_SWEEPS};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Human-readable config / release version.
    pub version: &'static str,
    /// Offline value-iteration settings shared by every category.
    pub solver: SolverConfig,
    /// Target ranges for the per-category cost shapes.
    pub shaping: ShapeConfig,
    /// Online per-decision accounting.
    pub energy: EnergyConfig,
    /// Synthetic mobility / request workload.
    pub workload: WorkloadConfig,
}

/// Coarse freshness preset used by the CLI / research harness.
///
/// Presets only move the fetch resource cost; `Balanced` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessProfile {
    /// Cheap fetches: favours fresh data.
    Fresh,
    Balanced,
    /// Expensive fetches: favours the cache.
    Frugal,
}

impl FreshnessProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreshnessProfile::Fresh => "Fresh",
            FreshnessProfile::Balanced => "Balanced",
            FreshnessProfile::Frugal => "Frugal",
        }
    }

    /// Case-insensitive parse with short aliases.
    pub fn parse(s: &str) -> Option<FreshnessProfile> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fresh" | "f" => Some(FreshnessProfile::Fresh),
            "balanced" | "bal" | "b" => Some(FreshnessProfile::Balanced),
            "frugal" | "fru" | "eco" => Some(FreshnessProfile::Frugal),
            _ => None,
        }
    }

    fn resource_cost(&self) -> f64 {
        match self {
            FreshnessProfile::Fresh => 20.0,
            FreshnessProfile::Balanced => 50.0,
            FreshnessProfile::Frugal => 120.0,
        }
    }
}

/// Where the effective profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    Cli,
    Env,
    Default,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Cli => "cli",
            ProfileSource::Env => "env",
            ProfileSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveProfile {
    pub profile: FreshnessProfile,
    pub source: ProfileSource,
}

impl EffectiveProfile {
    pub fn log_startup(&self) {
        info!(
            profile = self.profile.as_str(),
            source = self.source.as_str(),
            "effective freshness profile"
        );
    }
}

/// Environment variable selecting the freshness profile.
pub const PROFILE_ENV: &str = "AOI_CACHE_PROFILE";

/// Resolve the profile: CLI > `AOI_CACHE_PROFILE` > Balanced.
pub fn resolve_effective_profile(cli_profile: Option<FreshnessProfile>) -> EffectiveProfile {
    if let Some(profile) = cli_profile {
        return EffectiveProfile {
            profile,
            source: ProfileSource::Cli,
        };
    }

    if let Ok(raw) = env::var(PROFILE_ENV) {
        if !raw.is_empty() {
            if let Some(profile) = FreshnessProfile::parse(&raw) {
                return EffectiveProfile {
                    profile,
                    source: ProfileSource::Env,
                };
            }
            warn!(value = %raw, "invalid AOI_CACHE_PROFILE; ignoring");
        }
    }

    EffectiveProfile {
        profile: FreshnessProfile::Balanced,
        source: ProfileSource::Default,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Fixed cost of one fresh fetch in the MDP.
    pub resource_cost: f64,
    /// AoI saturation ceiling; policies have this many states.
    pub max_aoi: u32,
    /// Discount factor in (0, 1).
    pub gamma: f64,
    /// Convergence threshold on the per-sweep max change.
    pub epsilon: f64,
    /// Sweeps allowed before the solve is reported as non-convergent.
    pub max_sweeps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeConfig {
    /// Target range for alpha (mapped from mean volatility).
    pub alpha_range: (f64, f64),
    /// Target range for beta (mapped from mean criticality).
    pub beta_range: (f64, f64),
}

impl ShapeConfig {
    pub fn validate(&self) -> Result<(), ScoreError> {
        let ranges = [
            ("alpha_range", self.alpha_range),
            ("beta_range", self.beta_range),
        ];
        for (field, (min, max)) in ranges {
            if !(min > 0.0) || !(max >= min) || !max.is_finite() {
                return Err(ScoreError::InvalidRange { field, min, max });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyConfig {
    /// Energy charged for one sensor fetch.
    pub fetch_energy: f64,
    /// Energy charged for one cache lookup.
    pub cache_lookup_energy: f64,
    /// Fixed fetch latency (ms).
    pub fetch_time_ms: f64,
    /// Fixed cache lookup latency (ms).
    pub cache_lookup_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadConfig {
    pub num_users: usize,
    pub num_sensors: usize,
    /// (min_x, max_x, min_y, max_y)
    pub area: (f64, f64, f64, f64),
    /// Number of discrete time steps.
    pub duration: u32,
    pub mean_speed: f64,
    /// Gauss-Markov memory in [0, 1].
    pub memory: f64,
    /// Inclusive range of per-user request intervals (steps).
    pub request_interval: (u32, u32),
    /// Inclusive range of decision queries per request.
    pub queries_per_request: (usize, usize),
    /// Decision query ids are drawn from 1..=max_query_id.
    pub max_query_id: u32,
}

impl Default for Config {
    fn default() -> Self {
        let solver = SolverConfig {
            resource_cost: FreshnessProfile::Balanced.resource_cost(),
            max_aoi: 100,
            gamma: 0.95,
            epsilon: 1e-4,
            max_sweeps: DEFAULT_MAX_SWEEPS,
        };

        let shaping = ShapeConfig {
            alpha_range: (1.1, 3.0),
            beta_range: (0.1, 1.5),
        };

        let energy = EnergyConfig {
            fetch_energy: 10.0,
            cache_lookup_energy: 0.2,
            fetch_time_ms: 50.0,
            cache_lookup_time_ms: 5.0,
        };

        // 450 roadside sensors on a 10 km square, 100 steps.
        let workload = WorkloadConfig {
            num_users: 50,
            num_sensors: 450,
            area: (0.0, 10_000.0, 0.0, 10_000.0),
            duration: 100,
            mean_speed: 15.0,
            memory: 0.75,
            request_interval: (4, 9),
            queries_per_request: (1, 5),
            max_query_id: 25,
        };

        Config {
            version: "v0.1.0-aoi-mdp",
            solver,
            shaping,
            energy,
            workload,
        }
    }
}

// --- Runtime config loader: profiles + env overrides -------------------------

impl Config {
    pub fn for_profile(profile: FreshnessProfile) -> Self {
        let mut cfg = Config::default();
        cfg.solver.resource_cost = profile.resource_cost();
        cfg
    }

    /// Build a Config from a profile, then apply environment overrides:
    ///
    ///   - AOI_CACHE_RESOURCE_COST   (f64)
    ///   - AOI_CACHE_MAX_AOI         (u32)
    ///   - AOI_CACHE_GAMMA           (f64)
    ///   - AOI_CACHE_EPSILON         (f64)
    ///   - AOI_CACHE_FETCH_ENERGY    (f64)
    ///   - AOI_CACHE_CACHE_ENERGY    (f64)
    ///
    /// Unparseable values are ignored with a warning. Parsed values are taken
    /// as-is; out-of-range solver values fail at solve time.
    pub fn from_env_or_profile(profile: FreshnessProfile) -> Self {
        let mut cfg = Config::for_profile(profile);

        override_from_env("AOI_CACHE_RESOURCE_COST", &mut cfg.solver.resource_cost);
        override_from_env("AOI_CACHE_MAX_AOI", &mut cfg.solver.max_aoi);
        override_from_env("AOI_CACHE_GAMMA", &mut cfg.solver.gamma);
        override_from_env("AOI_CACHE_EPSILON", &mut cfg.solver.epsilon);
        override_from_env("AOI_CACHE_FETCH_ENERGY", &mut cfg.energy.fetch_energy);
        override_from_env("AOI_CACHE_CACHE_ENERGY", &mut cfg.energy.cache_lookup_energy);

        cfg
    }

    /// Profile from `AOI_CACHE_PROFILE` (default Balanced), then env overrides.
    pub fn from_env_or_default() -> Self {
        Self::from_env_or_profile(resolve_effective_profile(None).profile)
    }

    /// Solver inputs for one category's cost shape.
    pub fn solver_params(&self, shape: CostShape) -> SolverParams {
        SolverParams {
            alpha: shape.alpha,
            beta: shape.beta,
            resource_cost: self.solver.resource_cost,
            max_aoi: self.solver.max_aoi,
            gamma: self.solver.gamma,
            epsilon: self.solver.epsilon,
            max_sweeps: self.solver.max_sweeps,
        }
    }
}

fn override_from_env<T>(var: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Debug,
{
    let Ok(raw) = env::var(var) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => {
            info!(var, value = ?v, "config override from environment");
            *slot = v;
        }
        Err(_) => {
            warn!(var, raw = %raw, default = ?slot, "could not parse override; using default");
        }
    }
}
