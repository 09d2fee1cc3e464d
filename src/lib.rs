//! aoi_cache core library.
//!
//! Freshness-aware cache/fetch decisions driven by Age of Information.
//! Offline, parameters are classified into (volatility, criticality)
//! categories and one threshold policy per category is solved by value
//! iteration. Online, a decision controller tracks AoI per
//! (location, parameter) and reads the matching policy on every access.
//!
//! The binaries (`src/main.rs`, `src/bin/monte_carlo.rs`) are thin research
//! harnesses around these components.

pub mod catalog;
pub mod classify;
pub mod config;
pub mod controller;
pub mod cost;
pub mod error;
pub mod metrics;
pub mod solver;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod workload;

// --- Re-exports for ergonomic external use ---------------------------------

pub use catalog::{PolicyCatalog, PolicyLookup, SolverProvenance, CATALOG_SCHEMA_VERSION};

pub use classify::{
    categorize_scores, classify, derive_cost_shapes, scale_score, volatility_score,
    Classification, ParameterScore, ScoreTable,
};

pub use config::{
    resolve_effective_profile, Config, EffectiveProfile, EnergyConfig, FreshnessProfile,
    ProfileSource, ShapeConfig, SolverConfig, WorkloadConfig,
};

pub use controller::{choose_action, ControllerStats, Decision, DecisionController};

pub use cost::{cache_cost, fetch_cost, CostShape};

pub use error::{CatalogError, ScoreError, SolverError, StoreError, WorkloadError};

pub use metrics::{OnlineStats, RunTotals, SeriesBucket, SeriesSink, StatSummary};

pub use solver::{solve, Policy, Solution, SolverParams, DEFAULT_MAX_SWEEPS};

pub use store::{AoiStore, ConcurrentAoiStore};

pub use telemetry::{init_tracing, DecisionRecord, DecisionSink, JsonlSink, NoopSink, VecSink};

pub use types::{
    AccessEvent, Action, Aoi, Category, DecisionBasis, LocationKey, ParameterId, Tier,
    TimestampMs,
};

pub use workload::{LocationResolver, RecipeBook, SensorField, SyntheticWorkload};

// --- End-to-end: scores -> catalog -> replay --------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_scores(book: &RecipeBook) -> ScoreTable {
        let params = book.parameter_catalog();
        let n = params.len() as f64;
        ScoreTable::new(
            params
                .into_iter()
                .enumerate()
                .map(|(i, name)| ParameterScore {
                    name,
                    volatility: (i as f64 + 1.0) / n,
                    criticality: ((i * 7) % 16) as f64 / n,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn catalog_drives_a_full_replay() {
        let cfg = Config::default();
        let book = RecipeBook::default();
        let catalog = PolicyCatalog::build(&demo_scores(&book), &cfg).unwrap();

        let mut wl_cfg = cfg.workload.clone();
        wl_cfg.num_users = 10;
        wl_cfg.duration = 40;
        let workload = SyntheticWorkload::generate(&wl_cfg, &book, 42).unwrap();

        let mut ctl = DecisionController::new(&catalog, cfg.energy, SeriesSink::new());
        let stats = ctl.replay(&workload.events);

        assert_eq!(stats.decisions as usize, workload.decision_count());
        assert_eq!(stats.fetches + stats.cache_hits, stats.decisions);
        assert_eq!(stats.unclassified + stats.no_policy, 0);
        assert_eq!(stats.cold_starts as usize, ctl.store().len());

        let expected_energy = stats.fetches as f64 * cfg.energy.fetch_energy
            + stats.cache_hits as f64 * cfg.energy.cache_lookup_energy;
        assert!((stats.energy - expected_energy).abs() < 1e-6);

        let (_, series) = ctl.finish();
        let bucketed: u64 = series.iter().map(|(_, b)| b.decisions).sum();
        assert_eq!(bucketed, stats.decisions);
    }
}
