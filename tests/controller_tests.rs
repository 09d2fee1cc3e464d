// tests/controller_tests.rs
//
// Decision controller against solved and hand-built catalogs: cold start,
// aging, saturation, reset on fetch and the two fallback paths.

use std::collections::BTreeMap;

use aoi_cache::catalog::PolicyCatalog;
use aoi_cache::classify::Classification;
use aoi_cache::config::Config;
use aoi_cache::controller::DecisionController;
use aoi_cache::metrics::{RunTotals, SeriesSink};
use aoi_cache::solver::{solve, Policy, SolverParams, DEFAULT_MAX_SWEEPS};
use aoi_cache::telemetry::VecSink;
use aoi_cache::types::{AccessEvent, Action, Category, DecisionBasis, Tier};

const FAST: Category = Category {
    volatility: Tier::High,
    criticality: Tier::High,
};
const SLOW: Category = Category {
    volatility: Tier::Low,
    criticality: Tier::Low,
};
const ORPHAN: Category = Category {
    volatility: Tier::Medium,
    criticality: Tier::Low,
};

/// "speed" follows the reference policy (cache for AoI 1..=4, fetch from 5),
/// "temp" always caches, "moisture" is classified but unsolved.
fn catalog(max_aoi: u32) -> PolicyCatalog {
    let solved = solve(&SolverParams {
        alpha: 2.0,
        beta: 1.0,
        resource_cost: 50.0,
        max_aoi,
        gamma: 0.95,
        epsilon: 1e-4,
        max_sweeps: DEFAULT_MAX_SWEEPS,
    })
    .unwrap();

    let mut policies = BTreeMap::new();
    policies.insert(FAST, solved.policy);
    policies.insert(SLOW, Policy::uniform(Action::UseCache, max_aoi as usize).unwrap());

    let mut assignments = BTreeMap::new();
    assignments.insert("speed".to_string(), FAST);
    assignments.insert("temp".to_string(), SLOW);
    assignments.insert("moisture".to_string(), ORPHAN);

    PolicyCatalog::from_parts(max_aoi, policies, Classification::from_assignments(assignments))
        .unwrap()
}

#[test]
fn first_access_is_a_cold_start_fetch() {
    let cat = catalog(10);
    let mut ctl = DecisionController::without_telemetry(&cat, Config::default().energy);

    let d = ctl.decide(0, 7, "temp");
    assert_eq!(d.action, Action::FetchFresh);
    assert_eq!(d.basis, DecisionBasis::ColdStart);
    assert_eq!(d.prior_aoi, None);
    assert_eq!(d.post_aoi, 1);
    assert_eq!(ctl.store().get(7, "temp"), Some(1));

    // Same parameter, other location: independent key.
    let other = ctl.decide(0, 8, "temp");
    assert_eq!(other.basis, DecisionBasis::ColdStart);
    assert_eq!(ctl.store().len(), 2);
}

#[test]
fn cache_hits_age_and_saturate_at_max_aoi() {
    let cat = catalog(10);
    let mut ctl = DecisionController::without_telemetry(&cat, Config::default().energy);
    ctl.decide(0, 1, "temp");

    for n in 1..=25u32 {
        let d = ctl.decide(i64::from(n), 1, "temp");
        assert_eq!(d.action, Action::UseCache);
        assert_eq!(d.post_aoi, (n + 1).min(10));
    }
    assert_eq!(ctl.store().get(1, "temp"), Some(10));
}

#[test]
fn threshold_policy_cycles_fetch_then_four_hits() {
    let cat = catalog(10);
    let mut ctl = DecisionController::without_telemetry(&cat, Config::default().energy);

    let actions: Vec<Action> = (0..11).map(|t| ctl.decide(t, 3, "speed").action).collect();
    let f = Action::FetchFresh;
    let c = Action::UseCache;
    assert_eq!(actions, vec![f, c, c, c, c, f, c, c, c, c, f]);

    // Fetch resets the age.
    assert_eq!(ctl.store().get(3, "speed"), Some(1));
}

#[test]
fn unclassified_parameter_always_fetches() {
    let cat = catalog(10);
    let mut ctl = DecisionController::without_telemetry(&cat, Config::default().energy);

    let bases: Vec<DecisionBasis> = (0..3)
        .map(|t| ctl.decide(t, 0, "lidar_frame").basis)
        .collect();
    assert_eq!(
        bases,
        vec![
            DecisionBasis::ColdStart,
            DecisionBasis::Unclassified,
            DecisionBasis::Unclassified
        ]
    );
    assert_eq!(ctl.stats().fetches, 3);
    assert_eq!(ctl.stats().unclassified, 2);
    assert_eq!(ctl.stats().no_policy, 0);
    assert_eq!(ctl.store().get(0, "lidar_frame"), Some(1));
}

#[test]
fn classified_parameter_without_policy_always_fetches() {
    let cat = catalog(10);
    let mut ctl = DecisionController::without_telemetry(&cat, Config::default().energy);

    ctl.decide(0, 0, "moisture");
    let d = ctl.decide(1, 0, "moisture");
    assert_eq!((d.action, d.basis), (Action::FetchFresh, DecisionBasis::NoPolicy));
    assert_eq!(ctl.stats().no_policy, 1);
    assert_eq!(ctl.stats().unclassified, 0);
    assert_eq!(ctl.fallback_parameters(), vec!["moisture"]);
}

#[test]
fn replay_feeds_every_sink() {
    let cat = catalog(10);
    let energy = Config::default().energy;
    let events: Vec<AccessEvent> = (0..6)
        .map(|t| AccessEvent {
            timestamp: t,
            location: 5,
            parameters: vec!["speed".into(), "temp".into()],
        })
        .collect();

    let mut ctl = DecisionController::new(&cat, energy, (VecSink::new(), SeriesSink::new()));
    let stats = ctl.replay(&events);
    let (_, (records, series)) = ctl.finish();

    assert_eq!(stats.decisions, 12);
    assert_eq!(records.records.len(), 12);
    assert_eq!(series.len(), 6);
    // t=0 cold-starts both keys; t=5 refetches "speed" at AoI 5.
    assert_eq!(series.bucket(0).unwrap().fetches, 2);
    assert_eq!(series.bucket(5).unwrap().fetches, 1);
    for t in 1..5 {
        assert_eq!(series.bucket(t).unwrap().cache_hits, 2);
    }

    let totals = RunTotals::from_stats(&stats);
    assert_eq!(totals.fetches, 3);
    assert_eq!(totals.cold_starts, 2);
    assert_eq!(totals.fallbacks, 0);
    let expected = 3.0 * energy.fetch_energy + 9.0 * energy.cache_lookup_energy;
    assert!((totals.energy - expected).abs() < 1e-9);
    let last = series.cumulative_energy().last().copied().unwrap();
    assert!((last.1 - expected).abs() < 1e-9);
}
