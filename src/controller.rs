// src/controller.rs
//
// Online decision loop.
//
// For each (location, parameter) access:
//   1. absent from the AoI store          -> FetchFresh (cold start)
//   2. parameter has no category          -> FetchFresh (fallback)
//   3. category has no policy             -> FetchFresh (fallback)
//   4. otherwise                          -> policy.action_for(aoi)
// then charge energy/latency, update the store and emit a record.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::catalog::{PolicyCatalog, PolicyLookup};
use crate::config::EnergyConfig;
use crate::store::{AoiStore, ConcurrentAoiStore};
use crate::telemetry::{DecisionRecord, DecisionSink, NoopSink, DECISION_SCHEMA_VERSION};
use crate::types::{
    AccessEvent, Action, Aoi, DecisionBasis, LocationKey, ParameterId, TimestampMs,
};

/// Outcome of one applied decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub basis: DecisionBasis,
    pub prior_aoi: Option<Aoi>,
    pub post_aoi: Aoi,
    pub energy: f64,
    pub latency_ms: f64,
}

/// Running counters of the sequential loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerStats {
    pub decisions: u64,
    pub fetches: u64,
    pub cache_hits: u64,
    pub cold_starts: u64,
    pub unclassified: u64,
    pub no_policy: u64,
    pub energy: f64,
    pub latency_ms: f64,
}

impl ControllerStats {
    fn observe(&mut self, d: &Decision) {
        self.decisions += 1;
        match d.action {
            Action::FetchFresh => self.fetches += 1,
            Action::UseCache => self.cache_hits += 1,
        }
        match d.basis {
            DecisionBasis::ColdStart => self.cold_starts += 1,
            DecisionBasis::Unclassified => self.unclassified += 1,
            DecisionBasis::NoPolicy => self.no_policy += 1,
            DecisionBasis::Policy => {}
        }
        self.energy += d.energy;
        self.latency_ms += d.latency_ms;
    }
}

pub struct DecisionController<'a, S: DecisionSink = NoopSink> {
    catalog: &'a PolicyCatalog,
    store: AoiStore,
    energy: EnergyConfig,
    sink: S,
    stats: ControllerStats,
    // Parameters already reported as falling back.
    warned: HashSet<ParameterId>,
}

impl<'a> DecisionController<'a, NoopSink> {
    pub fn without_telemetry(catalog: &'a PolicyCatalog, energy: EnergyConfig) -> Self {
        Self::new(catalog, energy, NoopSink)
    }
}

impl<'a, S: DecisionSink> DecisionController<'a, S> {
    /// The AoI store saturates at the catalog's `max_aoi`.
    pub fn new(catalog: &'a PolicyCatalog, energy: EnergyConfig, sink: S) -> Self {
        Self {
            catalog,
            store: AoiStore::new(catalog.max_aoi()),
            energy,
            sink,
            stats: ControllerStats::default(),
            warned: HashSet::new(),
        }
    }

    /// Pick an action for `parameter` given its AoI (`None` = never fetched).
    pub fn choose(&self, parameter: &str, prior: Option<Aoi>) -> (Action, DecisionBasis) {
        choose_action(self.catalog, parameter, prior)
    }

    /// Decide, apply and record one access.
    pub fn decide(
        &mut self,
        timestamp: TimestampMs,
        location: LocationKey,
        parameter: &str,
    ) -> Decision {
        let prior = self.store.get(location, parameter);
        let (action, basis) = self.choose(parameter, prior);

        let (action, post_aoi) = match action {
            Action::FetchFresh => (action, self.store.record_fetch(location, parameter)),
            Action::UseCache => match self.store.record_cache_hit(location, parameter) {
                Ok(aoi) => (action, aoi),
                // UseCache is only chosen for keys already in the store.
                Err(e) => {
                    warn!(error = %e, "cache hit on missing key; fetching instead");
                    (
                        Action::FetchFresh,
                        self.store.record_fetch(location, parameter),
                    )
                }
            },
        };

        let decision = self.charge(action, basis, prior, post_aoi);

        if basis.is_fallback() && self.warned.insert(parameter.to_string()) {
            warn!(
                parameter,
                basis = ?basis,
                "no policy for parameter; defaulting to fetch"
            );
        }

        self.stats.observe(&decision);
        self.sink.record(&DecisionRecord {
            schema_version: DECISION_SCHEMA_VERSION,
            timestamp,
            location,
            parameter: parameter.to_string(),
            action: decision.action,
            basis: decision.basis,
            prior_aoi: decision.prior_aoi,
            post_aoi: decision.post_aoi,
            energy: decision.energy,
            latency_ms: decision.latency_ms,
        });

        decision
    }

    /// One decision per requested parameter, in request order. Returns the
    /// number of decisions made.
    pub fn process_event(&mut self, event: &AccessEvent) -> usize {
        for parameter in &event.parameters {
            self.decide(event.timestamp, event.location, parameter);
        }
        event.parameters.len()
    }

    /// Process a chronologically ordered event stream.
    pub fn replay(&mut self, events: &[AccessEvent]) -> ControllerStats {
        for event in events {
            self.process_event(event);
        }
        self.sink.flush();
        debug!(
            events = events.len(),
            decisions = self.stats.decisions,
            fetches = self.stats.fetches,
            "replay finished"
        );
        self.stats
    }

    /// Decision against a shared store, for hosts that run several loops in
    /// parallel over distinct keys. Counters and sink are left untouched.
    pub fn decide_concurrent(
        &self,
        store: &ConcurrentAoiStore,
        location: LocationKey,
        parameter: &str,
    ) -> Decision {
        let mut basis = DecisionBasis::ColdStart;
        let (action, prior, post) = store.transition(location, parameter, |aoi| {
            let (action, b) = self.choose(parameter, Some(aoi));
            basis = b;
            action
        });
        self.charge(action, basis, prior, post)
    }

    fn charge(
        &self,
        action: Action,
        basis: DecisionBasis,
        prior_aoi: Option<Aoi>,
        post_aoi: Aoi,
    ) -> Decision {
        let (energy, latency_ms) = match action {
            Action::FetchFresh => (self.energy.fetch_energy, self.energy.fetch_time_ms),
            Action::UseCache => (
                self.energy.cache_lookup_energy,
                self.energy.cache_lookup_time_ms,
            ),
        };
        Decision {
            action,
            basis,
            prior_aoi,
            post_aoi,
            energy,
            latency_ms,
        }
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn store(&self) -> &AoiStore {
        &self.store
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Parameters that fell back to fetching at least once, sorted.
    pub fn fallback_parameters(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.warned.iter().map(String::as_str).collect();
        out.sort_unstable();
        out
    }

    /// Flush the sink and hand back counters and sink.
    pub fn finish(mut self) -> (ControllerStats, S) {
        self.sink.flush();
        (self.stats, self.sink)
    }
}

/// Pure decision rule shared by the sequential and concurrent paths.
pub fn choose_action(
    catalog: &PolicyCatalog,
    parameter: &str,
    prior: Option<Aoi>,
) -> (Action, DecisionBasis) {
    let Some(aoi) = prior else {
        return (Action::FetchFresh, DecisionBasis::ColdStart);
    };
    match catalog.policy_for_parameter(parameter) {
        PolicyLookup::Found { policy, .. } => (policy.action_for(aoi), DecisionBasis::Policy),
        PolicyLookup::Unclassified => (Action::FetchFresh, DecisionBasis::Unclassified),
        PolicyLookup::NoPolicy(_) => (Action::FetchFresh, DecisionBasis::NoPolicy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::config::Config;
    use crate::solver::Policy;
    use crate::telemetry::VecSink;
    use crate::types::{Category, Tier};
    use std::collections::BTreeMap;

    const CACHED: Category = Category {
        volatility: Tier::Low,
        criticality: Tier::Low,
    };
    const UNSOLVED: Category = Category {
        volatility: Tier::High,
        criticality: Tier::High,
    };

    /// "slow" always caches, "orphan" is classified without a policy.
    fn catalog(max_aoi: u32) -> PolicyCatalog {
        let mut assignments = BTreeMap::new();
        assignments.insert("slow".to_string(), CACHED);
        assignments.insert("orphan".to_string(), UNSOLVED);
        let mut policies = BTreeMap::new();
        policies.insert(
            CACHED,
            Policy::uniform(Action::UseCache, max_aoi as usize).unwrap(),
        );
        PolicyCatalog::from_parts(
            max_aoi,
            policies,
            Classification::from_assignments(assignments),
        )
        .unwrap()
    }

    #[test]
    fn choose_covers_every_basis() {
        let cat = catalog(5);
        let ctl = DecisionController::without_telemetry(&cat, Config::default().energy);

        assert_eq!(
            ctl.choose("slow", None),
            (Action::FetchFresh, DecisionBasis::ColdStart)
        );
        assert_eq!(
            ctl.choose("slow", Some(3)),
            (Action::UseCache, DecisionBasis::Policy)
        );
        assert_eq!(
            ctl.choose("nobody", Some(3)),
            (Action::FetchFresh, DecisionBasis::Unclassified)
        );
        assert_eq!(
            ctl.choose("orphan", Some(3)),
            (Action::FetchFresh, DecisionBasis::NoPolicy)
        );
    }

    #[test]
    fn energy_and_latency_follow_action() {
        let cat = catalog(5);
        let energy = Config::default().energy;
        let mut ctl = DecisionController::without_telemetry(&cat, energy);

        let first = ctl.decide(0, 1, "slow");
        assert_eq!(first.energy, energy.fetch_energy);
        assert_eq!(first.latency_ms, energy.fetch_time_ms);

        let second = ctl.decide(1, 1, "slow");
        assert_eq!(second.energy, energy.cache_lookup_energy);
        assert_eq!(second.latency_ms, energy.cache_lookup_time_ms);

        let s = ctl.stats();
        assert_eq!((s.decisions, s.fetches, s.cache_hits, s.cold_starts), (2, 1, 1, 1));
        assert!((s.energy - (energy.fetch_energy + energy.cache_lookup_energy)).abs() < 1e-12);
    }

    #[test]
    fn fallbacks_are_counted_each_time_and_listed_once() {
        let cat = catalog(5);
        let mut ctl = DecisionController::without_telemetry(&cat, Config::default().energy);
        for t in 0..4 {
            ctl.decide(t, 0, "orphan");
            ctl.decide(t, 0, "nobody");
        }
        let s = *ctl.stats();
        assert_eq!(s.cold_starts, 2);
        assert_eq!(s.no_policy, 3);
        assert_eq!(s.unclassified, 3);
        assert_eq!(ctl.fallback_parameters(), vec!["nobody", "orphan"]);
    }

    #[test]
    fn process_event_expands_duplicates_in_order() {
        let cat = catalog(5);
        let mut ctl = DecisionController::new(&cat, Config::default().energy, VecSink::new());
        let n = ctl.process_event(&AccessEvent {
            timestamp: 9,
            location: 2,
            parameters: vec!["slow".into(), "slow".into(), "orphan".into()],
        });
        assert_eq!(n, 3);

        let (_, sink) = ctl.finish();
        let got: Vec<(&str, Action, Option<Aoi>)> = sink
            .records
            .iter()
            .map(|r| (r.parameter.as_str(), r.action, r.prior_aoi))
            .collect();
        assert_eq!(
            got,
            vec![
                ("slow", Action::FetchFresh, None),
                ("slow", Action::UseCache, Some(1)),
                ("orphan", Action::FetchFresh, None),
            ]
        );
        assert!(sink.records.iter().all(|r| r.timestamp == 9 && r.location == 2));
    }

    #[test]
    fn concurrent_path_matches_sequential_rule() {
        let cat = catalog(3);
        let ctl = DecisionController::without_telemetry(&cat, Config::default().energy);
        let store = ConcurrentAoiStore::new(cat.max_aoi());

        let d = ctl.decide_concurrent(&store, 4, "slow");
        assert_eq!(
            (d.action, d.basis, d.post_aoi),
            (Action::FetchFresh, DecisionBasis::ColdStart, 1)
        );
        for expected in [2, 3, 3] {
            let d = ctl.decide_concurrent(&store, 4, "slow");
            assert_eq!(
                (d.action, d.basis, d.post_aoi),
                (Action::UseCache, DecisionBasis::Policy, expected)
            );
        }
        let d = ctl.decide_concurrent(&store, 4, "orphan");
        assert_eq!(d.basis, DecisionBasis::ColdStart);
        let d = ctl.decide_concurrent(&store, 4, "orphan");
        assert_eq!((d.action, d.basis), (Action::FetchFresh, DecisionBasis::NoPolicy));
        assert_eq!(ctl.stats().decisions, 0);
    }
}
