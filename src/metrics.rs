// src/metrics.rs
//
// Online metrics for the research harnesses.
// - OnlineStats: Welford running mean/variance + min/max.
// - SeriesSink:  per-timestamp decision / fetch / energy buckets.
// - RunTotals:   serializable summary of one replay.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::controller::ControllerStats;
use crate::telemetry::{DecisionRecord, DecisionSink};
use crate::types::{Action, TimestampMs};

#[derive(Debug, Clone, Copy)]
pub struct OnlineStats {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for OnlineStats {
    fn default() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl OnlineStats {
    /// Adds a sample if finite. Non-finite samples are ignored.
    pub fn add(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }

        self.n += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);

        let delta = x - self.mean;
        self.mean += delta / (self.n as f64);
        self.m2 += delta * (x - self.mean);
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn min(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.max
        }
    }

    /// Population variance (divide by n).
    pub fn variance_population(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.m2 / (self.n as f64)
        }
    }

    /// Sample variance (divide by n-1).
    pub fn variance_sample(&self) -> f64 {
        if self.n <= 1 {
            0.0
        } else {
            self.m2 / ((self.n as f64) - 1.0)
        }
    }

    pub fn stddev_population(&self) -> f64 {
        self.variance_population().sqrt()
    }

    pub fn stddev_sample(&self) -> f64 {
        self.variance_sample().sqrt()
    }

    pub fn summary(&self) -> StatSummary {
        StatSummary {
            n: self.n,
            mean: self.mean(),
            std: self.stddev_population(),
            min: self.min(),
            max: self.max(),
        }
    }
}

/// Serializable snapshot of an [`OnlineStats`]; `std` is the population
/// standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatSummary {
    pub n: u64,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Activity within one timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeriesBucket {
    pub decisions: u64,
    pub fetches: u64,
    pub cache_hits: u64,
    pub energy: f64,
}

/// Decision sink that aggregates records by timestamp ("accesses over
/// time" / "energy over time").
#[derive(Debug, Clone, Default)]
pub struct SeriesSink {
    buckets: BTreeMap<TimestampMs, SeriesBucket>,
}

impl SeriesSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, timestamp: TimestampMs) -> Option<&SeriesBucket> {
        self.buckets.get(&timestamp)
    }

    /// Buckets in timestamp order. Timestamps with no decisions are absent.
    pub fn iter(&self) -> impl Iterator<Item = (TimestampMs, &SeriesBucket)> {
        self.buckets.iter().map(|(t, b)| (*t, b))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Running total of energy, one point per populated timestamp.
    pub fn cumulative_energy(&self) -> Vec<(TimestampMs, f64)> {
        let mut total = 0.0;
        self.buckets
            .iter()
            .map(|(t, b)| {
                total += b.energy;
                (*t, total)
            })
            .collect()
    }
}

impl DecisionSink for SeriesSink {
    fn record(&mut self, record: &DecisionRecord) {
        let b = self.buckets.entry(record.timestamp).or_default();
        b.decisions += 1;
        match record.action {
            Action::FetchFresh => b.fetches += 1,
            Action::UseCache => b.cache_hits += 1,
        }
        b.energy += record.energy;
    }
}

/// Summary of one replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunTotals {
    pub decisions: u64,
    pub fetches: u64,
    pub cache_hits: u64,
    pub cold_starts: u64,
    pub fallbacks: u64,
    pub energy: f64,
    pub latency_ms: f64,
}

impl RunTotals {
    pub fn from_stats(stats: &ControllerStats) -> Self {
        Self {
            decisions: stats.decisions,
            fetches: stats.fetches,
            cache_hits: stats.cache_hits,
            cold_starts: stats.cold_starts,
            fallbacks: stats.unclassified + stats.no_policy,
            energy: stats.energy,
            latency_ms: stats.latency_ms,
        }
    }

    /// Share of decisions that fetched; 0 with no decisions.
    pub fn fetch_ratio(&self) -> f64 {
        if self.decisions == 0 {
            0.0
        } else {
            self.fetches as f64 / self.decisions as f64
        }
    }

    pub fn mean_latency_ms(&self) -> f64 {
        if self.decisions == 0 {
            0.0
        } else {
            self.latency_ms / self.decisions as f64
        }
    }
}

impl From<&ControllerStats> for RunTotals {
    fn from(stats: &ControllerStats) -> Self {
        RunTotals::from_stats(stats)
    }
}
