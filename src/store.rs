// src/store.rs
//
// Mutable AoI state per (location, parameter).
//
// A key is either absent (never fetched) or holds an AoI in [1, max_aoi].
// Fetch resets to 1; a cache hit ages by one and saturates at max_aoi.

use std::collections::HashMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::types::{Action, Aoi, LocationKey, ParameterId};

/// Single-owner AoI store used by the sequential decision loop.
#[derive(Debug, Clone)]
pub struct AoiStore {
    max_aoi: Aoi,
    // parameter -> location -> AoI; lookups borrow `&str` without allocating.
    entries: HashMap<ParameterId, HashMap<LocationKey, Aoi>>,
    len: usize,
}

impl AoiStore {
    pub fn new(max_aoi: Aoi) -> Self {
        Self {
            max_aoi: max_aoi.max(1),
            entries: HashMap::new(),
            len: 0,
        }
    }

    pub fn max_aoi(&self) -> Aoi {
        self.max_aoi
    }

    pub fn get(&self, location: LocationKey, parameter: &str) -> Option<Aoi> {
        self.entries
            .get(parameter)
            .and_then(|by_loc| by_loc.get(&location))
            .copied()
    }

    /// Fresh value obtained: AoI becomes 1. Returns the new AoI.
    pub fn record_fetch(&mut self, location: LocationKey, parameter: &str) -> Aoi {
        let is_new = match self.entries.get_mut(parameter) {
            Some(by_loc) => by_loc.insert(location, 1).is_none(),
            None => {
                let mut by_loc = HashMap::new();
                by_loc.insert(location, 1);
                self.entries.insert(parameter.to_string(), by_loc);
                true
            }
        };
        if is_new {
            self.len += 1;
        }
        1
    }

    /// Cached value served: AoI ages by one, saturating at `max_aoi`.
    pub fn record_cache_hit(
        &mut self,
        location: LocationKey,
        parameter: &str,
    ) -> Result<Aoi, StoreError> {
        let max = self.max_aoi;
        let slot = self
            .entries
            .get_mut(parameter)
            .and_then(|by_loc| by_loc.get_mut(&location))
            .ok_or_else(|| StoreError::MissingEntry {
                location,
                parameter: parameter.to_string(),
            })?;
        *slot = next_aoi(*slot, max);
        Ok(*slot)
    }

    /// Number of (location, parameter) keys ever fetched.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[inline]
fn next_aoi(aoi: Aoi, max_aoi: Aoi) -> Aoi {
    aoi.saturating_add(1).min(max_aoi)
}

/// Sharded AoI store for hosts that decide for different keys in parallel.
///
/// [`ConcurrentAoiStore::transition`] holds the key's shard lock across the
/// whole read-decide-update step, so two decisions for the same key never
/// interleave.
#[derive(Debug)]
pub struct ConcurrentAoiStore {
    max_aoi: Aoi,
    entries: DashMap<(LocationKey, ParameterId), Aoi>,
}

impl ConcurrentAoiStore {
    pub fn new(max_aoi: Aoi) -> Self {
        Self {
            max_aoi: max_aoi.max(1),
            entries: DashMap::new(),
        }
    }

    pub fn max_aoi(&self) -> Aoi {
        self.max_aoi
    }

    pub fn get(&self, location: LocationKey, parameter: &str) -> Option<Aoi> {
        self.entries
            .get(&(location, parameter.to_string()))
            .map(|r| *r.value())
    }

    /// Atomically apply one decision to a key.
    ///
    /// A cold key always fetches. For a warm key `decide` receives the prior
    /// AoI and picks the action. Returns `(action, prior, post)`.
    pub fn transition<F>(
        &self,
        location: LocationKey,
        parameter: &str,
        decide: F,
    ) -> (Action, Option<Aoi>, Aoi)
    where
        F: FnOnce(Aoi) -> Action,
    {
        let max = self.max_aoi;
        match self.entries.entry((location, parameter.to_string())) {
            Entry::Occupied(mut slot) => {
                let prior = *slot.get();
                let action = decide(prior);
                let post = match action {
                    Action::FetchFresh => 1,
                    Action::UseCache => next_aoi(prior, max),
                };
                slot.insert(post);
                (action, Some(prior), post)
            }
            Entry::Vacant(slot) => {
                slot.insert(1);
                (Action::FetchFresh, None, 1)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
