// src/types.rs
//
// Shared value types for the decision core: AoI, actions, tiers and the
// (volatility, criticality) category key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Age of Information in discrete time units since the last fresh fetch.
pub type Aoi = u32;

/// Discrete location identifier (e.g. nearest static sensor index).
pub type LocationKey = u32;

/// Event timestamp in simulation units.
pub type TimestampMs = i64;

/// Opaque identifier of a measurable quantity, e.g. "forward_vehicle_distance".
pub type ParameterId = String;

/// Cache/fetch decision for one access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    UseCache,
    FetchFresh,
}

impl Action {
    /// Numeric code used by the persisted policy form (0 = cache, 1 = fetch).
    pub fn code(self) -> u8 {
        match self {
            Action::UseCache => 0,
            Action::FetchFresh => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Action> {
        match code {
            0 => Some(Action::UseCache),
            1 => Some(Action::FetchFresh),
            _ => None,
        }
    }

    pub fn is_fetch(self) -> bool {
        matches!(self, Action::FetchFresh)
    }
}

/// Why the controller chose an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    /// Key never fetched; nothing to serve.
    ColdStart,
    /// Action read from the category policy.
    Policy,
    /// Parameter has no category; fetched.
    Unclassified,
    /// Category has no solved policy; fetched.
    NoPolicy,
}

impl DecisionBasis {
    pub fn is_fallback(self) -> bool {
        matches!(self, DecisionBasis::Unclassified | DecisionBasis::NoPolicy)
    }
}

/// One request from the workload: a located user asking for a set of
/// parameters at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub timestamp: TimestampMs,
    pub location: LocationKey,
    /// Requested parameters, in request order. Duplicates are decided twice.
    pub parameters: Vec<ParameterId>,
}

/// Tertile label for one scoring axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::High, Tier::Medium, Tier::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::High => "High",
            Tier::Medium => "Medium",
            Tier::Low => "Low",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = CategoryKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Tier::High),
            "medium" => Ok(Tier::Medium),
            "low" => Ok(Tier::Low),
            _ => Err(CategoryKeyError {
                raw: s.to_string(),
            }),
        }
    }
}

/// A (volatility tier, criticality tier) pair selecting one shared policy.
///
/// As a value it serializes as a 2-element tier pair (`["High", "Low"]`).
/// As a map key it is written with [`Category::key`] and read back with
/// [`Category::parse_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(Tier, Tier)", into = "(Tier, Tier)")]
pub struct Category {
    pub volatility: Tier,
    pub criticality: Tier,
}

/// Separator between the two tier names in a category key.
const KEY_SEPARATOR: char = '-';

impl Category {
    pub fn new(volatility: Tier, criticality: Tier) -> Self {
        Self {
            volatility,
            criticality,
        }
    }

    /// All nine categories, volatility-major.
    pub fn all() -> impl Iterator<Item = Category> {
        Tier::ALL
            .into_iter()
            .flat_map(|v| Tier::ALL.into_iter().map(move |c| Category::new(v, c)))
    }

    /// String key, volatility first: `"High-Low"`.
    pub fn key(&self) -> String {
        format!(
            "{}{}{}",
            self.volatility.as_str(),
            KEY_SEPARATOR,
            self.criticality.as_str()
        )
    }

    /// Parse a key produced by [`Category::key`].
    pub fn parse_key(raw: &str) -> Result<Category, CategoryKeyError> {
        let err = || CategoryKeyError {
            raw: raw.to_string(),
        };
        let (v, c) = raw.split_once(KEY_SEPARATOR).ok_or_else(err)?;
        let volatility = v.parse::<Tier>().map_err(|_| err())?;
        let criticality = c.parse::<Tier>().map_err(|_| err())?;
        Ok(Category::new(volatility, criticality))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl From<(Tier, Tier)> for Category {
    fn from((volatility, criticality): (Tier, Tier)) -> Self {
        Category::new(volatility, criticality)
    }
}

impl From<Category> for (Tier, Tier) {
    fn from(c: Category) -> Self {
        (c.volatility, c.criticality)
    }
}

/// Malformed tier name or category key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid category key {raw:?} (expected e.g. \"High-Low\")")]
pub struct CategoryKeyError {
    pub raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_key_round_trips_for_all_nine() {
        let all: Vec<Category> = Category::all().collect();
        assert_eq!(all.len(), 9);
        for c in all {
            assert_eq!(Category::parse_key(&c.key()).unwrap(), c);
        }
    }

    #[test]
    fn parse_key_rejects_garbage() {
        assert!(Category::parse_key("('High', 'Low')").is_err());
        assert!(Category::parse_key("High").is_err());
        assert!(Category::parse_key("High-Extreme").is_err());
        assert!(Category::parse_key("").is_err());
    }

    #[test]
    fn category_value_serializes_as_pair() {
        let c = Category::new(Tier::High, Tier::Low);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"["High","Low"]"#);
        let back: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn action_codes() {
        assert_eq!(Action::UseCache.code(), 0);
        assert_eq!(Action::FetchFresh.code(), 1);
        assert_eq!(Action::from_code(1), Some(Action::FetchFresh));
        assert_eq!(Action::from_code(2), None);
    }
}
