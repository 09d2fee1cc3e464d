// src/workload.rs
//
// Synthetic vehicular workload for exercising the online loop.
//
// - RecipeBook:   decision query -> parameters it needs
// - SensorField:  static roadside sensors; nearest one is the location key
// - Gauss-Markov mobility on a bounded square (reflect by flipping the mean
//   direction back inwards)
// - SyntheticWorkload: seeded users, periodic requests, resolved events
//
// All sampling is deterministic given a seed.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::config::WorkloadConfig;
use crate::error::WorkloadError;
use crate::types::{AccessEvent, LocationKey, ParameterId, TimestampMs};

/// A named decision and the parameters it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub parameters: Vec<ParameterId>,
}

/// Ordered decision recipes. Query `q` uses recipe `q % len`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Recipe>", into = "Vec<Recipe>")]
pub struct RecipeBook {
    recipes: Vec<Recipe>,
}

impl RecipeBook {
    pub fn new(recipes: Vec<Recipe>) -> Result<Self, WorkloadError> {
        if recipes.is_empty() {
            return Err(WorkloadError::EmptyRecipeBook);
        }
        Ok(Self { recipes })
    }

    /// Driver-assistance recipes for a connected vehicle.
    pub fn vehicular() -> Self {
        let table: [(&str, &[&str]); 7] = [
            (
                "imminent_collision_warning_forward",
                &["forward_vehicle_distance", "relative_speed", "own_vehicle_speed"],
            ),
            (
                "emergency_braking_assist",
                &["forward_object_distance", "relative_speed", "own_vehicle_speed"],
            ),
            (
                "safe_lane_change_advisory",
                &["rear_vehicle_distance", "side_vehicle_distance", "relative_speed_rear"],
            ),
            (
                "curve_speed_warning",
                &["road_geometry_curvature", "own_vehicle_speed", "road_surface_condition"],
            ),
            (
                "traffic_level_assessment",
                &["average_speed_segment", "vehicle_count_segment"],
            ),
            (
                "road_condition_report",
                &["surface_moisture_level", "surface_temperature", "pothole_density"],
            ),
            (
                "accident_ahead_warning",
                &["v2x_accident_alert", "distance_to_accident"],
            ),
        ];

        let recipes = table
            .iter()
            .map(|(name, params)| Recipe {
                name: name.to_string(),
                parameters: params.iter().map(|p| p.to_string()).collect(),
            })
            .collect();
        Self { recipes }
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn parameters_for_query(&self, query: u32) -> &[ParameterId] {
        &self.recipes[query as usize % self.recipes.len()].parameters
    }

    /// Every distinct parameter any recipe reads, sorted.
    pub fn parameter_catalog(&self) -> Vec<ParameterId> {
        let mut all: Vec<ParameterId> = self
            .recipes
            .iter()
            .flat_map(|r| r.parameters.iter().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }
}

impl TryFrom<Vec<Recipe>> for RecipeBook {
    type Error = WorkloadError;

    fn try_from(recipes: Vec<Recipe>) -> Result<Self, Self::Error> {
        Self::new(recipes)
    }
}

impl From<RecipeBook> for Vec<Recipe> {
    fn from(book: RecipeBook) -> Self {
        book.recipes
    }
}

impl Default for RecipeBook {
    fn default() -> Self {
        Self::vehicular()
    }
}

/// Maps raw coordinates to a discrete location key.
pub trait LocationResolver {
    fn resolve(&self, x: f64, y: f64) -> LocationKey;
}

/// Static sensors; the key of a position is the index of its nearest sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorField {
    positions: Vec<(f64, f64)>,
}

impl SensorField {
    pub fn new(positions: Vec<(f64, f64)>) -> Result<Self, WorkloadError> {
        if positions.is_empty() {
            return Err(WorkloadError::InvalidConfig {
                field: "num_sensors",
                reason: "must be >= 1",
            });
        }
        Ok(Self { positions })
    }

    /// `count` sensors placed uniformly over `area`.
    pub fn uniform<R: Rng + ?Sized>(
        count: usize,
        area: (f64, f64, f64, f64),
        rng: &mut R,
    ) -> Result<Self, WorkloadError> {
        let (min_x, max_x, min_y, max_y) = area;
        let positions = (0..count)
            .map(|_| (rng.gen_range(min_x..max_x), rng.gen_range(min_y..max_y)))
            .collect();
        Self::new(positions)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[(f64, f64)] {
        &self.positions
    }
}

impl LocationResolver for SensorField {
    /// Linear scan; the lowest index wins on equal distance.
    fn resolve(&self, x: f64, y: f64) -> LocationKey {
        let mut best = 0usize;
        let mut best_d2 = f64::INFINITY;
        for (i, &(sx, sy)) in self.positions.iter().enumerate() {
            let d2 = (x - sx).powi(2) + (y - sy).powi(2);
            if d2 < best_d2 {
                best_d2 = d2;
                best = i;
            }
        }
        best as LocationKey
    }
}

/// A mobile user moving under the Gauss-Markov model.
#[derive(Debug, Clone, PartialEq)]
pub struct MobileUser {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    /// Heading in radians.
    pub direction: f64,
    /// Mean heading in degrees; flipped inwards at the area boundary.
    pub mean_direction_deg: f64,
    /// Steps between requests.
    pub request_interval: u32,
    pub next_request: f64,
}

/// Advance one user by one step.
///
/// `memory` in [0, 1] trades persistence of speed/heading against the mean.
/// Crossing a boundary clamps the position and points the mean heading
/// back into the area.
pub fn gauss_markov_step<R: Rng + ?Sized>(
    user: &mut MobileUser,
    mean_speed: f64,
    memory: f64,
    area: (f64, f64, f64, f64),
    rng: &mut R,
) {
    let (min_x, max_x, min_y, max_y) = area;
    let noise = (1.0 - memory * memory).sqrt();

    let n_speed: f64 = rng.sample(StandardNormal);
    let n_dir: f64 = rng.sample(StandardNormal);
    user.speed = memory * user.speed + (1.0 - memory) * mean_speed + noise * n_speed;
    user.direction = memory * user.direction
        + (1.0 - memory) * user.mean_direction_deg.to_radians()
        + noise * n_dir;

    user.x += user.speed * user.direction.cos();
    user.y += user.speed * user.direction.sin();

    if user.x > max_x {
        user.mean_direction_deg = 180.0;
        user.x = max_x;
    } else if user.x < min_x {
        user.mean_direction_deg = 0.0;
        user.x = min_x;
    }
    if user.y > max_y {
        user.mean_direction_deg = 270.0;
        user.y = max_y;
    } else if user.y < min_y {
        user.mean_direction_deg = 90.0;
        user.y = min_y;
    }
}

/// One user request: a position, a time and the decision queries asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRequest {
    pub user: u32,
    pub x: f64,
    pub y: f64,
    pub timestamp: TimestampMs,
    /// Distinct query ids, ascending.
    pub queries: Vec<u32>,
}

/// Resolve each request's location and expand its queries into the
/// parameters they read, keeping request order.
pub fn expand_requests<L: LocationResolver + ?Sized>(
    requests: &[UserRequest],
    resolver: &L,
    recipes: &RecipeBook,
) -> Vec<AccessEvent> {
    requests
        .iter()
        .map(|req| AccessEvent {
            timestamp: req.timestamp,
            location: resolver.resolve(req.x, req.y),
            parameters: req
                .queries
                .iter()
                .flat_map(|&q| recipes.parameters_for_query(q).iter().cloned())
                .collect(),
        })
        .collect()
}

/// A fully generated workload run.
#[derive(Debug, Clone)]
pub struct SyntheticWorkload {
    pub sensors: SensorField,
    pub requests: Vec<UserRequest>,
    /// Chronologically ordered, locations resolved.
    pub events: Vec<AccessEvent>,
    pub final_users: Vec<MobileUser>,
}

impl SyntheticWorkload {
    pub fn generate(
        cfg: &WorkloadConfig,
        recipes: &RecipeBook,
        seed: u64,
    ) -> Result<Self, WorkloadError> {
        validate(cfg)?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (min_x, max_x, min_y, max_y) = cfg.area;

        let sensors = SensorField::uniform(cfg.num_sensors, cfg.area, &mut rng)?;

        let mut users: Vec<MobileUser> = (0..cfg.num_users)
            .map(|i| MobileUser {
                id: i as u32 + 1,
                x: rng.gen_range(min_x..max_x),
                y: rng.gen_range(min_y..max_y),
                speed: rng.gen_range(cfg.mean_speed * 0.8..=cfg.mean_speed * 1.2),
                direction: rng.gen_range(0.0..360.0_f64).to_radians(),
                mean_direction_deg: rng.gen_range(0.0..360.0),
                request_interval: rng
                    .gen_range(cfg.request_interval.0..=cfg.request_interval.1),
                next_request: rng.gen_range(0.0..10.0),
            })
            .collect();

        let mut requests = Vec::new();
        for t in 0..cfg.duration {
            for user in users.iter_mut() {
                gauss_markov_step(user, cfg.mean_speed, cfg.memory, cfg.area, &mut rng);
            }

            let now = f64::from(t);
            for user in users.iter_mut() {
                if now < user.next_request {
                    continue;
                }
                let k = rng.gen_range(cfg.queries_per_request.0..=cfg.queries_per_request.1);
                let mut queries: Vec<u32> = index::sample(&mut rng, cfg.max_query_id as usize, k)
                    .into_iter()
                    .map(|i| i as u32 + 1)
                    .collect();
                queries.sort_unstable();

                requests.push(UserRequest {
                    user: user.id,
                    x: round2(user.x),
                    y: round2(user.y),
                    timestamp: TimestampMs::from(t),
                    queries,
                });
                user.next_request += f64::from(user.request_interval);
            }
        }

        let events = expand_requests(&requests, &sensors, recipes);

        Ok(Self {
            sensors,
            requests,
            events,
            final_users: users,
        })
    }

    pub fn decision_count(&self) -> usize {
        self.events.iter().map(|e| e.parameters.len()).sum()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn validate(cfg: &WorkloadConfig) -> Result<(), WorkloadError> {
    let invalid = |field, reason| Err(WorkloadError::InvalidConfig { field, reason });

    let (min_x, max_x, min_y, max_y) = cfg.area;
    let finite = [min_x, max_x, min_y, max_y].iter().all(|v| v.is_finite());
    if !finite || !(min_x < max_x && min_y < max_y) {
        return invalid("area", "bounds must be finite with min < max");
    }
    if cfg.num_sensors == 0 {
        return invalid("num_sensors", "must be >= 1");
    }
    if !(cfg.mean_speed >= 0.0) || !cfg.mean_speed.is_finite() {
        return invalid("mean_speed", "must be finite and >= 0");
    }
    if !(0.0..=1.0).contains(&cfg.memory) {
        return invalid("memory", "must lie in [0, 1]");
    }
    let (lo, hi) = cfg.request_interval;
    if lo == 0 || lo > hi {
        return invalid("request_interval", "need 1 <= min <= max");
    }
    let (lo, hi) = cfg.queries_per_request;
    if lo == 0 || lo > hi || hi > cfg.max_query_id as usize {
        return invalid("queries_per_request", "need 1 <= min <= max <= max_query_id");
    }
    Ok(())
}
