// src/catalog.rs
//
// Policy catalog: one solved policy per populated category plus the
// parameter classification that routes lookups to it.
//
// Build: classify -> derive cost shapes -> solve each category (rayon).
// Persist: JSON envelope { checksum, catalog } with a SHA-256 over the
// serialized body, written via temp file + rename. Load either returns a
// fully validated catalog or an error; never a partial one.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::classify::{classify, derive_cost_shapes, Classification, ScoreTable};
use crate::config::Config;
use crate::cost::CostShape;
use crate::error::CatalogError;
use crate::solver::{solve, Policy};
use crate::types::Category;

/// Persisted catalog layout version.
pub const CATALOG_SCHEMA_VERSION: u32 = 1;

/// Settings a catalog was solved with. Used to detect stale cached catalogs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverProvenance {
    pub config_version: String,
    pub resource_cost: f64,
    pub gamma: f64,
    pub epsilon: f64,
    pub alpha_range: (f64, f64),
    pub beta_range: (f64, f64),
    /// SHA-256 (hex) of the score table the classification came from.
    pub scores_sha256: String,
}

impl SolverProvenance {
    fn new(scores: &ScoreTable, cfg: &Config) -> Result<Self, CatalogError> {
        Ok(Self {
            config_version: cfg.version.to_string(),
            resource_cost: cfg.solver.resource_cost,
            gamma: cfg.solver.gamma,
            epsilon: cfg.solver.epsilon,
            alpha_range: cfg.shaping.alpha_range,
            beta_range: cfg.shaping.beta_range,
            scores_sha256: sha256_hex(&serde_json::to_vec(scores)?),
        })
    }
}

/// Result of routing a parameter to its policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyLookup<'a> {
    Found {
        category: Category,
        policy: &'a Policy,
    },
    /// Parameter is not in the classification.
    Unclassified,
    /// Parameter is classified but its category has no policy.
    NoPolicy(Category),
}

/// Immutable set of per-category policies.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyCatalog {
    max_aoi: u32,
    solver: Option<SolverProvenance>,
    policies: BTreeMap<Category, Policy>,
    cost_shapes: BTreeMap<Category, CostShape>,
    classification: Classification,
}

impl PolicyCatalog {
    /// Classify the score table, derive one cost shape per populated
    /// category and solve every category in parallel.
    ///
    /// Any solver failure aborts the build; the error reported is the one for
    /// the first failing category in key order.
    pub fn build(scores: &ScoreTable, cfg: &Config) -> Result<Self, CatalogError> {
        scores.validate()?;

        let classification = classify(scores);
        let cost_shapes = derive_cost_shapes(scores, &classification, &cfg.shaping)?;

        let solved: Vec<_> = cost_shapes
            .par_iter()
            .map(|(&category, &shape)| (category, solve(&cfg.solver_params(shape))))
            .collect();

        let mut policies = BTreeMap::new();
        let mut total_sweeps: u64 = 0;
        for (category, result) in solved {
            let solution = result.map_err(|source| CatalogError::Solver {
                category: category.key(),
                source,
            })?;
            total_sweeps += u64::from(solution.sweeps);
            policies.insert(category, solution.policy);
        }

        let catalog = Self {
            max_aoi: cfg.solver.max_aoi,
            solver: Some(SolverProvenance::new(scores, cfg)?),
            policies,
            cost_shapes,
            classification,
        };

        info!(
            parameters = catalog.classification.len(),
            categories = catalog.policies.len(),
            max_aoi = catalog.max_aoi,
            total_sweeps,
            "policy catalog built"
        );

        Ok(catalog)
    }

    /// Assemble a catalog from already-solved policies.
    ///
    /// Every policy must have exactly `max_aoi` actions. Categories referenced
    /// by the classification may be missing from `policies`.
    pub fn from_parts(
        max_aoi: u32,
        policies: BTreeMap<Category, Policy>,
        classification: Classification,
    ) -> Result<Self, CatalogError> {
        if max_aoi < 1 {
            return Err(CatalogError::InvalidMaxAoi(max_aoi));
        }
        for (category, policy) in &policies {
            check_policy_length(category, policy, max_aoi)?;
        }
        Ok(Self {
            max_aoi,
            solver: None,
            policies,
            cost_shapes: BTreeMap::new(),
            classification,
        })
    }

    pub fn max_aoi(&self) -> u32 {
        self.max_aoi
    }

    pub fn solver_provenance(&self) -> Option<&SolverProvenance> {
        self.solver.as_ref()
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn policy(&self, category: Category) -> Option<&Policy> {
        self.policies.get(&category)
    }

    pub fn cost_shape(&self, category: Category) -> Option<CostShape> {
        self.cost_shapes.get(&category).copied()
    }

    pub fn policies(&self) -> impl Iterator<Item = (Category, &Policy)> {
        self.policies.iter().map(|(c, p)| (*c, p))
    }

    pub fn policy_for_parameter(&self, parameter: &str) -> PolicyLookup<'_> {
        match self.classification.category_of(parameter) {
            None => PolicyLookup::Unclassified,
            Some(category) => match self.policies.get(&category) {
                Some(policy) => PolicyLookup::Found { category, policy },
                None => PolicyLookup::NoPolicy(category),
            },
        }
    }

    /// Categories that classified parameters map to but that have no policy.
    pub fn uncovered_categories(&self) -> Vec<Category> {
        self.classification
            .groups()
            .into_keys()
            .filter(|c| !self.policies.contains_key(c))
            .collect()
    }

    /// True if this catalog was solved from `scores` under `cfg`.
    pub fn is_built_from(&self, scores: &ScoreTable, cfg: &Config) -> bool {
        let Some(stored) = &self.solver else {
            return false;
        };
        match SolverProvenance::new(scores, cfg) {
            Ok(current) => self.max_aoi == cfg.solver.max_aoi && *stored == current,
            Err(_) => false,
        }
    }

    // --- Persistence -------------------------------------------------------

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CatalogError> {
        let path = path.as_ref();
        let body = self.to_body();
        let checksum = sha256_hex(&serde_json::to_vec(&body)?);
        let envelope = CatalogEnvelope {
            checksum,
            catalog: body,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        atomic_write(path, &bytes).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), categories = self.policies.len(), "policy catalog saved");
        Ok(())
    }

    /// Load a persisted catalog.
    ///
    /// `Ok(None)` when nothing exists at `path`. Any integrity or decoding
    /// failure is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>, CatalogError> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CatalogError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let envelope: CatalogEnvelope = serde_json::from_slice(&bytes)?;
        let computed = sha256_hex(&serde_json::to_vec(&envelope.catalog)?);
        if computed != envelope.checksum {
            return Err(CatalogError::ChecksumMismatch {
                stored: envelope.checksum,
                computed,
            });
        }

        let catalog = Self::from_body(envelope.catalog)?;

        let uncovered = catalog.uncovered_categories();
        if !uncovered.is_empty() {
            let keys: Vec<String> = uncovered.iter().map(Category::key).collect();
            warn!(
                path = %path.display(),
                uncovered = ?keys,
                "loaded catalog leaves classified categories without a policy"
            );
        }
        info!(path = %path.display(), categories = catalog.policies.len(), "policy catalog loaded");

        Ok(Some(catalog))
    }

    /// Reuse the catalog at `path` when it was built from the same scores and
    /// settings; otherwise build a fresh one and save it there.
    pub fn load_or_build<P: AsRef<Path>>(
        path: P,
        scores: &ScoreTable,
        cfg: &Config,
    ) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if let Some(existing) = Self::load(path)? {
            if existing.is_built_from(scores, cfg) {
                return Ok(existing);
            }
            info!(path = %path.display(), "cached catalog is stale; rebuilding");
        }
        let built = Self::build(scores, cfg)?;
        built.save(path)?;
        Ok(built)
    }

    fn to_body(&self) -> CatalogBody {
        CatalogBody {
            schema_version: CATALOG_SCHEMA_VERSION,
            max_aoi: self.max_aoi,
            solver: self.solver.clone(),
            policies: self
                .policies
                .iter()
                .map(|(c, p)| (c.key(), p.clone()))
                .collect(),
            cost_shapes: self
                .cost_shapes
                .iter()
                .map(|(c, s)| (c.key(), *s))
                .collect(),
            classification: self.classification.clone(),
        }
    }

    fn from_body(body: CatalogBody) -> Result<Self, CatalogError> {
        if body.schema_version != CATALOG_SCHEMA_VERSION {
            return Err(CatalogError::SchemaVersion {
                found: body.schema_version,
                expected: CATALOG_SCHEMA_VERSION,
            });
        }
        if body.max_aoi < 1 {
            return Err(CatalogError::InvalidMaxAoi(body.max_aoi));
        }

        let mut policies = BTreeMap::new();
        for (key, policy) in body.policies {
            let category = Category::parse_key(&key)?;
            check_policy_length(&category, &policy, body.max_aoi)?;
            policies.insert(category, policy);
        }

        let mut cost_shapes = BTreeMap::new();
        for (key, shape) in body.cost_shapes {
            cost_shapes.insert(Category::parse_key(&key)?, shape);
        }

        Ok(Self {
            max_aoi: body.max_aoi,
            solver: body.solver,
            policies,
            cost_shapes,
            classification: body.classification,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogEnvelope {
    checksum: String,
    catalog: CatalogBody,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogBody {
    schema_version: u32,
    max_aoi: u32,
    #[serde(default)]
    solver: Option<SolverProvenance>,
    policies: BTreeMap<String, Policy>,
    #[serde(default)]
    cost_shapes: BTreeMap<String, CostShape>,
    classification: Classification,
}

fn check_policy_length(
    category: &Category,
    policy: &Policy,
    max_aoi: u32,
) -> Result<(), CatalogError> {
    if policy.len() != max_aoi as usize {
        return Err(CatalogError::PolicyLength {
            category: category.key(),
            found: policy.len(),
            expected: max_aoi as usize,
        });
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Write a file atomically (temp file + rename).
fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let temp_name = format!(
        ".tmp_{}_{}",
        std::process::id(),
        path.file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
    );
    let temp_path = parent.join(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)
}
