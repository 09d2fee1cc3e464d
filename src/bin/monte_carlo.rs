// src/bin/monte_carlo.rs
//
// Monte Carlo / research harness: replay many seeded synthetic workloads
// through one policy catalog and aggregate sensor fetches and energy per
// user count.
//
// Goals:
// - Deterministic multi-run evaluation using seed offsets (run i uses seed + i).
// - One catalog per invocation; runs are independent and fan out over rayon,
//   results are reported in run order.
// - Versioned mc_summary.json for downstream plotting.
//
// Run examples:
//   cargo run --bin monte_carlo -- --scores demos/scores.yaml --runs 100 --users 50,100,150,200,250
//   AOI_CACHE_PROFILE=frugal cargo run --bin monte_carlo -- --scores demos/scores.yaml --runs 20 --quiet

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use aoi_cache::config::{resolve_effective_profile, Config, FreshnessProfile};
use aoi_cache::metrics::{OnlineStats, RunTotals, SeriesSink, StatSummary};
use aoi_cache::{
    init_tracing, DecisionController, PolicyCatalog, RecipeBook, ScoreTable, SyntheticWorkload,
};

const DEFAULT_SCORES: &str = "demos/scores.yaml";
const DEFAULT_RUNS: usize = 10;
const DEFAULT_SEED: u64 = 1;
const DEFAULT_USERS: &[usize] = &[50, 100, 150, 200, 250];
const DEFAULT_OUTPUT_DIR: &str = "runs/mc";

#[derive(Debug, Clone)]
struct Args {
    scores: PathBuf,
    users: Vec<usize>,
    runs: usize,
    seed: u64,
    profile: Option<FreshnessProfile>,
    output_dir: PathBuf,
    quiet: bool,
}

impl Args {
    fn usage() -> &'static str {
        "\
aoi_cache Monte Carlo harness

USAGE:
  cargo run --bin monte_carlo -- [FLAGS]

PROFILE PRECEDENCE:
  1) --profile overrides environment
  2) else AOI_CACHE_PROFILE
  3) else Balanced

FLAGS:
  --scores PATH        Score table YAML (default: demos/scores.yaml)
  --users LIST         Comma-separated user counts (default: 50,100,150,200,250)
  --runs N             Runs per user count (default: 10)
  --seed U64           Base seed (default: 1). Run i uses seed + i.
  --profile NAME       fresh | balanced | frugal
  --output-dir PATH    Where mc_summary.json is written (default: runs/mc)
  --quiet              Suppress per-run lines; only print final summary
  --help               Show this help

OUTPUT:
  <output-dir>/mc_summary.json   Per-run totals, aggregates and time series
"
    }

    fn parse_or_exit() -> Self {
        match Self::parse_from(env::args().skip(1)) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("{e}\n\n{}", Self::usage());
                std::process::exit(2);
            }
        }
    }

    fn parse_from<I: Iterator<Item = String>>(mut it: I) -> Result<Self, String> {
        let mut out = Args {
            scores: PathBuf::from(DEFAULT_SCORES),
            users: DEFAULT_USERS.to_vec(),
            runs: DEFAULT_RUNS,
            seed: DEFAULT_SEED,
            profile: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            quiet: false,
        };

        while let Some(arg) = it.next() {
            // Support --flag=value style for convenience.
            let (flag, inline) = match arg.split_once('=') {
                Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
                _ => (arg.clone(), None),
            };
            let mut value = |name: &str| -> Result<String, String> {
                inline
                    .clone()
                    .or_else(|| it.next())
                    .ok_or_else(|| format!("Missing value for {name}"))
            };

            match flag.as_str() {
                "--help" | "-h" => {
                    println!("{}", Self::usage());
                    std::process::exit(0);
                }
                "--quiet" => out.quiet = true,
                "--scores" => out.scores = PathBuf::from(value("--scores")?),
                "--output-dir" => out.output_dir = PathBuf::from(value("--output-dir")?),
                "--profile" => {
                    let v = value("--profile")?;
                    out.profile = Some(FreshnessProfile::parse(&v).ok_or_else(|| {
                        "Invalid --profile. Expected: fresh | balanced | frugal".to_string()
                    })?);
                }
                "--runs" => {
                    out.runs = value("--runs")?
                        .parse::<usize>()
                        .map_err(|_| "Invalid --runs (expected integer)".to_string())?;
                    if out.runs == 0 {
                        return Err("--runs must be >= 1".to_string());
                    }
                }
                "--seed" => {
                    out.seed = value("--seed")?
                        .parse::<u64>()
                        .map_err(|_| "Invalid --seed (expected u64)".to_string())?;
                }
                "--users" => {
                    out.users = parse_user_list(&value("--users")?)?;
                }
                other => return Err(format!("Unknown argument: {other}")),
            }
        }

        Ok(out)
    }
}

fn parse_user_list(raw: &str) -> Result<Vec<usize>, String> {
    let users = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| format!("Invalid --users entry '{s}' (expected integer)"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if users.is_empty() {
        return Err("--users needs at least one count".to_string());
    }
    Ok(users)
}

/// Aggregate statistics for a metric.
#[derive(Debug, Clone, Serialize)]
struct AggregateStats {
    #[serde(flatten)]
    summary: StatSummary,
    p05: f64,
    p50: f64,
    p95: f64,
}

#[derive(Debug, Clone, Serialize)]
struct McRunRecord {
    run_index: usize,
    seed: u64,
    requests: usize,
    #[serde(flatten)]
    totals: RunTotals,
}

#[derive(Debug, Clone, Serialize)]
struct TimePoint {
    t: i64,
    mean_fetches: f64,
    mean_energy: f64,
}

#[derive(Debug, Clone, Serialize)]
struct UserCountSummary {
    users: usize,
    sensor_fetches: AggregateStats,
    energy: AggregateStats,
    cache_hits: StatSummary,
    decisions: StatSummary,
    time_series: Vec<TimePoint>,
    runs: Vec<McRunRecord>,
}

#[derive(Debug, Clone, Serialize)]
struct McConfig {
    profile: String,
    profile_source: String,
    scores: String,
    runs: usize,
    base_seed: u64,
    duration: u32,
    resource_cost: f64,
    max_aoi: u32,
    gamma: f64,
}

/// Monte Carlo summary output (versioned schema).
#[derive(Debug, Clone, Serialize)]
struct McSummary {
    /// Schema version for mc_summary.json. Increment on breaking changes.
    schema_version: u32,
    aoi_cache_version: String,
    config: McConfig,
    by_users: Vec<UserCountSummary>,
}

struct RunResult {
    seed: u64,
    requests: usize,
    totals: RunTotals,
    series: SeriesSink,
}

fn run_once(
    catalog: &PolicyCatalog,
    cfg: &Config,
    recipes: &RecipeBook,
    users: usize,
    seed: u64,
) -> Result<RunResult> {
    let mut wl_cfg = cfg.workload.clone();
    wl_cfg.num_users = users;
    let workload = SyntheticWorkload::generate(&wl_cfg, recipes, seed)
        .with_context(|| format!("workload generation failed for seed {seed}"))?;

    let mut controller = DecisionController::new(catalog, cfg.energy, SeriesSink::new());
    let stats = controller.replay(&workload.events);
    let (_, series) = controller.finish();

    Ok(RunResult {
        seed,
        requests: workload.requests.len(),
        totals: RunTotals::from_stats(&stats),
        series,
    })
}

fn percentile(sorted: &[f64], p01: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let p = p01.clamp(0.0, 1.0);
    let n = sorted.len();
    let idx = p * (n.saturating_sub(1) as f64);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let w = idx - (lo as f64);
    sorted[lo] * (1.0 - w) + sorted[hi] * w
}

fn aggregate(samples: impl Iterator<Item = f64>) -> AggregateStats {
    let mut stats = OnlineStats::default();
    let mut xs: Vec<f64> = Vec::new();
    for x in samples {
        stats.add(x);
        if x.is_finite() {
            xs.push(x);
        }
    }
    xs.sort_by(f64::total_cmp);
    AggregateStats {
        summary: stats.summary(),
        p05: percentile(&xs, 0.05),
        p50: percentile(&xs, 0.50),
        p95: percentile(&xs, 0.95),
    }
}

fn stats_of(samples: impl Iterator<Item = f64>) -> StatSummary {
    let mut stats = OnlineStats::default();
    samples.for_each(|x| stats.add(x));
    stats.summary()
}

/// Mean per-step fetches/energy across runs; steps with no decisions in a
/// run count as zero for that run.
fn time_series(results: &[RunResult], duration: u32) -> Vec<TimePoint> {
    (0..i64::from(duration))
        .map(|t| {
            let mut fetches = OnlineStats::default();
            let mut energy = OnlineStats::default();
            for r in results {
                let b = r.series.bucket(t).copied().unwrap_or_default();
                fetches.add(b.fetches as f64);
                energy.add(b.energy);
            }
            TimePoint {
                t,
                mean_fetches: fetches.mean(),
                mean_energy: energy.mean(),
            }
        })
        .collect()
}

/// Write a file atomically (temp file + rename).
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let temp_name = format!(
        ".tmp_{}_{}",
        std::process::id(),
        path.file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
    );
    let temp_path = parent.join(&temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse_or_exit();
    init_tracing(if args.quiet { "warn" } else { "info" });

    let effective = resolve_effective_profile(args.profile);
    effective.log_startup();
    let cfg = Config::from_env_or_profile(effective.profile);

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("failed to create output dir {}", args.output_dir.display())
    })?;

    let scores = ScoreTable::from_yaml_file(&args.scores)
        .with_context(|| format!("failed to load scores from {}", args.scores.display()))?;
    let catalog = PolicyCatalog::build(&scores, &cfg).context("failed to build policy catalog")?;
    let recipes = RecipeBook::default();

    println!(
        "aoi_cache-mc v{} | profile={} ({}) runs={} seed={} users={:?} output_dir={}",
        env!("CARGO_PKG_VERSION"),
        effective.profile.as_str(),
        effective.source.as_str(),
        args.runs,
        args.seed,
        args.users,
        args.output_dir.display(),
    );

    let mut by_users = Vec::with_capacity(args.users.len());

    for &users in &args.users {
        let results = (0..args.runs)
            .into_par_iter()
            .map(|i| run_once(&catalog, &cfg, &recipes, users, args.seed.wrapping_add(i as u64)))
            .collect::<Result<Vec<_>>>()?;

        if !args.quiet {
            for (i, r) in results.iter().enumerate() {
                println!(
                    "users={:<4} run {:>4}/{:<4} seed={:<10} requests={:>5} decisions={:>6} fetches={:>6} energy={:>10.2}",
                    users,
                    i + 1,
                    args.runs,
                    r.seed,
                    r.requests,
                    r.totals.decisions,
                    r.totals.fetches,
                    r.totals.energy,
                );
            }
        }

        let summary = UserCountSummary {
            users,
            sensor_fetches: aggregate(results.iter().map(|r| r.totals.fetches as f64)),
            energy: aggregate(results.iter().map(|r| r.totals.energy)),
            cache_hits: stats_of(results.iter().map(|r| r.totals.cache_hits as f64)),
            decisions: stats_of(results.iter().map(|r| r.totals.decisions as f64)),
            time_series: time_series(&results, cfg.workload.duration),
            runs: results
                .iter()
                .enumerate()
                .map(|(i, r)| McRunRecord {
                    run_index: i,
                    seed: r.seed,
                    requests: r.requests,
                    totals: r.totals,
                })
                .collect(),
        };

        println!(
            "users={:<4} fetches: mean={:.2} std(pop)={:.2} p50={:.2} | energy: mean={:.2} std(pop)={:.2}",
            users,
            summary.sensor_fetches.summary.mean,
            summary.sensor_fetches.summary.std,
            summary.sensor_fetches.p50,
            summary.energy.summary.mean,
            summary.energy.summary.std,
        );

        by_users.push(summary);
    }

    let summary = McSummary {
        schema_version: 1,
        aoi_cache_version: env!("CARGO_PKG_VERSION").to_string(),
        config: McConfig {
            profile: effective.profile.as_str().to_string(),
            profile_source: effective.source.as_str().to_string(),
            scores: args.scores.display().to_string(),
            runs: args.runs,
            base_seed: args.seed,
            duration: cfg.workload.duration,
            resource_cost: cfg.solver.resource_cost,
            max_aoi: cfg.solver.max_aoi,
            gamma: cfg.solver.gamma,
        },
        by_users,
    };

    let summary_path = args.output_dir.join("mc_summary.json");
    let json = serde_json::to_vec_pretty(&summary).context("failed to serialize mc_summary.json")?;
    atomic_write(&summary_path, &json)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;

    println!("Output written to: {}/", args.output_dir.display());
    Ok(())
}
