// src/main.rs
//
// Thin harness around the aoi_cache library: build (or reuse) a policy
// catalog from a score table, replay one synthetic workload through the
// decision controller and print a summary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;

use aoi_cache::{
    init_tracing, resolve_effective_profile, Config, DecisionController, DecisionSink,
    FreshnessProfile, JsonlSink, NoopSink, PolicyCatalog, RecipeBook, RunTotals, ScoreTable,
    SeriesSink, SyntheticWorkload,
};

/// Command-line arguments for the aoi_cache binary.
#[derive(Parser, Debug)]
#[command(name = "aoi_cache", about = "AoI-driven cache/fetch decision replay")]
struct Cli {
    /// YAML score table: `parameters: [{name, volatility, criticality}, ...]`.
    #[arg(long)]
    scores: PathBuf,

    /// Catalog file. Reused when it was built from the same scores and
    /// settings; otherwise rebuilt and written back.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Freshness profile (fresh | balanced | frugal).
    #[arg(long, value_parser = parse_profile)]
    profile: Option<FreshnessProfile>,

    /// Number of simulated users (overrides config).
    #[arg(long)]
    users: Option<usize>,

    /// Number of time steps (overrides config).
    #[arg(long)]
    duration: Option<u32>,

    /// Workload seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Optional JSONL path, one record per decision.
    #[arg(long)]
    decisions_jsonl: Option<PathBuf>,

    /// -v for debug, -vv for trace. RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_profile(raw: &str) -> Result<FreshnessProfile, String> {
    FreshnessProfile::parse(raw)
        .ok_or_else(|| format!("unknown profile '{raw}' (expected fresh, balanced or frugal)"))
}

/// Choose the per-decision sink at runtime.
fn build_sink(path: Option<&PathBuf>) -> Result<Box<dyn DecisionSink>> {
    match path {
        Some(p) => {
            let sink = JsonlSink::create(p)
                .with_context(|| format!("failed to create decision log {}", p.display()))?;
            Ok(Box::new(sink))
        }
        None => Ok(Box::new(NoopSink)),
    }
}

fn print_catalog(catalog: &PolicyCatalog) {
    println!("== policy catalog (max_aoi = {}) ==", catalog.max_aoi());
    for (category, members) in catalog.classification().groups() {
        let threshold = match catalog.policy(category).map(|p| p.threshold()) {
            Some(Some(k)) => format!("fetch from AoI {}", k + 1),
            Some(None) => "always cache".to_string(),
            None => "NO POLICY (fetch)".to_string(),
        };
        let shape = catalog
            .cost_shape(category)
            .map(|s| format!("alpha={:.3} beta={:.3}", s.alpha, s.beta))
            .unwrap_or_default();
        println!(
            "  {:<12} {:<22} {:<26} {}",
            category.key(),
            threshold,
            shape,
            members.join(", ")
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    });

    // 1) Config: profile (CLI > env > default), env overrides, CLI overrides.
    let effective = resolve_effective_profile(cli.profile);
    effective.log_startup();

    let mut cfg = Config::from_env_or_profile(effective.profile);
    if let Some(users) = cli.users {
        cfg.workload.num_users = users;
    }
    if let Some(duration) = cli.duration {
        cfg.workload.duration = duration;
    }

    // 2) Offline: policy catalog.
    let scores = ScoreTable::from_yaml_file(&cli.scores)
        .with_context(|| format!("failed to load scores from {}", cli.scores.display()))?;

    let catalog = match &cli.catalog {
        Some(path) => PolicyCatalog::load_or_build(path, &scores, &cfg)
            .with_context(|| format!("failed to load or build catalog at {}", path.display()))?,
        None => PolicyCatalog::build(&scores, &cfg).context("failed to build policy catalog")?,
    };
    print_catalog(&catalog);

    // 3) Online: one synthetic run.
    let recipes = RecipeBook::default();
    let workload = SyntheticWorkload::generate(&cfg.workload, &recipes, cli.seed)
        .context("failed to generate workload")?;
    info!(
        users = cfg.workload.num_users,
        requests = workload.requests.len(),
        decisions = workload.decision_count(),
        "workload generated"
    );

    let sink = (build_sink(cli.decisions_jsonl.as_ref())?, SeriesSink::new());
    let mut controller = DecisionController::new(&catalog, cfg.energy, sink);
    controller.replay(&workload.events);
    let fallbacks: Vec<String> = controller
        .fallback_parameters()
        .into_iter()
        .map(str::to_string)
        .collect();
    let (stats, (_, series)) = controller.finish();
    let totals = RunTotals::from_stats(&stats);

    // 4) Summary.
    println!("== run summary (seed {}) ==", cli.seed);
    println!("  profile         : {} ({})", effective.profile.as_str(), effective.source.as_str());
    println!("  decisions       : {}", totals.decisions);
    println!(
        "  sensor fetches  : {} ({:.1}%)",
        totals.fetches,
        100.0 * totals.fetch_ratio()
    );
    println!("  cache hits      : {}", totals.cache_hits);
    println!("  cold starts     : {}", totals.cold_starts);
    println!("  fallbacks       : {}", totals.fallbacks);
    println!("  energy          : {:.2}", totals.energy);
    println!("  mean latency ms : {:.2}", totals.mean_latency_ms());
    if let Some(peak) = series
        .iter()
        .max_by(|a, b| a.1.fetches.cmp(&b.1.fetches).then(b.0.cmp(&a.0)))
    {
        println!("  busiest step    : t={} ({} fetches)", peak.0, peak.1.fetches);
    }
    if !fallbacks.is_empty() {
        println!("  fell back       : {}", fallbacks.join(", "));
    }

    Ok(())
}
