//! RunTrack Simulator CLI
//!
//! Run deterministic simulated runs through the tracking engine.

use clap::Parser;
use runtrack_core::{MemoryRunStore, RunRecord, RunStore, SledRunStore, TrackerConfig};
use runtrack_sim::scenarios::ScenarioId;
use runtrack_sim::{RunExport, ScenarioResult, ScenarioRunner, SimError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// RunTrack deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "runtrack-sim")]
#[command(about = "Run deterministic simulated runs through the RunTrack engine", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (steady_run, hill_repeats, gps_dropout, pause_resume, signal_loss, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Length of each simulated run in seconds
    #[arg(short, long, default_value = "300")]
    duration: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Persist finished runs to a sled database at this path
    #[arg(long)]
    store: Option<PathBuf>,

    /// Export the run and its ground truth to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Tracker configuration (JSON); missing fields take defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

/// Runs every requested scenario; `Ok(false)` when any failed.
fn run(args: &Args) -> Result<bool, SimError> {
    if !args.json {
        info!("RunTrack Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().map_err(SimError::Config)?]
    };

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        return Err(SimError::Config(
            "--export only supports a single scenario and seed".to_string(),
        ));
    }

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => TrackerConfig::default(),
    };

    let store: Box<dyn RunStore> = match &args.store {
        Some(path) => Box::new(SledRunStore::open(path)?),
        None => Box::new(MemoryRunStore::new()),
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_config(config.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if let Some(record) = &result.record {
                store.save(record)?;
            }

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
                if let Some(record) = &result.record {
                    log_summary(record);
                }
            }

            all_results.push(result);
        }
    }

    if let (Some(path), Some(result)) = (&args.export, all_results.first()) {
        RunExport::from_result(result).write_to_file(path)?;
        info!("Exported {} to {}", result.scenario.name(), path.display());
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();
    let passed = total - failed_count;

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "stored_runs": store.list()?.len(),
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "metrics": r.metrics,
                    "run_id": r.record.as_ref().map(|rec| rec.id.to_string()),
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            // List failed seeds
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed_count == 0)
}

fn load_config(path: &Path) -> Result<TrackerConfig, SimError> {
    let text = std::fs::read_to_string(path)?;
    let config: TrackerConfig = serde_json::from_str(&text)?;
    if config.accuracy_threshold_m <= 0.0 {
        warn!(
            "accuracy_threshold_m = {} rejects every fix for distance",
            config.accuracy_threshold_m
        );
    }
    Ok(config)
}

fn log_summary(record: &RunRecord) {
    let m = &record.metrics;
    info!(
        "  {} | {:.2} km in {:.0} s | {} | {:.0} m gain | {:.0} kcal",
        record.name,
        m.distance_meters / 1000.0,
        m.duration_seconds,
        m.pace_label(),
        m.elevation_gain_meters,
        m.calories_kcal
    );
    if let Some(bounds) = record.bounding_rect() {
        info!(
            "  bounds: ({:.5}, {:.5}) - ({:.5}, {:.5})",
            bounds.min().y,
            bounds.min().x,
            bounds.max().y,
            bounds.max().x
        );
    }
}
