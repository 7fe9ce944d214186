use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};
use vigil_runtime::{normalize_l1, SledStateStore, StateStore, ValidatorConfig};
use vigil_types::{ValidatorState, WorkerSnapshot, VOLUME_WINDOW};

/// Command-line interface for Vigil validator state.
///
/// Operates on a state database that is not open by a running validator.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// Validator configuration file; supplies the storage path and log level.
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,

    /// State database directory. Overrides the configured storage path.
    #[clap(long, short, global = true)]
    storage: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the persisted validator state
    Inspect,

    /// Preview the normalized weight vector the validator would publish
    Weights {
        /// Number of highest and lowest weighted workers to show
        #[clap(long, default_value = "10")]
        top: usize,
    },

    /// Write the persisted state as pretty JSON
    Export {
        /// Output file
        #[clap(long, short)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct ScoreStats {
    min: f64,
    max: f64,
    mean: f64,
    nonzero: usize,
}

fn score_stats(scores: &[f64]) -> Option<ScoreStats> {
    if scores.is_empty() {
        return None;
    }
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let nonzero = scores.iter().filter(|s| **s != 0.0).count();
    Some(ScoreStats { min, max, mean, nonzero })
}

/// Live-slot weights sorted from highest to lowest, as `(worker index, weight)`.
fn ranked_weights(state: &ValidatorState) -> Vec<(usize, f64)> {
    let live = state.identities.len().min(state.scores.len());
    let mut ranked: Vec<(usize, f64)> = normalize_l1(&state.scores[..live])
        .into_iter()
        .enumerate()
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

fn load_state(storage: &Path) -> Result<ValidatorState> {
    let store = SledStateStore::open(storage)?;
    let state = store
        .load(&WorkerSnapshot::default())
        .with_context(|| format!("Failed to load validator state from {:?}", storage))?;
    tracing::info!(path = ?storage, step = state.step, workers = state.identities.len(), "Loaded validator state");
    Ok(state)
}

fn inspect(state: &ValidatorState) {
    println!("{}", "Validator state".blue().bold());
    println!("Step: {}", state.step);
    println!("Workers: {}", state.identities.len());
    println!("Score slots: {}", state.scores.len());

    match score_stats(&state.scores) {
        Some(stats) => println!(
            "Scores: min {:.6}  max {:.6}  mean {:.6}  nonzero {}",
            stats.min, stats.max, stats.mean, stats.nonzero
        ),
        None => println!("Scores: {}", "none".yellow()),
    }

    println!(
        "{}",
        format!("Volume window ({}/{} tempos)", state.volumes.len(), VOLUME_WINDOW).blue().bold()
    );
    for record in state.volumes.records() {
        let total: u64 = record.activity.values().sum();
        println!(
            "  tempo {:>8}: {} workers, {} items",
            record.tempo,
            record.activity.len(),
            total
        );
    }

    let fingerprints: usize = state.dedupe.values().map(|set| set.len()).sum();
    println!(
        "Dedupe sets: {} workers, {} fingerprints",
        state.dedupe.len(),
        fingerprints
    );
}

fn weights(state: &ValidatorState, top: usize) {
    let ranked = ranked_weights(state);
    if ranked.is_empty() {
        println!("{}", "No workers in state".yellow());
        return;
    }
    let sum: f64 = ranked.iter().map(|(_, w)| w).sum();

    println!("{}", "Highest weights".green().bold());
    for (index, weight) in ranked.iter().take(top) {
        println!("  {:>5}  {:.6}  {}", index, weight, state.identities[*index]);
    }
    if ranked.len() > top {
        println!("{}", "Lowest weights".red().bold());
        let skip = ranked.len().saturating_sub(top).max(top);
        for (index, weight) in ranked.iter().skip(skip) {
            println!("  {:>5}  {:.6}  {}", index, weight, state.identities[*index]);
        }
    }
    println!("Sum of weights: {:.6}", sum);
}

fn export(state: &ValidatorState, out: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("Failed to serialize validator state")?;
    fs::write(out, &json).with_context(|| format!("Failed to write {:?}", out))?;
    tracing::debug!(path = ?out, bytes = json.len(), "Wrote state export");
    println!("{} {}", "Exported state to".green(), out.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ValidatorConfig::from_file(path)?,
        None => ValidatorConfig::default(),
    };

    let log_level_str = config.log_level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level_str))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(filter).init();

    let storage = cli.storage.unwrap_or_else(|| config.storage_path.clone());
    let state = load_state(&storage)?;

    match cli.command {
        Commands::Inspect => inspect(&state),
        Commands::Weights { top } => weights(&state, top),
        Commands::Export { out } => export(&state, &out)?,
    }
    Ok(())
}
