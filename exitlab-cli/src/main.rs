//! ExitLab CLI — simulate, compare, and optimize exit strategies.
//!
//! Commands:
//! - `simulate` — replay one price history against one strategy
//! - `compare` — run several strategies on a position and rank them against
//!   what actually happened
//! - `optimize` — grid-search strategy parameters over a dataset and save
//!   rankings, Pareto frontier, and sensitivity artifacts

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use exitlab_core::domain::{ExitStrategy, PositionId, StrategyId};
use exitlab_core::engine::{simulate_with_mirror, SimulationResult};
use exitlab_runner::data_loader::load_ground_truth;
use exitlab_runner::export::{
    export_comparison_csv, export_exits_csv, export_simulation_json, save_optimization_artifacts,
};
use exitlab_runner::{
    load_price_history, optimize, Dataset, OptimizationProgress, OptimizationSummary,
    OptimizerConfig, StrategyComparator, StrategySet,
};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "exitlab",
    about = "ExitLab CLI — backtest and tune exit strategies against price histories"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG still wins when set).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a price history against one strategy.
    Simulate {
        /// Strategy TOML (a single strategy or a [[strategies]] set).
        #[arg(long)]
        strategy: PathBuf,

        /// Strategy id to pick when the file holds several.
        #[arg(long)]
        id: Option<String>,

        /// Price history CSV (timestamp,price).
        #[arg(long)]
        history: PathBuf,

        #[arg(long)]
        entry_price: Decimal,

        /// Entry time (RFC 3339). Defaults to the first history point.
        #[arg(long)]
        entry_time: Option<String>,

        /// When the tracked source wallet exited (RFC 3339).
        #[arg(long)]
        mirror_exit_at: Option<String>,

        /// Print the full result as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Write the exit tape to this CSV file.
        #[arg(long)]
        exits_csv: Option<PathBuf>,
    },
    /// Compare strategies on one position against its real outcome.
    Compare {
        /// Strategy TOML files or directories of them.
        #[arg(long, required = true, num_args = 1..)]
        strategies: Vec<PathBuf>,

        /// Price history CSV for the position.
        #[arg(long)]
        history: PathBuf,

        /// Ground-truth TOML ([[positions]]).
        #[arg(long)]
        ground_truth: PathBuf,

        /// Position id. Required when the ground truth lists several.
        #[arg(long)]
        position: Option<String>,

        /// Only these strategy ids, in this order. Defaults to all loaded.
        #[arg(long, num_args = 1..)]
        only: Vec<String>,

        /// Write the comparison table to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Grid-search strategy parameters over a dataset.
    Optimize {
        /// Optimizer TOML config.
        #[arg(long)]
        config: PathBuf,

        /// Dataset directory (positions.toml + one CSV per position).
        #[arg(long)]
        dataset: PathBuf,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Override the configured worker count.
        #[arg(long)]
        workers: Option<usize>,

        /// Override the configured sampling seed.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Simulate {
            strategy,
            id,
            history,
            entry_price,
            entry_time,
            mirror_exit_at,
            json,
            exits_csv,
        } => run_simulate(
            &strategy,
            id.as_deref(),
            &history,
            entry_price,
            entry_time.as_deref(),
            mirror_exit_at.as_deref(),
            json,
            exits_csv.as_deref(),
        ),
        Commands::Compare {
            strategies,
            history,
            ground_truth,
            position,
            only,
            csv,
        } => run_compare(
            &strategies,
            &history,
            &ground_truth,
            position.as_deref(),
            &only,
            csv.as_deref(),
        ),
        Commands::Optimize {
            config,
            dataset,
            output_dir,
            workers,
            seed,
        } => run_optimize(&config, &dataset, &output_dir, workers, seed),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_time(value: &str, flag: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("{flag}: expected an RFC 3339 timestamp, got '{value}'"))
}

fn pick_strategy(set: StrategySet, id: Option<&str>) -> Result<ExitStrategy> {
    match id {
        Some(id) => set
            .get(&StrategyId::from(id))
            .cloned()
            .with_context(|| format!("strategy '{id}' not found; available: {:?}", set.ids())),
        None if set.len() == 1 => Ok(set
            .strategies
            .into_iter()
            .next()
            .context("empty strategy set")?),
        None => bail!(
            "file holds {} strategies; pick one with --id (available: {:?})",
            set.len(),
            set.ids()
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_simulate(
    strategy_path: &Path,
    id: Option<&str>,
    history_path: &Path,
    entry_price: Decimal,
    entry_time: Option<&str>,
    mirror_exit_at: Option<&str>,
    json: bool,
    exits_csv: Option<&Path>,
) -> Result<()> {
    let strategy = pick_strategy(StrategySet::load(strategy_path)?, id)?;
    let history = load_price_history(history_path)?;
    let entry_time = match entry_time {
        Some(value) => parse_time(value, "--entry-time")?,
        None => history
            .first()
            .map(|p| p.timestamp)
            .context("price history is empty")?,
    };
    let mirror_exit_at = mirror_exit_at
        .map(|value| parse_time(value, "--mirror-exit-at"))
        .transpose()?;

    let result =
        simulate_with_mirror(&strategy, entry_price, entry_time, &history, mirror_exit_at)?;

    if json {
        println!("{}", export_simulation_json(&result)?);
    } else {
        print_simulation(&result);
    }
    if let Some(path) = exits_csv {
        std::fs::write(path, export_exits_csv(&result)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Exit tape saved to: {}", path.display());
    }
    Ok(())
}

fn print_simulation(result: &SimulationResult) {
    println!();
    println!("=== Simulation: {} ===", result.strategy_name);
    println!("Entry:          {} at {}", result.entry_price, result.entry_time.to_rfc3339());
    println!("Ticks:          {}", result.ticks_processed);
    println!("Peak:           {}", result.peak_price);
    println!("Final:          {}", result.final_price);
    println!();
    println!("--- Exits ---");
    if result.exits.is_empty() {
        println!("(none)");
    }
    for e in &result.exits {
        println!(
            "#{:<5} {}  {:<16} sell {:>6.2}% at {}  ({:+.2}%)",
            e.tick_index,
            e.timestamp.to_rfc3339(),
            e.decision.reason.as_str(),
            e.decision.sell_percentage,
            e.decision.trigger_price,
            e.pnl_contribution_pct,
        );
    }
    println!();
    println!("--- P&L ---");
    println!("Realized:       {:.2}%", result.realized_pnl_pct);
    println!("Unrealized:     {:.2}%", result.unrealized_pnl_pct);
    println!("Simulated:      {:.2}%", result.simulated_pnl_pct);
    println!("Remaining:      {:.2}%", result.remaining_percentage);
    if let Some(trigger) = &result.trailing_trigger {
        println!(
            "Trailing:       peak {}x, exit {}x, captured {:.1}%",
            trigger.peak_multiplier.round_dp(2),
            trigger.exit_multiplier.round_dp(2),
            trigger.profit_captured_pct,
        );
    }
}

fn run_compare(
    strategy_paths: &[PathBuf],
    history_path: &Path,
    ground_truth_path: &Path,
    position: Option<&str>,
    only: &[String],
    csv: Option<&Path>,
) -> Result<()> {
    let strategies = StrategySet::load_all(strategy_paths)?;
    let records = load_ground_truth(ground_truth_path)?;
    let record = match position {
        Some(id) => records
            .iter()
            .find(|r| r.id.as_str() == id)
            .cloned()
            .with_context(|| format!("position '{id}' not in {}", ground_truth_path.display()))?,
        None if records.len() == 1 => records[0].clone(),
        None => bail!(
            "ground truth lists {} positions; pick one with --position",
            records.len()
        ),
    };
    let position_id: PositionId = record.id.clone();
    let history = load_price_history(history_path)?;
    let data = Dataset::from_parts(vec![record], HashMap::from([(position_id.clone(), history)]));

    let ids: Vec<StrategyId> = if only.is_empty() {
        strategies.ids()
    } else {
        only.iter().map(|s| StrategyId::from(s.as_str())).collect()
    };

    tracing::debug!(position = %position_id, strategies = ids.len(), "comparing");
    let comparison = StrategyComparator::new(&data, &strategies).compare(&position_id, &ids)?;
    println!("{}", comparison.to_markdown());

    if let Some(path) = csv {
        std::fs::write(path, export_comparison_csv(&comparison)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Comparison saved to: {}", path.display());
    }
    Ok(())
}

fn run_optimize(
    config_path: &Path,
    dataset_dir: &Path,
    output_dir: &Path,
    workers: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let mut config = OptimizerConfig::load(config_path)?;
    if let Some(workers) = workers {
        config.max_workers = workers;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    let dataset = Dataset::load(dataset_dir)?;

    let report = |p: &OptimizationProgress| {
        let done = p.completed + p.failed;
        if done % 25 == 0 || done == p.total {
            eprintln!(
                "[{done}/{}] failed {}  best {}  ({:.1}s)",
                p.total,
                p.failed,
                p.best_objective
                    .map_or_else(|| "-".to_string(), |b| format!("{b:.4}")),
                p.elapsed_secs,
            );
        }
    };
    let summary = optimize(&config, &dataset, Some(&report), None)?;

    print_optimization(&summary);
    let run_dir = save_optimization_artifacts(&summary, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn print_optimization(summary: &OptimizationSummary) {
    println!();
    println!("=== Optimization: {} ===", summary.name);
    println!("Objective:      {}", summary.objective);
    println!("Grid:           {} ({} run)", summary.grid_size, summary.planned);
    println!("Completed:      {}", summary.completed);
    println!("Failed:         {}", summary.failed);
    println!("Elapsed:        {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    if let Some(best) = &summary.best {
        println!();
        println!("--- Best ---");
        for (name, value) in &best.parameters {
            println!("{name:<32} {value}");
        }
        if let Some(objective) = best.objective {
            println!("{:<32} {objective:.4}", summary.objective.as_str());
        }
    }
    if !summary.pareto_frontier.is_empty() {
        println!();
        println!("Pareto frontier: {} combination(s)", summary.pareto_frontier.len());
    }
    let mut sensitivity: Vec<_> = summary.sensitivity.values().collect();
    sensitivity.sort_by(|a, b| b.score.total_cmp(&a.score));
    if let Some(top) = sensitivity.first() {
        println!(
            "Most sensitive:  {} (score {:.4}, best value {})",
            top.parameter, top.score, top.best_value
        );
    }
}
