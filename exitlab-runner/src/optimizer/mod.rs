//! Grid search optimizer — backtest many strategy variants against a dataset.
//!
//! Each parameter combination is applied to the base strategy and replayed
//! over every position in the dataset. Combinations run on a rayon pool of
//! `max_workers` threads and their results are collected over a channel as
//! they complete. A failing combination is recorded with its error and does
//! not stop the batch. The cancel flag is checked before each combination
//! starts; work already running finishes.

pub mod grid;
pub mod params;
pub mod pareto;
pub mod sensitivity;

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use exitlab_core::domain::{ExitStrategy, PositionId};
use exitlab_core::engine::{simulate_with_mirror, SimulationError, SimulationResult};

use crate::config::{CombinationId, ConfigError, OptimizerConfig};
use crate::data_loader::Dataset;
use crate::metrics::BacktestMetrics;
use crate::objective::Objective;

use self::grid::Combination;
use self::params::apply_parameters;
use self::sensitivity::ParameterSensitivity;

pub use self::pareto::pareto_frontier;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("dataset has no positions")]
    EmptyDataset,
    #[error("no price history for position '{0}'")]
    MissingHistory(PositionId),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Outcome of one combination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub combination_id: CombinationId,
    /// Index in the full grid.
    pub index: usize,
    pub parameters: BTreeMap<String, Decimal>,
    /// Primary objective; `None` when the combination failed.
    pub objective: Option<f64>,
    /// Secondary objectives, in configured order.
    pub secondary: Vec<f64>,
    pub metrics: Option<BacktestMetrics>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl OptimizationResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.objective.is_some()
    }
}

/// Progress update sent after each completed combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub last_combination: CombinationId,
    pub best_objective: Option<f64>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationSummary {
    pub name: String,
    pub objective: Objective,
    pub secondary_objectives: Vec<Objective>,
    pub dataset_hash: String,
    /// Size of the full grid.
    pub grid_size: usize,
    /// Combinations selected to run (the grid, or its sample).
    pub planned: usize,
    pub completed: usize,
    pub failed: usize,
    /// Not started because of cancellation.
    pub skipped: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    /// Every finished combination, in completion order.
    pub results: Vec<OptimizationResult>,
    pub best: Option<OptimizationResult>,
    /// Empty unless secondary objectives are configured.
    pub pareto_frontier: Vec<OptimizationResult>,
    pub sensitivity: BTreeMap<String, ParameterSensitivity>,
}

impl OptimizationSummary {
    /// Successful results, best primary objective first.
    pub fn ranked(&self) -> Vec<&OptimizationResult> {
        let mut ranked: Vec<&OptimizationResult> =
            self.results.iter().filter(|r| r.is_success()).collect();
        ranked.sort_by(|a, b| by_objective(a, b));
        ranked
    }

    pub fn failures(&self) -> impl Iterator<Item = &OptimizationResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Descending primary objective, then combination id.
fn by_objective(a: &OptimizationResult, b: &OptimizationResult) -> CmpOrdering {
    let key = |r: &OptimizationResult| r.objective.unwrap_or(f64::NEG_INFINITY);
    key(b)
        .total_cmp(&key(a))
        .then_with(|| a.combination_id.cmp(&b.combination_id))
}

pub(crate) fn sort_by_objective(results: &mut [OptimizationResult]) {
    results.sort_by(by_objective);
}

enum Outcome {
    Done(OptimizationResult),
    Skipped,
}

/// Run one strategy over every position in the dataset.
pub fn backtest(
    strategy: &ExitStrategy,
    dataset: &Dataset,
) -> Result<Vec<SimulationResult>, SimulationError> {
    dataset
        .positions()
        .iter()
        .filter_map(|record| dataset.history(&record.id).map(|h| (record, h)))
        .map(|(record, history)| {
            let result = simulate_with_mirror(
                strategy,
                record.entry_price,
                record.entry_time,
                history,
                record.mirror_exit_at,
            )?;
            Ok(match record.actual_pnl_pct() {
                Some(actual) => result.with_actual(actual),
                None => result,
            })
        })
        .collect()
}

fn evaluate(
    config: &OptimizerConfig,
    combination: &Combination,
    dataset: &Dataset,
) -> OptimizationResult {
    let started = Instant::now();
    let combination_id = combination.id();
    let outcome = apply_parameters(&config.base_strategy, &combination.params, &combination_id)
        .map_err(|e| format!("invalid strategy: {e}"))
        .and_then(|strategy| backtest(&strategy, dataset).map_err(|e| e.to_string()));

    let mut result = OptimizationResult {
        combination_id,
        index: combination.index,
        parameters: combination.named(),
        ..OptimizationResult::default()
    };
    match outcome {
        Ok(simulations) => {
            let metrics = BacktestMetrics::compute(&simulations);
            result.objective = Some(config.objective.extract(&metrics));
            result.secondary = config
                .secondary_objectives
                .iter()
                .map(|o| o.extract(&metrics))
                .collect();
            result.metrics = Some(metrics);
        }
        Err(error) => result.error = Some(error),
    }
    result.elapsed_ms = started.elapsed().as_millis() as u64;
    result
}

/// Run the grid search.
///
/// # Arguments
/// - `config`: grid, base strategy, sampling, workers, objectives.
/// - `dataset`: positions and histories every combination is replayed over.
/// - `progress_cb`: optional callback invoked after each completed combination.
/// - `cancel`: optional flag to stop starting new combinations.
pub fn optimize(
    config: &OptimizerConfig,
    dataset: &Dataset,
    progress_cb: Option<&dyn Fn(&OptimizationProgress)>,
    cancel: Option<&AtomicBool>,
) -> Result<OptimizationSummary, OptimizeError> {
    config.validate()?;
    if dataset.is_empty() {
        return Err(OptimizeError::EmptyDataset);
    }
    if let Some(missing) = dataset
        .positions()
        .iter()
        .find(|p| dataset.history(&p.id).is_none())
    {
        return Err(OptimizeError::MissingHistory(missing.id.clone()));
    }

    let start_time = Instant::now();
    let grid = config.grid()?;
    let grid_size = grid.size().unwrap_or(usize::MAX);
    let plan = grid.plan(config.max_combinations, config.sample_if_exceed, config.seed)?;
    let planned = plan.len();
    info!(
        name = %config.name,
        grid_size,
        planned,
        workers = config.max_workers,
        positions = dataset.len(),
        "optimization started"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_workers)
        .build()?;
    let (tx, rx) = mpsc::channel::<Outcome>();

    let mut results: Vec<OptimizationResult> = Vec::with_capacity(planned);
    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    let mut best_objective: Option<f64> = None;

    pool.in_place_scope(|scope| {
        for index in plan {
            let combination = grid.combination(index);
            let tx = tx.clone();
            scope.spawn(move |_| {
                let outcome = if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                    Outcome::Skipped
                } else {
                    Outcome::Done(evaluate(config, &combination, dataset))
                };
                // Receiver outlives every job in this scope.
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        for outcome in rx.iter() {
            let result = match outcome {
                Outcome::Skipped => {
                    skipped += 1;
                    continue;
                }
                Outcome::Done(result) => result,
            };
            match (&result.error, result.objective) {
                (Some(error), _) => {
                    failed += 1;
                    warn!(combination = %result.combination_id, %error, "combination failed");
                }
                (None, objective) => {
                    completed += 1;
                    if let Some(value) = objective {
                        if best_objective.map_or(true, |b| config.objective.is_better(value, b)) {
                            best_objective = Some(value);
                        }
                    }
                    debug!(
                        combination = %result.combination_id,
                        objective = ?result.objective,
                        "combination complete"
                    );
                }
            }
            if let Some(cb) = progress_cb {
                cb(&OptimizationProgress {
                    completed,
                    failed,
                    total: planned,
                    last_combination: result.combination_id.clone(),
                    best_objective,
                    elapsed_secs: start_time.elapsed().as_secs_f64(),
                });
            }
            results.push(result);
        }
    });

    let cancelled = skipped > 0 || cancel.is_some_and(|f| f.load(Ordering::Relaxed));
    let best = results
        .iter()
        .filter(|r| r.is_success())
        .min_by(|a, b| by_objective(a, b))
        .cloned();
    let pareto_frontier = if config.secondary_objectives.is_empty() {
        Vec::new()
    } else {
        pareto::pareto_frontier(&results)
    };
    let sensitivity = sensitivity::analyze(&results);
    let elapsed_ms = start_time.elapsed().as_millis() as u64;

    info!(
        name = %config.name,
        completed,
        failed,
        skipped,
        cancelled,
        best = ?best.as_ref().and_then(|b| b.objective),
        elapsed_ms,
        "optimization finished"
    );

    Ok(OptimizationSummary {
        name: config.name.clone(),
        objective: config.objective,
        secondary_objectives: config.secondary_objectives.clone(),
        dataset_hash: dataset.dataset_hash.clone(),
        grid_size,
        planned,
        completed,
        failed,
        skipped,
        cancelled,
        elapsed_ms,
        results,
        best,
        pareto_frontier,
        sensitivity,
    })
}
