//! ExitLab Runner — strategy comparison, grid-search optimization, export.
//!
//! This crate builds on `exitlab-core` to provide:
//! - Strategy and optimizer config loading from TOML
//! - Dataset loading (ground-truth manifest + CSV price histories)
//! - Side-by-side strategy comparison against real outcomes
//! - Grid search with seeded sampling, bounded concurrency, and cancellation
//! - Pareto frontier and per-parameter sensitivity
//! - CSV, JSON, and Markdown export

pub mod comparator;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod objective;
pub mod optimizer;

pub use comparator::{
    CompareError, ComparisonResult, ComparisonRow, PositionDataSource, StrategyCatalog,
    StrategyComparator,
};
pub use config::{CombinationId, ConfigError, OptimizerConfig, StrategySet};
pub use data_loader::{load_price_history, Dataset, LoadError, PositionRecord};
pub use metrics::BacktestMetrics;
pub use objective::Objective;
pub use optimizer::sensitivity::ParameterSensitivity;
pub use optimizer::{
    backtest, optimize, pareto_frontier, OptimizationProgress, OptimizationResult,
    OptimizationSummary, OptimizeError,
};
