//! Serializable strategy and optimizer configuration.
//!
//! Strategies load from TOML either one per file or as a `[[strategies]]`
//! array. Every load path validates; an invalid strategy never reaches the
//! simulator.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use exitlab_core::domain::{ExitStrategy, StrategyId, ValidationError};

use crate::objective::Objective;
use crate::optimizer::grid::ParamGrid;
use crate::optimizer::params::ParamName;

/// Content-addressable id of one parameter combination.
pub type CombinationId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid strategy '{id}': {source}")]
    Strategy {
        id: StrategyId,
        #[source]
        source: ValidationError,
    },
    #[error("duplicate strategy id '{0}'")]
    DuplicateStrategy(StrategyId),
    #[error("no strategies found in {0}")]
    NoStrategies(PathBuf),
    #[error("unknown optimizer parameter '{0}'")]
    UnknownParameter(String),
    #[error("parameter '{0}' has no values")]
    EmptyRange(String),
    #[error("parameter '{name}' value {value} is invalid: {reason}")]
    InvalidValue {
        name: String,
        value: Decimal,
        reason: &'static str,
    },
    #[error("no parameter ranges configured")]
    NoParameters,
    #[error("max_workers must be at least 1")]
    NoWorkers,
    #[error("max_combinations must be at least 1")]
    ZeroMaxCombinations,
    #[error(
        "grid has {combinations} combinations, more than max_combinations = {max} (set sample_if_exceed to sample)"
    )]
    TooManyCombinations { combinations: String, max: usize },
    #[error("objective '{0}' listed as both primary and secondary")]
    DuplicateObjective(Objective),
}

// ─── Strategies ─────────────────────────────────────────────────────

/// On-disk layout of a strategy file.
#[derive(Deserialize)]
#[serde(untagged)]
enum StrategyFile {
    Set { strategies: Vec<ExitStrategy> },
    Single(ExitStrategy),
}

/// Validated, id-unique collection of strategies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategySet {
    pub strategies: Vec<ExitStrategy>,
}

impl StrategySet {
    pub fn new(strategies: Vec<ExitStrategy>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for s in &strategies {
            s.validate().map_err(|source| ConfigError::Strategy {
                id: s.id.clone(),
                source,
            })?;
            if !seen.insert(s.id.clone()) {
                return Err(ConfigError::DuplicateStrategy(s.id.clone()));
            }
        }
        Ok(Self { strategies })
    }

    /// Parse either a single strategy table or a `[[strategies]]` array.
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let strategies = match toml::from_str::<StrategyFile>(input)? {
            StrategyFile::Set { strategies } => strategies,
            StrategyFile::Single(s) => vec![s],
        };
        Self::new(strategies)
    }

    /// Load from a file, or from every `*.toml` file in a directory (sorted by name).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let files = if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let mut files: Vec<PathBuf> = entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut strategies = Vec::new();
        for file in &files {
            strategies.extend(Self::from_toml(&read_to_string(file)?)?.strategies);
        }
        if strategies.is_empty() {
            return Err(ConfigError::NoStrategies(path.to_path_buf()));
        }
        Self::new(strategies)
    }

    /// Merge several sources, rejecting duplicate ids across them.
    pub fn load_all(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut strategies = Vec::new();
        for path in paths {
            strategies.extend(Self::load(path)?.strategies);
        }
        Self::new(strategies)
    }

    pub fn get(&self, id: &StrategyId) -> Option<&ExitStrategy> {
        self.strategies.iter().find(|s| &s.id == id)
    }

    pub fn ids(&self) -> Vec<StrategyId> {
        self.strategies.iter().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Parse exactly one strategy.
pub fn parse_strategy(input: &str) -> Result<ExitStrategy, ConfigError> {
    let strategy: ExitStrategy = toml::from_str(input)?;
    strategy.validate().map_err(|source| ConfigError::Strategy {
        id: strategy.id.clone(),
        source,
    })?;
    Ok(strategy)
}

pub(crate) fn read_to_string(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ─── Optimizer ──────────────────────────────────────────────────────

fn default_name() -> String {
    "optimization".to_string()
}

fn default_max_combinations() -> usize {
    1000
}

fn default_seed() -> u64 {
    42
}

fn default_max_workers() -> usize {
    4
}

/// Grid search configuration.
///
/// ```toml
/// name = "trailing-sweep"
/// max_combinations = 100
/// sample_if_exceed = true
/// seed = 7
/// objective = "total_pnl"
/// secondary_objectives = ["win_rate"]
///
/// [base_strategy]
/// id = "base"
/// name = "Base"
///
/// [parameter_ranges]
/// "trailing.distance_percentage" = [10, 20, 30]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Strategy every combination is applied to.
    pub base_strategy: ExitStrategy,
    /// Parameter name → candidate values. Ordered by name.
    pub parameter_ranges: BTreeMap<String, Vec<Decimal>>,
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,
    #[serde(default)]
    pub sample_if_exceed: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub objective: Objective,
    #[serde(default)]
    pub secondary_objectives: Vec<Objective>,
}

impl OptimizerConfig {
    pub fn new(base_strategy: ExitStrategy) -> Self {
        Self {
            name: default_name(),
            base_strategy,
            parameter_ranges: BTreeMap::new(),
            max_combinations: default_max_combinations(),
            sample_if_exceed: false,
            seed: default_seed(),
            max_workers: default_max_workers(),
            objective: Objective::default(),
            secondary_objectives: Vec::new(),
        }
    }

    pub fn with_range(mut self, name: impl Into<String>, values: Vec<Decimal>) -> Self {
        self.parameter_ranges.insert(name.into(), values);
        self
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&read_to_string(path)?)
    }

    /// Check names, values, limits, and the grid size against the sampling policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_combinations == 0 {
            return Err(ConfigError::ZeroMaxCombinations);
        }
        if self.secondary_objectives.contains(&self.objective) {
            return Err(ConfigError::DuplicateObjective(self.objective));
        }
        self.base_strategy
            .validate()
            .map_err(|source| ConfigError::Strategy {
                id: self.base_strategy.id.clone(),
                source,
            })?;

        let grid = self.grid()?;
        match grid.size() {
            Some(n) if n <= self.max_combinations => Ok(()),
            Some(_) if self.sample_if_exceed => Ok(()),
            size => Err(ConfigError::TooManyCombinations {
                combinations: size
                    .map_or_else(|| "more than usize::MAX".to_string(), |n| n.to_string()),
                max: self.max_combinations,
            }),
        }
    }

    /// Parse parameter names and build the grid.
    pub fn grid(&self) -> Result<ParamGrid, ConfigError> {
        if self.parameter_ranges.is_empty() {
            return Err(ConfigError::NoParameters);
        }
        let mut axes = Vec::with_capacity(self.parameter_ranges.len());
        for (name, values) in &self.parameter_ranges {
            let param: ParamName = name.parse()?;
            if values.is_empty() {
                return Err(ConfigError::EmptyRange(name.clone()));
            }
            param.check_applicable(&self.base_strategy)?;
            for value in values {
                param.check_value(*value)?;
            }
            axes.push((param, values.clone()));
        }
        Ok(ParamGrid::new(axes))
    }

    /// Primary objective followed by the secondaries.
    pub fn objectives(&self) -> Vec<Objective> {
        std::iter::once(self.objective)
            .chain(self.secondary_objectives.iter().copied())
            .collect()
    }
}
