//! Strategy comparison — replay one position under several strategies.
//!
//! Missing inputs are hard failures: a position without a price history or
//! ground-truth record is an error, never a silently empty comparison.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use exitlab_core::domain::{ExitStrategy, PositionId, PricePoint, StrategyId};
use exitlab_core::engine::{simulate_with_mirror, SimulationError, SimulationResult};

use crate::config::StrategySet;
use crate::data_loader::{Dataset, PositionRecord};

/// Supplies already-fetched price histories and ground truth.
pub trait PositionDataSource {
    fn price_history(&self, id: &PositionId) -> Option<&[PricePoint]>;
    fn ground_truth(&self, id: &PositionId) -> Option<&PositionRecord>;
}

/// Resolves strategy ids.
pub trait StrategyCatalog {
    fn strategy(&self, id: &StrategyId) -> Option<&ExitStrategy>;
}

impl PositionDataSource for Dataset {
    fn price_history(&self, id: &PositionId) -> Option<&[PricePoint]> {
        self.history(id)
    }

    fn ground_truth(&self, id: &PositionId) -> Option<&PositionRecord> {
        self.position(id)
    }
}

impl StrategyCatalog for StrategySet {
    fn strategy(&self, id: &StrategyId) -> Option<&ExitStrategy> {
        self.get(id)
    }
}

impl StrategyCatalog for [ExitStrategy] {
    fn strategy(&self, id: &StrategyId) -> Option<&ExitStrategy> {
        self.iter().find(|s| &s.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompareError {
    #[error("no price history for position '{0}'")]
    NoPriceHistory(PositionId),
    #[error("no ground-truth record for position '{0}'")]
    UnknownPosition(PositionId),
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(StrategyId),
    #[error("no strategies to compare")]
    NoStrategies,
    #[error("simulation of '{strategy}' failed: {source}")]
    Simulation {
        strategy: StrategyId,
        #[source]
        source: SimulationError,
    },
}

/// One strategy's line in a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub result: SimulationResult,
    pub is_best: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub position_id: PositionId,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub actual_pnl_pct: Option<Decimal>,
    /// In the order the strategies were requested.
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonResult {
    pub fn best(&self) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.is_best)
    }

    /// Markdown table of the comparison.
    pub fn to_markdown(&self) -> String {
        let mut md = String::with_capacity(512);
        md.push_str(&format!("## Position {}\n\n", self.position_id));
        md.push_str(&format!(
            "Entry {} at {}",
            self.entry_price,
            self.entry_time.to_rfc3339()
        ));
        match self.actual_pnl_pct {
            Some(actual) => md.push_str(&format!(", actual P&L {:.2}%\n\n", actual)),
            None => md.push_str(", no actual exit\n\n"),
        }

        md.push_str("| Strategy | Simulated P&L % | Delta % | Exits | Remaining % | Best |\n");
        md.push_str("| --- | ---: | ---: | ---: | ---: | :---: |\n");
        for row in &self.rows {
            let r = &row.result;
            md.push_str(&format!(
                "| {} | {:.2} | {} | {} | {:.2} | {} |\n",
                r.strategy_name,
                r.simulated_pnl_pct,
                r.delta_pct
                    .map_or_else(|| "-".to_string(), |d| format!("{:.2}", d)),
                r.exits.len(),
                r.remaining_percentage,
                if row.is_best { "*" } else { "" },
            ));
        }
        md
    }
}

/// Runs comparisons against a data source and a strategy catalog.
pub struct StrategyComparator<'a, D: ?Sized, C: ?Sized> {
    data: &'a D,
    catalog: &'a C,
}

impl<'a, D, C> StrategyComparator<'a, D, C>
where
    D: PositionDataSource + ?Sized,
    C: StrategyCatalog + ?Sized,
{
    pub fn new(data: &'a D, catalog: &'a C) -> Self {
        Self { data, catalog }
    }

    /// Simulate `position_id` under each strategy and mark the best.
    ///
    /// The best row is the highest simulated P&L; on a tie the earliest
    /// requested strategy wins.
    pub fn compare(
        &self,
        position_id: &PositionId,
        strategy_ids: &[StrategyId],
    ) -> Result<ComparisonResult, CompareError> {
        if strategy_ids.is_empty() {
            return Err(CompareError::NoStrategies);
        }
        let record = self
            .data
            .ground_truth(position_id)
            .ok_or_else(|| CompareError::UnknownPosition(position_id.clone()))?;
        let history = self
            .data
            .price_history(position_id)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CompareError::NoPriceHistory(position_id.clone()))?;
        let actual = record.actual_pnl_pct();

        let mut rows = Vec::with_capacity(strategy_ids.len());
        for id in strategy_ids {
            let strategy = self
                .catalog
                .strategy(id)
                .ok_or_else(|| CompareError::UnknownStrategy(id.clone()))?;
            let mut result = simulate_with_mirror(
                strategy,
                record.entry_price,
                record.entry_time,
                history,
                record.mirror_exit_at,
            )
            .map_err(|source| CompareError::Simulation {
                strategy: id.clone(),
                source,
            })?;
            if let Some(actual) = actual {
                result = result.with_actual(actual);
            }
            rows.push(ComparisonRow {
                result,
                is_best: false,
            });
        }

        let best = rows
            .iter()
            .enumerate()
            .fold(None::<(usize, Decimal)>, |best, (i, row)| {
                let pnl = row.result.simulated_pnl_pct;
                match best {
                    Some((_, top)) if top >= pnl => best,
                    _ => Some((i, pnl)),
                }
            });
        if let Some((i, pnl)) = best {
            rows[i].is_best = true;
            info!(
                position = %position_id,
                best = %rows[i].result.strategy_id,
                pnl_pct = %pnl.round_dp(2),
                strategies = rows.len(),
                "comparison complete"
            );
        }

        Ok(ComparisonResult {
            position_id: position_id.clone(),
            entry_price: record.entry_price,
            entry_time: record.entry_time,
            actual_pnl_pct: actual,
            rows,
        })
    }

    /// Compare every strategy in request order against each listed position.
    pub fn compare_many(
        &self,
        position_ids: &[PositionId],
        strategy_ids: &[StrategyId],
    ) -> Result<Vec<ComparisonResult>, CompareError> {
        position_ids
            .iter()
            .map(|id| self.compare(id, strategy_ids))
            .collect()
    }
}
