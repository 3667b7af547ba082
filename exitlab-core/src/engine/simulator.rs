//! Position simulator — replay a price history against one exit strategy.
//!
//! Pure function of its inputs: a fresh position and a fresh trailing stop are
//! seeded per call, no shared tracker is touched, and no wall clock or
//! randomness is read. Identical inputs give identical results.
//!
//! Each tick runs the same sequence as the live evaluator:
//! 1. Trailing stop update
//! 2. Regular stop check (only while trailing is INACTIVE)
//! 3. Rule resolution via [`ExitRules`]
//!
//! Decisions are realized at the tick price that triggered them. Whatever is
//! still held when the history ends is marked at the last price.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    ExitDecision, ExitReason, ExitStrategy, Position, PositionId, PricePoint, StrategyId,
    ValidationError,
};
use crate::position_management::{TrailingStop, TrailingStopTrigger};
use crate::rules::{stop_loss_level, ExitRules, RuleInputs};

/// Minimum usable points for a replay.
pub const MIN_HISTORY_POINTS: usize = 2;

/// Nominal size of the simulated position (P&L is reported in percent).
const SIMULATED_SIZE: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("insufficient price data: {available} usable point(s), need at least {required}")]
    InsufficientData { available: usize, required: usize },
    #[error("entry price must be positive, got {0}")]
    InvalidEntryPrice(Decimal),
    #[error("invalid strategy: {0}")]
    Validation(#[from] ValidationError),
}

/// One realized exit in a simulated trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub timestamp: DateTime<Utc>,
    pub tick_index: usize,
    pub decision: ExitDecision,
    /// P&L this sell contributes, in percent of the original position.
    pub pnl_contribution_pct: Decimal,
}

/// Full simulated outcome for one strategy on one history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub strategy_id: StrategyId,
    pub strategy_name: String,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exits: Vec<ExitEvent>,
    /// Realized plus unrealized P&L, percent of the original position.
    pub simulated_pnl_pct: Decimal,
    pub realized_pnl_pct: Decimal,
    pub unrealized_pnl_pct: Decimal,
    /// Share of the original size still held at the end of history.
    pub remaining_percentage: Decimal,
    pub final_price: Decimal,
    pub peak_price: Decimal,
    pub closed_at: Option<DateTime<Utc>>,
    pub ticks_processed: usize,
    pub trailing_trigger: Option<TrailingStopTrigger>,
    /// Ground-truth P&L, when the caller supplied one.
    pub actual_pnl_pct: Option<Decimal>,
    /// `simulated − actual`.
    pub delta_pct: Option<Decimal>,
}

impl SimulationResult {
    /// Attach the ground-truth P&L and compute the delta.
    pub fn with_actual(mut self, actual_pnl_pct: Decimal) -> Self {
        self.actual_pnl_pct = Some(actual_pnl_pct);
        self.delta_pct = Some(self.simulated_pnl_pct - actual_pnl_pct);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Time from entry to full close, if the position closed.
    pub fn hold_duration(&self) -> Option<Duration> {
        self.closed_at.map(|closed| closed - self.entry_time)
    }

    /// Cumulative sold share across all exits.
    pub fn total_sold_pct(&self) -> Decimal {
        self.exits.iter().map(|e| e.decision.sell_percentage).sum()
    }

    pub fn exit_count(&self, reason: ExitReason) -> usize {
        self.exits
            .iter()
            .filter(|e| e.decision.reason == reason)
            .count()
    }
}

/// Replay `history` against `strategy` for a position entered at `entry_price`.
pub fn simulate(
    strategy: &ExitStrategy,
    entry_price: Decimal,
    entry_time: DateTime<Utc>,
    history: &[PricePoint],
) -> Result<SimulationResult, SimulationError> {
    simulate_with_mirror(strategy, entry_price, entry_time, history, None)
}

/// As [`simulate`], with the time the tracked source wallet exited.
///
/// The first tick at or after `mirror_exit_at` carries a mirror-exit signal.
/// Points stamped before `entry_time` are ignored.
pub fn simulate_with_mirror(
    strategy: &ExitStrategy,
    entry_price: Decimal,
    entry_time: DateTime<Utc>,
    history: &[PricePoint],
    mirror_exit_at: Option<DateTime<Utc>>,
) -> Result<SimulationResult, SimulationError> {
    strategy.validate()?;
    if entry_price <= Decimal::ZERO {
        return Err(SimulationError::InvalidEntryPrice(entry_price));
    }

    let ticks: Vec<&PricePoint> = history
        .iter()
        .filter(|p| p.timestamp >= entry_time)
        .collect();
    if ticks.len() < MIN_HISTORY_POINTS {
        return Err(SimulationError::InsufficientData {
            available: ticks.len(),
            required: MIN_HISTORY_POINTS,
        });
    }

    let mut position = Position::new(
        PositionId::new(format!("sim:{}", strategy.id)),
        entry_price,
        entry_time,
        SIMULATED_SIZE,
    );
    let mut trailing = TrailingStop::new(&position, &strategy.trailing_stop);
    let rules = ExitRules::new(strategy);
    let stop_level = stop_loss_level(strategy, &position);

    let mut exits: Vec<ExitEvent> = Vec::new();
    let mut realized = Decimal::ZERO;
    let mut peak_price = entry_price;
    let mut closed_at = None;
    let mut trailing_trigger = None;
    let mut ticks_processed = 0;

    for (tick_index, tick) in ticks.iter().enumerate() {
        ticks_processed += 1;
        peak_price = peak_price.max(tick.price);

        let update = trailing.update(tick.price, tick.timestamp);
        let stop_loss_hit = stop_level
            .is_some_and(|level| trailing.should_use_regular_stop_loss(tick.price, level));
        let inputs = RuleInputs {
            price: tick.price,
            timestamp: tick.timestamp,
            trailing_triggered: update.newly_triggered,
            stop_loss_hit,
            mirror_exit: mirror_exit_at.is_some_and(|at| tick.timestamp >= at),
        };

        if let Some(decision) = rules.decide(&mut position, &inputs) {
            if decision.reason == ExitReason::TrailingStop {
                trailing_trigger = trailing.create_trigger(&position, tick.price);
            }
            let contribution = pnl_contribution(entry_price, tick.price, decision.sell_percentage);
            realized += contribution;
            exits.push(ExitEvent {
                timestamp: tick.timestamp,
                tick_index,
                decision,
                pnl_contribution_pct: contribution,
            });
        }

        if position.is_closed() {
            closed_at = Some(tick.timestamp);
            break;
        }
    }

    let final_price = match closed_at {
        Some(_) => exits.last().map_or(entry_price, |e| e.decision.trigger_price),
        None => ticks.last().map_or(entry_price, |p| p.price),
    };
    let unrealized = pnl_contribution(entry_price, final_price, position.remaining_percentage);

    Ok(SimulationResult {
        strategy_id: strategy.id.clone(),
        strategy_name: strategy.name.clone(),
        entry_price,
        entry_time,
        exits,
        simulated_pnl_pct: realized + unrealized,
        realized_pnl_pct: realized,
        unrealized_pnl_pct: unrealized,
        remaining_percentage: position.remaining_percentage,
        final_price,
        peak_price,
        closed_at,
        ticks_processed,
        trailing_trigger,
        actual_pnl_pct: None,
        delta_pct: None,
    })
}

/// `share% × (price/entry − 1)`, in percent of the original position.
fn pnl_contribution(entry_price: Decimal, price: Decimal, share_pct: Decimal) -> Decimal {
    share_pct * (price / entry_price - Decimal::ONE)
}
