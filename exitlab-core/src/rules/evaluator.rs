//! Live exit rule evaluator — one call per price tick per position.
//!
//! Wraps a caller-owned [`TrailingStopTracker`]. Updates for a given position
//! must be serialized by the caller (one `evaluate` in flight per position);
//! different positions may be evaluated concurrently.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::{
    ExitDecision, ExitReason, ExitStrategy, Position, PricePoint, ValidationError,
};
use crate::position_management::{TrailingStopStatus, TrailingStopTracker};

use super::{stop_loss_level, ExitRules, RuleInputs};

#[derive(Debug, Default)]
pub struct ExitRuleEvaluator {
    tracker: TrailingStopTracker,
}

impl ExitRuleEvaluator {
    pub fn new() -> Self {
        Self {
            tracker: TrailingStopTracker::new(),
        }
    }

    pub fn with_tracker(tracker: TrailingStopTracker) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &TrailingStopTracker {
        &self.tracker
    }

    /// Register a newly opened position. Rejects invalid strategies.
    pub fn open_position(
        &self,
        position: &Position,
        strategy: &ExitStrategy,
    ) -> Result<TrailingStopStatus, ValidationError> {
        strategy.validate()?;
        Ok(self.tracker.initialize(position, &strategy.trailing_stop))
    }

    /// Evaluate one tick. Returns at most one decision and applies it to the
    /// position; a position that reaches 0% remaining is dropped from the
    /// tracker.
    pub fn evaluate(
        &self,
        position: &mut Position,
        strategy: &ExitStrategy,
        tick: &PricePoint,
        mirror_exit: bool,
    ) -> Option<ExitDecision> {
        if position.is_closed() {
            return None;
        }

        let trailing = self.tracker.update(&position.id, tick.price, tick.timestamp);
        let stop_loss_hit = stop_loss_level(strategy, position).is_some_and(|level| {
            self.tracker
                .should_use_regular_stop_loss(&position.id, tick.price, level)
        });

        let inputs = RuleInputs {
            price: tick.price,
            timestamp: tick.timestamp,
            trailing_triggered: trailing.newly_triggered,
            stop_loss_hit,
            mirror_exit,
        };
        let decision = ExitRules::new(strategy).decide(position, &inputs)?;

        if decision.reason == ExitReason::TrailingStop {
            if let Some(trigger) = self.tracker.create_trigger(position, tick.price) {
                info!(
                    position = %position.id,
                    peak_multiplier = %trigger.peak_multiplier,
                    exit_multiplier = %trigger.exit_multiplier,
                    profit_captured_pct = %trigger.profit_captured_pct.round_dp(2),
                    "trailing stop exit"
                );
            }
        }
        self.finish(position, &decision);
        Some(decision)
    }

    /// Operator-initiated exit of everything still held.
    pub fn manual_exit(&self, position: &mut Position, price: Decimal) -> Option<ExitDecision> {
        if position.is_closed() {
            return None;
        }
        let decision =
            ExitDecision::full_exit(ExitReason::Manual, price, position.remaining_percentage);
        position.record_exit(&decision);
        self.finish(position, &decision);
        Some(decision)
    }

    fn finish(&self, position: &Position, decision: &ExitDecision) {
        debug!(
            position = %position.id,
            reason = %decision.reason,
            sell_pct = %decision.sell_percentage,
            remaining_pct = %position.remaining_percentage,
            "exit decided"
        );
        if position.is_closed() {
            self.tracker.remove(&position.id);
        }
    }
}
