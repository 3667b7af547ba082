//! Exit rules — the fixed-priority resolver consulted once per price tick.
//!
//! Priority (highest first). Exactly one rule fires per tick; lower rules are
//! not evaluated once one fires.
//!
//! 1. Trailing stop newly triggered this tick → sell all remaining
//! 2. Regular stop-loss, only while the trailing stop is INACTIVE → sell all
//! 3. Mirror exit (external signal, strategy opt-in) → sell all
//! 4. Lowest unfired take-profit tier reached → sell its share of the original size
//! 5. Time rules: max hold, then stagnation → sell all
//! 6. Moonbag stop, once every take-profit tier has fired → sell all
//!
//! The resolver is pure over its inputs: the caller owns the trailing stop
//! and tells the resolver what it did this tick. The live evaluator and the
//! simulator both go through [`ExitRules::decide`].

pub mod evaluator;

pub use evaluator::ExitRuleEvaluator;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{hours_between, ExitDecision, ExitReason, ExitStrategy, Position};

/// Per-tick facts the resolver cannot derive from the position itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleInputs {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    /// The trailing stop moved to TRIGGERED on this tick.
    pub trailing_triggered: bool,
    /// Price is at/below the regular stop AND the trailing stop is INACTIVE.
    pub stop_loss_hit: bool,
    /// The tracked source wallet has exited.
    pub mirror_exit: bool,
}

/// Rule resolver bound to one strategy.
#[derive(Debug, Clone, Copy)]
pub struct ExitRules<'a> {
    strategy: &'a ExitStrategy,
}

impl<'a> ExitRules<'a> {
    pub fn new(strategy: &'a ExitStrategy) -> Self {
        Self { strategy }
    }

    /// Resolve this tick and apply the resulting decision to `position`.
    ///
    /// Also maintains the position's stagnation window, which must observe
    /// every tick regardless of which rule fires.
    pub fn decide(&self, position: &mut Position, inputs: &RuleInputs) -> Option<ExitDecision> {
        if position.is_closed() {
            return None;
        }
        self.track_stagnation(position, inputs);

        let decision = self.resolve(position, inputs)?;
        position.record_exit(&decision);
        Some(decision)
    }

    fn resolve(&self, position: &Position, inputs: &RuleInputs) -> Option<ExitDecision> {
        let price = inputs.price;
        let remaining = position.remaining_percentage;
        let full = |reason| Some(ExitDecision::full_exit(reason, price, remaining));

        if inputs.trailing_triggered {
            return full(ExitReason::TrailingStop);
        }
        if inputs.stop_loss_hit {
            return full(ExitReason::StopLoss);
        }
        if inputs.mirror_exit && self.strategy.mirror_exit_enabled {
            return full(ExitReason::MirrorExit);
        }
        if let Some(decision) = self.take_profit(position, price) {
            return Some(decision);
        }
        if let Some(reason) = self.time_rule(position, inputs.timestamp) {
            return full(reason);
        }
        if self.moonbag_stop_hit(position, price) {
            return full(ExitReason::MoonbagStop);
        }
        None
    }

    /// Lowest tier not yet fired whose target has been reached.
    fn take_profit(&self, position: &Position, price: Decimal) -> Option<ExitDecision> {
        self.strategy
            .take_profit_levels
            .iter()
            .enumerate()
            .filter(|(index, _)| !position.levels_hit.contains(index))
            .find(|(_, level)| price >= level.target_price(position.entry_price))
            .map(|(index, level)| {
                let sell = level.sell_percentage.min(position.remaining_percentage);
                ExitDecision::take_profit(index, price, sell)
            })
    }

    fn time_rule(&self, position: &Position, now: DateTime<Utc>) -> Option<ExitReason> {
        let rules = &self.strategy.time_rules;
        if let Some(max_hours) = rules.max_hold_hours {
            if position.hours_held(now) > max_hours {
                return Some(ExitReason::TimeLimit);
            }
        }
        if rules.stagnation_enabled {
            if let Some(since) = position.stagnant_since {
                if hours_between(since, now) >= rules.stagnation_hours {
                    return Some(ExitReason::Stagnation);
                }
            }
        }
        None
    }

    /// Guards the residual left after the last tier; with no tiers there is
    /// no residual and the regular stop-loss governs.
    fn moonbag_stop_hit(&self, position: &Position, price: Decimal) -> bool {
        let levels = self.strategy.take_profit_levels.len();
        if levels == 0 || position.levels_hit.len() < levels {
            return false;
        }
        self.strategy
            .moonbag_stop_level(position.entry_price)
            .is_some_and(|stop| price <= stop)
    }

    /// Open, extend, or reset the in-band window.
    fn track_stagnation(&self, position: &mut Position, inputs: &RuleInputs) {
        let rules = &self.strategy.time_rules;
        if !rules.stagnation_enabled {
            return;
        }
        if position.entry_price.is_zero() {
            position.stagnant_since = None;
            return;
        }
        let deviation_pct = ((inputs.price - position.entry_price) / position.entry_price).abs()
            * Decimal::ONE_HUNDRED;
        if deviation_pct <= rules.stagnation_threshold_pct {
            position.stagnant_since.get_or_insert(inputs.timestamp);
        } else {
            position.stagnant_since = None;
        }
    }
}

/// Regular stop level for a position under a strategy.
pub fn stop_loss_level(strategy: &ExitStrategy, position: &Position) -> Option<Decimal> {
    strategy.stop_loss_level(position.entry_price)
}
