//! Exit decisions — the only output the rule layer hands to an order executor.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a sell was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    TimeLimit,
    Stagnation,
    MoonbagStop,
    Manual,
    MirrorExit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::TrailingStop => "trailing_stop",
            Self::TimeLimit => "time_limit",
            Self::Stagnation => "stagnation",
            Self::MoonbagStop => "moonbag_stop",
            Self::Manual => "manual",
            Self::MirrorExit => "mirror_exit",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sell instruction.
///
/// `sell_percentage` is a share of the ORIGINAL position size, so the
/// percentages of all decisions for one position sum to at most 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitDecision {
    pub reason: ExitReason,
    pub trigger_price: Decimal,
    pub sell_percentage: Decimal,
    /// Take-profit tier index (only for `TakeProfit`).
    pub level_index: Option<usize>,
}

impl ExitDecision {
    /// Sell everything still held.
    pub fn full_exit(reason: ExitReason, trigger_price: Decimal, remaining: Decimal) -> Self {
        Self {
            reason,
            trigger_price,
            sell_percentage: remaining,
            level_index: None,
        }
    }

    pub fn take_profit(
        level_index: usize,
        trigger_price: Decimal,
        sell_percentage: Decimal,
    ) -> Self {
        Self {
            reason: ExitReason::TakeProfit,
            trigger_price,
            sell_percentage,
            level_index: Some(level_index),
        }
    }
}
