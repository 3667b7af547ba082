//! Open position state as seen by the exit rules.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::decision::ExitDecision;
use super::ids::PositionId;
use super::strategy::HUNDRED;

const SECONDS_PER_HOUR: i64 = 3600;

/// Position tracking for exit decisions.
///
/// `remaining_percentage` is the share of the original size still held
/// (100 at entry, 0 once closed). `levels_hit` holds the indices of take-profit
/// tiers that already fired; each tier fires at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub size_at_entry: Decimal,
    pub remaining_percentage: Decimal,
    pub levels_hit: BTreeSet<usize>,
    /// Start of the current run inside the stagnation band. Entry is in the
    /// band by definition, so the window opens at `entry_time`.
    #[serde(default)]
    pub stagnant_since: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(
        id: PositionId,
        entry_price: Decimal,
        entry_time: DateTime<Utc>,
        size_at_entry: Decimal,
    ) -> Self {
        Self {
            id,
            entry_price,
            entry_time,
            size_at_entry,
            remaining_percentage: HUNDRED,
            levels_hit: BTreeSet::new(),
            stagnant_since: Some(entry_time),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.remaining_percentage <= Decimal::ZERO
    }

    /// Share of the original size already sold.
    pub fn sold_percentage(&self) -> Decimal {
        HUNDRED - self.remaining_percentage
    }

    /// Units still held.
    pub fn remaining_size(&self) -> Decimal {
        self.size_at_entry * self.remaining_percentage / HUNDRED
    }

    /// Price as a multiple of entry.
    pub fn multiple(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        price / self.entry_price
    }

    /// Fractional hours elapsed since entry (zero if `now` precedes entry).
    pub fn hours_held(&self, now: DateTime<Utc>) -> Decimal {
        hours_between(self.entry_time, now)
    }

    /// Apply a decision: reduce the remaining share and mark the tier, if any.
    ///
    /// The sold share is capped at what remains, so the cumulative sold
    /// percentage can never exceed 100.
    pub fn record_exit(&mut self, decision: &ExitDecision) -> Decimal {
        let sold = decision.sell_percentage.min(self.remaining_percentage);
        self.remaining_percentage -= sold;
        if let Some(level) = decision.level_index {
            self.levels_hit.insert(level);
        }
        sold
    }
}

/// Fractional hours from `from` to `to`, floored at zero.
pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
    let secs = (to - from).num_seconds().max(0);
    Decimal::from(secs) / Decimal::from(SECONDS_PER_HOUR)
}
