//! Trailing stop state machine for one position.
//!
//! ```text
//!   INACTIVE ──price ≥ activation──▶ ACTIVE ──price ≤ level──▶ TRIGGERED (terminal)
//!                                     │  ▲
//!                                     └──┘ price > peak: ratchet peak and level
//! ```
//!
//! Level formula: `level = peak × (1 − distance/100)`. Once ACTIVE, both the
//! peak and the level are monotonically non-decreasing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Position, PositionId, TrailingStopConfig};

use super::ratchet::RatchetLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrailingState {
    Inactive,
    Active,
    Triggered,
}

/// Snapshot of a position's trailing stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopStatus {
    pub position_id: PositionId,
    pub state: TrailingState,
    /// `None` when trailing is disabled for the position.
    pub activation_price: Option<Decimal>,
    pub peak_price: Option<Decimal>,
    pub trailing_stop_level: Option<Decimal>,
    pub activated_at: Option<DateTime<Utc>>,
    pub triggered_at: Option<DateTime<Utc>>,
}

impl TrailingStopStatus {
    fn inactive(position_id: PositionId, activation_price: Option<Decimal>) -> Self {
        Self {
            position_id,
            state: TrailingState::Inactive,
            activation_price,
            peak_price: None,
            trailing_stop_level: None,
            activated_at: None,
            triggered_at: None,
        }
    }
}

/// Before/after values of a ratchet step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetMove {
    pub previous_peak: Decimal,
    pub new_peak: Decimal,
    pub previous_level: Decimal,
    pub new_level: Decimal,
}

/// What one price observation did to the trailing stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopUpdate {
    pub state: TrailingState,
    pub newly_activated: bool,
    pub newly_triggered: bool,
    pub ratchet: Option<RatchetMove>,
    pub trailing_stop_level: Option<Decimal>,
}

impl TrailingStopUpdate {
    /// No-op result for untracked positions or disabled trailing.
    pub fn inert() -> Self {
        Self {
            state: TrailingState::Inactive,
            newly_activated: false,
            newly_triggered: false,
            ratchet: None,
            trailing_stop_level: None,
        }
    }

    fn unchanged(status: &TrailingStopStatus) -> Self {
        Self {
            state: status.state,
            newly_activated: false,
            newly_triggered: false,
            ratchet: None,
            trailing_stop_level: status.trailing_stop_level,
        }
    }
}

/// Summary of a fired trailing stop: how much of the run-up was kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopTrigger {
    pub position_id: PositionId,
    pub entry_price: Decimal,
    pub peak_price: Decimal,
    pub trigger_price: Decimal,
    pub peak_multiplier: Decimal,
    pub exit_multiplier: Decimal,
    /// `(trigger − entry) / (peak − entry) × 100`, or 0 when the peak never
    /// exceeded entry.
    pub profit_captured_pct: Decimal,
}

impl TrailingStopTrigger {
    pub fn new(position: &Position, peak_price: Decimal, trigger_price: Decimal) -> Self {
        let entry = position.entry_price;
        let run_up = peak_price - entry;
        let profit_captured_pct = if run_up > Decimal::ZERO {
            (trigger_price - entry) / run_up * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        Self {
            position_id: position.id.clone(),
            entry_price: entry,
            peak_price,
            trigger_price,
            peak_multiplier: position.multiple(peak_price),
            exit_multiplier: position.multiple(trigger_price),
            profit_captured_pct,
        }
    }
}

/// Trailing stop for a single position.
///
/// Owned exclusively by whoever updates it: the tracker store for live
/// positions, or a simulator run for replays.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingStop {
    config: TrailingStopConfig,
    status: TrailingStopStatus,
    ratchet: RatchetLevel,
}

impl TrailingStop {
    /// Seed the trailing stop for a freshly opened position.
    ///
    /// Disabled configs yield an INACTIVE stop with no activation price that
    /// ignores every update.
    pub fn new(position: &Position, config: &TrailingStopConfig) -> Self {
        let activation_price = config
            .enabled
            .then(|| position.entry_price * config.activation_multiplier);
        Self {
            config: config.clone(),
            status: TrailingStopStatus::inactive(position.id.clone(), activation_price),
            ratchet: RatchetLevel::new(),
        }
    }

    pub fn status(&self) -> &TrailingStopStatus {
        &self.status
    }

    pub fn state(&self) -> TrailingState {
        self.status.state
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Feed one price observation.
    pub fn update(&mut self, price: Decimal, at: DateTime<Utc>) -> TrailingStopUpdate {
        if !self.config.enabled {
            return TrailingStopUpdate::inert();
        }

        match self.status.state {
            TrailingState::Inactive => self.update_inactive(price, at),
            TrailingState::Active => self.update_active(price, at),
            TrailingState::Triggered => TrailingStopUpdate::unchanged(&self.status),
        }
    }

    fn update_inactive(&mut self, price: Decimal, at: DateTime<Utc>) -> TrailingStopUpdate {
        let Some(activation) = self.status.activation_price else {
            return TrailingStopUpdate::inert();
        };
        if price < activation {
            return TrailingStopUpdate::unchanged(&self.status);
        }

        let level = self.ratchet.apply(self.level_for(price));
        self.status.state = TrailingState::Active;
        self.status.peak_price = Some(price);
        self.status.trailing_stop_level = Some(level);
        self.status.activated_at = Some(at);
        debug!(
            position = %self.status.position_id,
            %price,
            %level,
            "trailing stop activated"
        );

        TrailingStopUpdate {
            state: TrailingState::Active,
            newly_activated: true,
            newly_triggered: false,
            ratchet: None,
            trailing_stop_level: Some(level),
        }
    }

    fn update_active(&mut self, price: Decimal, at: DateTime<Utc>) -> TrailingStopUpdate {
        let (Some(peak), Some(level)) = (self.status.peak_price, self.status.trailing_stop_level)
        else {
            return TrailingStopUpdate::unchanged(&self.status);
        };

        if price <= level {
            self.status.state = TrailingState::Triggered;
            self.status.triggered_at = Some(at);
            debug!(
                position = %self.status.position_id,
                %price,
                %level,
                %peak,
                "trailing stop triggered"
            );
            return TrailingStopUpdate {
                state: TrailingState::Triggered,
                newly_activated: false,
                newly_triggered: true,
                ratchet: None,
                trailing_stop_level: Some(level),
            };
        }

        if price > peak {
            let new_level = self.ratchet.apply(self.level_for(price));
            self.status.peak_price = Some(price);
            self.status.trailing_stop_level = Some(new_level);
            debug!(
                position = %self.status.position_id,
                previous_level = %level,
                %new_level,
                "trailing stop ratcheted"
            );
            return TrailingStopUpdate {
                state: TrailingState::Active,
                newly_activated: false,
                newly_triggered: false,
                ratchet: Some(RatchetMove {
                    previous_peak: peak,
                    new_peak: price,
                    previous_level: level,
                    new_level,
                }),
                trailing_stop_level: Some(new_level),
            };
        }

        TrailingStopUpdate::unchanged(&self.status)
    }

    /// Regular stop-loss applies only while trailing has not armed.
    pub fn should_use_regular_stop_loss(&self, price: Decimal, stop_loss_level: Decimal) -> bool {
        self.status.state == TrailingState::Inactive && price <= stop_loss_level
    }

    /// Build the trigger summary, if the stop ever activated.
    pub fn create_trigger(
        &self,
        position: &Position,
        trigger_price: Decimal,
    ) -> Option<TrailingStopTrigger> {
        self.status
            .peak_price
            .map(|peak| TrailingStopTrigger::new(position, peak, trigger_price))
    }

    fn level_for(&self, peak: Decimal) -> Decimal {
        peak * self.config.retain_fraction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i)
    }

    fn position() -> Position {
        Position::new(PositionId::from("p1"), dec!(1.00), t(0), dec!(100))
    }

    fn stop() -> TrailingStop {
        TrailingStop::new(&position(), &TrailingStopConfig::enabled(dec!(2.0), dec!(30)))
    }

    #[test]
    fn disabled_config_is_inert() {
        let mut ts = TrailingStop::new(&position(), &TrailingStopConfig::default());
        assert_eq!(ts.status().activation_price, None);
        let u = ts.update(dec!(10), t(1));
        assert_eq!(u, TrailingStopUpdate::inert());
        assert_eq!(ts.state(), TrailingState::Inactive);
    }

    #[test]
    fn activation_price_from_entry() {
        assert_eq!(stop().status().activation_price, Some(dec!(2.00)));
    }

    #[test]
    fn stays_inactive_below_activation() {
        let mut ts = stop();
        let u = ts.update(dec!(1.99), t(1));
        assert_eq!(u.state, TrailingState::Inactive);
        assert!(!u.newly_activated);
        assert_eq!(ts.status().peak_price, None);
    }

    #[test]
    fn activates_at_exact_activation_price() {
        let mut ts = stop();
        let u = ts.update(dec!(2.00), t(1));
        assert!(u.newly_activated);
        assert_eq!(u.trailing_stop_level, Some(dec!(1.40)));
        assert_eq!(ts.status().activated_at, Some(t(1)));
    }

    #[test]
    fn ratchets_only_on_new_peak() {
        let mut ts = stop();
        ts.update(dec!(2.00), t(1));

        let up = ts.update(dec!(2.50), t(2));
        let mv = up.ratchet.unwrap();
        assert_eq!(mv.previous_peak, dec!(2.00));
        assert_eq!(mv.new_peak, dec!(2.50));
        assert_eq!(mv.previous_level, dec!(1.40));
        assert_eq!(mv.new_level, dec!(1.75));

        let flat = ts.update(dec!(2.20), t(3));
        assert!(flat.ratchet.is_none());
        assert_eq!(flat.trailing_stop_level, Some(dec!(1.75)));
    }

    #[test]
    fn triggers_at_or_below_level_and_is_terminal() {
        let mut ts = stop();
        ts.update(dec!(2.00), t(1));
        let u = ts.update(dec!(1.40), t(2));
        assert!(u.newly_triggered);
        assert_eq!(ts.state(), TrailingState::Triggered);

        // Terminal: a new high does nothing
        let after = ts.update(dec!(5.00), t(3));
        assert_eq!(after.state, TrailingState::Triggered);
        assert!(!after.newly_triggered);
        assert!(after.ratchet.is_none());
        assert_eq!(ts.status().peak_price, Some(dec!(2.00)));
    }

    #[test]
    fn regular_stop_superseded_once_active() {
        let mut ts = stop();
        assert!(ts.should_use_regular_stop_loss(dec!(0.65), dec!(0.70)));
        assert!(!ts.should_use_regular_stop_loss(dec!(0.75), dec!(0.70)));
        ts.update(dec!(2.0), t(1));
        assert!(!ts.should_use_regular_stop_loss(dec!(0.65), dec!(0.70)));
    }

    #[test]
    fn trigger_reports_profit_captured() {
        let mut ts = stop();
        ts.update(dec!(2.00), t(1));
        ts.update(dec!(2.50), t(2));
        let trig = ts.create_trigger(&position(), dec!(1.70)).unwrap();
        assert_eq!(trig.peak_multiplier, dec!(2.5));
        assert_eq!(trig.exit_multiplier, dec!(1.7));
        // (1.70 - 1.00) / (2.50 - 1.00) * 100
        assert_eq!(trig.profit_captured_pct.round_dp(4), dec!(46.6667));
    }

    #[test]
    fn trigger_with_peak_at_entry_does_not_divide_by_zero() {
        let p = position();
        let trig = TrailingStopTrigger::new(&p, dec!(1.00), dec!(0.90));
        assert_eq!(trig.profit_captured_pct, Decimal::ZERO);
    }

    #[test]
    fn no_trigger_summary_before_activation() {
        assert!(stop().create_trigger(&position(), dec!(1.0)).is_none());
    }
}
