//! Exit strategy model — the immutable rule set a position is exited by.
//!
//! A strategy combines up to five independent rule families:
//! - take-profit tiers (sell a fixed share of the original size at a price multiple)
//! - a regular stop-loss below entry
//! - a trailing stop that activates at a multiple and then ratchets
//! - time rules (max hold, stagnation)
//! - a moonbag: the residual kept after the tiers, with its own stop
//!
//! All percentages are expressed on a 0–100 scale and all prices/multipliers
//! are `Decimal`. Construction paths call [`ExitStrategy::validate`]; an
//! invalid strategy is rejected, never clamped.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::StrategyId;

pub(crate) const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Rejection reasons for a malformed strategy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("strategy id must not be empty")]
    EmptyId,
    #[error("take-profit level {index}: multiplier must be positive, got {value}")]
    InvalidMultiplier { index: usize, value: Decimal },
    #[error("take-profit level {index}: sell percentage must be in (0, 100], got {value}")]
    InvalidSellPercentage { index: usize, value: Decimal },
    #[error(
        "take-profit levels must be strictly ascending by multiplier (level {index} has {value}, previous {previous})"
    )]
    LevelsNotAscending {
        index: usize,
        value: Decimal,
        previous: Decimal,
    },
    #[error("take-profit sells ({levels}%) plus moonbag ({moonbag}%) exceed 100%")]
    SellPercentagesExceed { levels: Decimal, moonbag: Decimal },
    #[error("stop-loss percentage must be in (0, 100), got {0}")]
    InvalidStopLoss(Decimal),
    #[error("trailing stop activation multiplier must be positive, got {0}")]
    InvalidActivationMultiplier(Decimal),
    #[error("trailing stop distance must be in (0, 100), got {0}")]
    InvalidTrailingDistance(Decimal),
    #[error("max hold hours must be positive, got {0}")]
    InvalidMaxHold(Decimal),
    #[error("stagnation threshold must be non-negative, got {0}")]
    InvalidStagnationThreshold(Decimal),
    #[error("stagnation window must be positive, got {0} hours")]
    InvalidStagnationHours(Decimal),
    #[error("moonbag percentage must be in [0, 100], got {0}")]
    InvalidMoonbagPercentage(Decimal),
    #[error("moonbag stop-loss must be in [0, 100), got {0}")]
    InvalidMoonbagStopLoss(Decimal),
}

/// One take-profit tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitLevel {
    /// Price multiple of entry at which the tier fires (2.0 = 2x).
    pub multiplier: Decimal,
    /// Share of the ORIGINAL position size sold when the tier fires.
    pub sell_percentage: Decimal,
}

impl TakeProfitLevel {
    pub fn new(multiplier: Decimal, sell_percentage: Decimal) -> Self {
        Self {
            multiplier,
            sell_percentage,
        }
    }

    /// Absolute trigger price for a given entry.
    pub fn target_price(&self, entry_price: Decimal) -> Decimal {
        entry_price * self.multiplier
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Entry multiple at which trailing arms.
    #[serde(default = "default_activation_multiplier")]
    pub activation_multiplier: Decimal,
    /// Distance below peak, in percent.
    #[serde(default = "default_distance_percentage")]
    pub distance_percentage: Decimal,
}

fn default_activation_multiplier() -> Decimal {
    dec!(2.0)
}

fn default_distance_percentage() -> Decimal {
    dec!(30)
}

impl Default for TrailingStopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            activation_multiplier: default_activation_multiplier(),
            distance_percentage: default_distance_percentage(),
        }
    }
}

impl TrailingStopConfig {
    pub fn enabled(activation_multiplier: Decimal, distance_percentage: Decimal) -> Self {
        Self {
            enabled: true,
            activation_multiplier,
            distance_percentage,
        }
    }

    /// Fraction of the peak the stop sits at: `1 - distance/100`.
    pub fn retain_fraction(&self) -> Decimal {
        Decimal::ONE - self.distance_percentage / HUNDRED
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRules {
    #[serde(default)]
    pub max_hold_hours: Option<Decimal>,
    #[serde(default)]
    pub stagnation_enabled: bool,
    /// Band around entry (percent) counted as "not moving".
    #[serde(default)]
    pub stagnation_threshold_pct: Decimal,
    #[serde(default)]
    pub stagnation_hours: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoonbagConfig {
    /// Residual share of the original size deliberately kept after the tiers.
    pub percentage: Decimal,
    /// Stop distance below entry (percent) applied to the residual only.
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
}

/// Immutable exit rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitStrategy {
    pub id: StrategyId,
    pub name: String,
    /// Signal-strength class the strategy is the default for (display only).
    #[serde(default)]
    pub conviction_tier: Option<String>,
    #[serde(default)]
    pub take_profit_levels: Vec<TakeProfitLevel>,
    /// Distance below entry (percent). `None` disables the regular stop.
    #[serde(default)]
    pub stop_loss_percentage: Option<Decimal>,
    #[serde(default)]
    pub trailing_stop: TrailingStopConfig,
    #[serde(default)]
    pub time_rules: TimeRules,
    #[serde(default)]
    pub moonbag: Option<MoonbagConfig>,
    /// Exit fully when the tracked source wallet exits.
    #[serde(default)]
    pub mirror_exit_enabled: bool,
}

impl ExitStrategy {
    /// Bare strategy with no rules. Use the `with_*` helpers to add them.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: StrategyId::new(id),
            name: name.into(),
            conviction_tier: None,
            take_profit_levels: Vec::new(),
            stop_loss_percentage: None,
            trailing_stop: TrailingStopConfig::default(),
            time_rules: TimeRules::default(),
            moonbag: None,
            mirror_exit_enabled: false,
        }
    }

    pub fn with_take_profit(mut self, multiplier: Decimal, sell_percentage: Decimal) -> Self {
        self.take_profit_levels
            .push(TakeProfitLevel::new(multiplier, sell_percentage));
        self
    }

    pub fn with_stop_loss(mut self, percentage: Decimal) -> Self {
        self.stop_loss_percentage = Some(percentage);
        self
    }

    pub fn with_trailing_stop(mut self, activation_multiplier: Decimal, distance: Decimal) -> Self {
        self.trailing_stop = TrailingStopConfig::enabled(activation_multiplier, distance);
        self
    }

    pub fn with_time_rules(mut self, time_rules: TimeRules) -> Self {
        self.time_rules = time_rules;
        self
    }

    pub fn with_moonbag(mut self, percentage: Decimal, stop_loss: Option<Decimal>) -> Self {
        self.moonbag = Some(MoonbagConfig {
            percentage,
            stop_loss,
        });
        self
    }

    pub fn with_mirror_exit(mut self) -> Self {
        self.mirror_exit_enabled = true;
        self
    }

    /// Validate and return self; the usual way to finish a builder chain.
    pub fn validated(self) -> Result<Self, ValidationError> {
        self.validate()?;
        Ok(self)
    }

    /// Regular stop level for an entry price, if a stop-loss is configured.
    pub fn stop_loss_level(&self, entry_price: Decimal) -> Option<Decimal> {
        self.stop_loss_percentage
            .map(|pct| entry_price * (Decimal::ONE - pct / HUNDRED))
    }

    /// Moonbag stop level for an entry price, if configured.
    pub fn moonbag_stop_level(&self, entry_price: Decimal) -> Option<Decimal> {
        self.moonbag
            .as_ref()
            .and_then(|m| m.stop_loss)
            .map(|pct| entry_price * (Decimal::ONE - pct / HUNDRED))
    }

    /// Sum of all take-profit sell percentages.
    pub fn take_profit_total(&self) -> Decimal {
        self.take_profit_levels
            .iter()
            .map(|l| l.sell_percentage)
            .sum()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.0.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }

        let mut previous: Option<Decimal> = None;
        for (index, level) in self.take_profit_levels.iter().enumerate() {
            if level.multiplier <= Decimal::ZERO {
                return Err(ValidationError::InvalidMultiplier {
                    index,
                    value: level.multiplier,
                });
            }
            if level.sell_percentage <= Decimal::ZERO || level.sell_percentage > HUNDRED {
                return Err(ValidationError::InvalidSellPercentage {
                    index,
                    value: level.sell_percentage,
                });
            }
            if let Some(prev) = previous {
                if level.multiplier <= prev {
                    return Err(ValidationError::LevelsNotAscending {
                        index,
                        value: level.multiplier,
                        previous: prev,
                    });
                }
            }
            previous = Some(level.multiplier);
        }

        let moonbag_pct = match &self.moonbag {
            Some(m) => {
                if m.percentage < Decimal::ZERO || m.percentage > HUNDRED {
                    return Err(ValidationError::InvalidMoonbagPercentage(m.percentage));
                }
                if let Some(sl) = m.stop_loss {
                    if sl < Decimal::ZERO || sl >= HUNDRED {
                        return Err(ValidationError::InvalidMoonbagStopLoss(sl));
                    }
                }
                m.percentage
            }
            None => Decimal::ZERO,
        };

        let levels_total = self.take_profit_total();
        if levels_total + moonbag_pct > HUNDRED {
            return Err(ValidationError::SellPercentagesExceed {
                levels: levels_total,
                moonbag: moonbag_pct,
            });
        }

        if let Some(sl) = self.stop_loss_percentage {
            if sl <= Decimal::ZERO || sl >= HUNDRED {
                return Err(ValidationError::InvalidStopLoss(sl));
            }
        }

        if self.trailing_stop.enabled {
            let ts = &self.trailing_stop;
            if ts.activation_multiplier <= Decimal::ZERO {
                return Err(ValidationError::InvalidActivationMultiplier(
                    ts.activation_multiplier,
                ));
            }
            if ts.distance_percentage <= Decimal::ZERO || ts.distance_percentage >= HUNDRED {
                return Err(ValidationError::InvalidTrailingDistance(ts.distance_percentage));
            }
        }

        let tr = &self.time_rules;
        if let Some(hours) = tr.max_hold_hours {
            if hours <= Decimal::ZERO {
                return Err(ValidationError::InvalidMaxHold(hours));
            }
        }
        if tr.stagnation_enabled {
            if tr.stagnation_threshold_pct < Decimal::ZERO {
                return Err(ValidationError::InvalidStagnationThreshold(
                    tr.stagnation_threshold_pct,
                ));
            }
            if tr.stagnation_hours <= Decimal::ZERO {
                return Err(ValidationError::InvalidStagnationHours(tr.stagnation_hours));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiered() -> ExitStrategy {
        ExitStrategy::new("tiered", "Tiered")
            .with_take_profit(dec!(2.0), dec!(50))
            .with_take_profit(dec!(3.0), dec!(25))
            .with_stop_loss(dec!(30))
    }

    #[test]
    fn valid_strategy_passes() {
        assert!(tiered().validate().is_ok());
        assert!(tiered().with_moonbag(dec!(25), Some(dec!(0))).validated().is_ok());
    }

    #[test]
    fn sells_plus_moonbag_over_100_rejected() {
        let err = tiered().with_moonbag(dec!(30), None).validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::SellPercentagesExceed {
                levels: dec!(75),
                moonbag: dec!(30)
            }
        );
    }

    #[test]
    fn unsorted_levels_rejected() {
        let s = ExitStrategy::new("x", "x")
            .with_take_profit(dec!(3.0), dec!(25))
            .with_take_profit(dec!(2.0), dec!(25));
        assert!(matches!(
            s.validate(),
            Err(ValidationError::LevelsNotAscending { index: 1, .. })
        ));
    }

    #[test]
    fn duplicate_multiplier_rejected() {
        let s = ExitStrategy::new("x", "x")
            .with_take_profit(dec!(2.0), dec!(25))
            .with_take_profit(dec!(2.0), dec!(25));
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_sell_percentage_rejected() {
        let s = ExitStrategy::new("x", "x").with_take_profit(dec!(2.0), dec!(0));
        assert!(matches!(
            s.validate(),
            Err(ValidationError::InvalidSellPercentage { index: 0, .. })
        ));
    }

    #[test]
    fn stop_loss_bounds() {
        assert!(ExitStrategy::new("x", "x").with_stop_loss(dec!(0)).validate().is_err());
        assert!(ExitStrategy::new("x", "x").with_stop_loss(dec!(100)).validate().is_err());
        assert!(ExitStrategy::new("x", "x").with_stop_loss(dec!(99.9)).validate().is_ok());
    }

    #[test]
    fn trailing_distance_checked_only_when_enabled() {
        let mut s = ExitStrategy::new("x", "x");
        s.trailing_stop.distance_percentage = dec!(150);
        assert!(s.validate().is_ok());
        s.trailing_stop.enabled = true;
        assert_eq!(
            s.validate(),
            Err(ValidationError::InvalidTrailingDistance(dec!(150)))
        );
    }

    #[test]
    fn stagnation_requires_positive_window() {
        let s = ExitStrategy::new("x", "x").with_time_rules(TimeRules {
            stagnation_enabled: true,
            stagnation_threshold_pct: dec!(5),
            stagnation_hours: dec!(0),
            ..TimeRules::default()
        });
        assert!(matches!(
            s.validate(),
            Err(ValidationError::InvalidStagnationHours(_))
        ));
    }

    #[test]
    fn empty_id_rejected() {
        assert_eq!(
            ExitStrategy::new(" ", "blank").validate(),
            Err(ValidationError::EmptyId)
        );
    }

    #[test]
    fn stop_levels_computed_from_entry() {
        let s = tiered().with_moonbag(dec!(25), Some(dec!(50)));
        assert_eq!(s.stop_loss_level(dec!(1.00)), Some(dec!(0.70)));
        assert_eq!(s.moonbag_stop_level(dec!(2.00)), Some(dec!(1.00)));
        assert_eq!(s.take_profit_total(), dec!(75));
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{
            "id": "min",
            "name": "Minimal",
            "take_profit_levels": [{"multiplier": "2", "sell_percentage": "50"}]
        }"#;
        let s: ExitStrategy = serde_json::from_str(json).unwrap();
        assert!(!s.trailing_stop.enabled);
        assert_eq!(s.trailing_stop.distance_percentage, dec!(30));
        assert!(s.stop_loss_percentage.is_none());
        assert!(s.validate().is_ok());
    }
}
