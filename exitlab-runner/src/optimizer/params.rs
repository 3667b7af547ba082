//! Named optimizer parameters and how each one edits a strategy.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use exitlab_core::domain::{ExitStrategy, MoonbagConfig, StrategyId, ValidationError};

use crate::config::ConfigError;

/// A strategy field the optimizer can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamName {
    StopLossPercentage,
    TrailingEnabled,
    TrailingActivationMultiplier,
    TrailingDistancePercentage,
    TakeProfitMultiplier(usize),
    TakeProfitSellPercentage(usize),
    MaxHoldHours,
    StagnationThresholdPct,
    StagnationHours,
    MoonbagPercentage,
    MoonbagStopLoss,
}

impl FromStr for ParamName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ConfigError::UnknownParameter(s.to_string());
        Ok(match s {
            "stop_loss_percentage" => Self::StopLossPercentage,
            "trailing.enabled" => Self::TrailingEnabled,
            "trailing.activation_multiplier" => Self::TrailingActivationMultiplier,
            "trailing.distance_percentage" => Self::TrailingDistancePercentage,
            "time.max_hold_hours" => Self::MaxHoldHours,
            "time.stagnation_threshold_pct" => Self::StagnationThresholdPct,
            "time.stagnation_hours" => Self::StagnationHours,
            "moonbag.percentage" => Self::MoonbagPercentage,
            "moonbag.stop_loss" => Self::MoonbagStopLoss,
            other => {
                let rest = other.strip_prefix("take_profit.").ok_or_else(unknown)?;
                let (index, field) = rest.split_once('.').ok_or_else(unknown)?;
                let index: usize = index.parse().map_err(|_| unknown())?;
                match field {
                    "multiplier" => Self::TakeProfitMultiplier(index),
                    "sell_percentage" => Self::TakeProfitSellPercentage(index),
                    _ => return Err(unknown()),
                }
            }
        })
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopLossPercentage => f.write_str("stop_loss_percentage"),
            Self::TrailingEnabled => f.write_str("trailing.enabled"),
            Self::TrailingActivationMultiplier => f.write_str("trailing.activation_multiplier"),
            Self::TrailingDistancePercentage => f.write_str("trailing.distance_percentage"),
            Self::TakeProfitMultiplier(i) => write!(f, "take_profit.{i}.multiplier"),
            Self::TakeProfitSellPercentage(i) => write!(f, "take_profit.{i}.sell_percentage"),
            Self::MaxHoldHours => f.write_str("time.max_hold_hours"),
            Self::StagnationThresholdPct => f.write_str("time.stagnation_threshold_pct"),
            Self::StagnationHours => f.write_str("time.stagnation_hours"),
            Self::MoonbagPercentage => f.write_str("moonbag.percentage"),
            Self::MoonbagStopLoss => f.write_str("moonbag.stop_loss"),
        }
    }
}

impl ParamName {
    /// Take-profit parameters must address a level the base strategy has.
    pub fn check_applicable(&self, base: &ExitStrategy) -> Result<(), ConfigError> {
        match self {
            Self::TakeProfitMultiplier(i) | Self::TakeProfitSellPercentage(i)
                if *i >= base.take_profit_levels.len() =>
            {
                Err(ConfigError::InvalidValue {
                    name: self.to_string(),
                    value: Decimal::from(*i),
                    reason: "base strategy has no take-profit level at this index",
                })
            }
            _ => Ok(()),
        }
    }

    /// Range checks that hold for every strategy. Cross-field rules are left
    /// to strategy validation, so such a combination fails on its own.
    pub fn check_value(&self, value: Decimal) -> Result<(), ConfigError> {
        let reason = match self {
            Self::TrailingEnabled if value != Decimal::ZERO && value != Decimal::ONE => {
                Some("must be 0 or 1")
            }
            _ if value < Decimal::ZERO => Some("must not be negative"),
            _ => None,
        };
        match reason {
            Some(reason) => Err(ConfigError::InvalidValue {
                name: self.to_string(),
                value,
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Write `value` into the matching strategy field.
    pub fn apply(&self, strategy: &mut ExitStrategy, value: Decimal) {
        match self {
            Self::StopLossPercentage => strategy.stop_loss_percentage = Some(value),
            Self::TrailingEnabled => strategy.trailing_stop.enabled = value == Decimal::ONE,
            Self::TrailingActivationMultiplier => {
                strategy.trailing_stop.activation_multiplier = value
            }
            Self::TrailingDistancePercentage => strategy.trailing_stop.distance_percentage = value,
            Self::TakeProfitMultiplier(i) => {
                if let Some(level) = strategy.take_profit_levels.get_mut(*i) {
                    level.multiplier = value;
                }
            }
            Self::TakeProfitSellPercentage(i) => {
                if let Some(level) = strategy.take_profit_levels.get_mut(*i) {
                    level.sell_percentage = value;
                }
            }
            Self::MaxHoldHours => strategy.time_rules.max_hold_hours = Some(value),
            Self::StagnationThresholdPct => {
                strategy.time_rules.stagnation_enabled = true;
                strategy.time_rules.stagnation_threshold_pct = value;
            }
            Self::StagnationHours => {
                strategy.time_rules.stagnation_enabled = true;
                strategy.time_rules.stagnation_hours = value;
            }
            Self::MoonbagPercentage => {
                strategy.moonbag.get_or_insert_with(MoonbagConfig::default).percentage = value
            }
            Self::MoonbagStopLoss => {
                strategy.moonbag.get_or_insert_with(MoonbagConfig::default).stop_loss = Some(value)
            }
        }
    }
}

/// Derive a candidate strategy from `base` and one parameter assignment.
///
/// The candidate gets its own id and a name listing the assignment; it is
/// validated before being returned.
pub fn apply_parameters(
    base: &ExitStrategy,
    params: &[(ParamName, Decimal)],
    combination_id: &str,
) -> Result<ExitStrategy, ValidationError> {
    let mut strategy = base.clone();
    for (name, value) in params {
        name.apply(&mut strategy, *value);
    }
    let short_id = combination_id.get(..12).unwrap_or(combination_id);
    strategy.id = StrategyId::new(format!("{}-{}", base.id, short_id));
    strategy.name = format!(
        "{} [{}]",
        base.name,
        params
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    strategy.validated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn names_round_trip() {
        for raw in [
            "stop_loss_percentage",
            "trailing.enabled",
            "trailing.activation_multiplier",
            "trailing.distance_percentage",
            "take_profit.0.multiplier",
            "take_profit.3.sell_percentage",
            "time.max_hold_hours",
            "time.stagnation_threshold_pct",
            "time.stagnation_hours",
            "moonbag.percentage",
            "moonbag.stop_loss",
        ] {
            let parsed: ParamName = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
    }

    #[test]
    fn unknown_names_rejected() {
        for raw in ["leverage", "take_profit.x.multiplier", "take_profit.0.size", "take_profit"] {
            assert!(matches!(
                raw.parse::<ParamName>(),
                Err(ConfigError::UnknownParameter(_))
            ));
        }
    }

    #[test]
    fn apply_builds_valid_candidate() {
        let base = ExitStrategy::new("base", "Base").with_take_profit(dec!(2), dec!(50));
        let params = vec![
            (ParamName::TrailingEnabled, dec!(1)),
            (ParamName::TrailingDistancePercentage, dec!(25)),
            (ParamName::TakeProfitMultiplier(0), dec!(3)),
            (ParamName::MoonbagPercentage, dec!(10)),
        ];
        let s = apply_parameters(&base, &params, "abcdef0123456789").unwrap();

        assert_eq!(s.id.as_str(), "base-abcdef012345");
        assert!(s.trailing_stop.enabled);
        assert_eq!(s.trailing_stop.distance_percentage, dec!(25));
        assert_eq!(s.take_profit_levels[0].multiplier, dec!(3));
        assert_eq!(s.moonbag.as_ref().map(|m| m.percentage), Some(dec!(10)));
        assert!(s.name.contains("trailing.distance_percentage=25"));
    }

    #[test]
    fn invalid_candidate_is_a_validation_error() {
        let base = ExitStrategy::new("base", "Base").with_take_profit(dec!(2), dec!(60));
        let params = vec![(ParamName::MoonbagPercentage, dec!(50))];
        assert!(matches!(
            apply_parameters(&base, &params, "id"),
            Err(ValidationError::SellPercentagesExceed { .. })
        ));
    }

    #[test]
    fn stagnation_params_enable_the_rule() {
        let mut s = ExitStrategy::new("s", "S");
        ParamName::StagnationHours.apply(&mut s, dec!(4));
        assert!(s.time_rules.stagnation_enabled);
        assert_eq!(s.time_rules.stagnation_hours, dec!(4));
    }

    #[test]
    fn value_checks() {
        assert!(ParamName::TrailingEnabled.check_value(dec!(1)).is_ok());
        assert!(ParamName::TrailingEnabled.check_value(dec!(0.5)).is_err());
        assert!(ParamName::StopLossPercentage.check_value(dec!(-5)).is_err());
        assert!(ParamName::StopLossPercentage.check_value(dec!(0)).is_ok());
    }
}
