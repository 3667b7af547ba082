//! Per-parameter sensitivity of the primary objective.
//!
//! For each parameter, results are grouped by that parameter's value and the
//! objective is averaged per group. The score is the population standard
//! deviation of those averages: a parameter whose values all average the same
//! scores 0.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OptimizationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueAverage {
    pub value: Decimal,
    pub average: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSensitivity {
    pub parameter: String,
    /// Value with the highest average objective (smallest value on a tie).
    pub best_value: Decimal,
    pub best_average: f64,
    /// Ascending by value.
    pub averages: Vec<ValueAverage>,
    pub score: f64,
}

pub fn analyze(results: &[OptimizationResult]) -> BTreeMap<String, ParameterSensitivity> {
    let mut groups: BTreeMap<&str, BTreeMap<Decimal, (f64, usize)>> = BTreeMap::new();
    for r in results.iter().filter(|r| r.is_success()) {
        let Some(objective) = r.objective.filter(|o| o.is_finite()) else {
            continue;
        };
        for (name, value) in &r.parameters {
            let slot = groups
                .entry(name.as_str())
                .or_default()
                .entry(*value)
                .or_insert((0.0, 0));
            slot.0 += objective;
            slot.1 += 1;
        }
    }

    groups
        .into_iter()
        .filter_map(|(name, by_value)| {
            let averages: Vec<ValueAverage> = by_value
                .into_iter()
                .map(|(value, (sum, count))| ValueAverage {
                    value,
                    average: sum / count as f64,
                    count,
                })
                .collect();
            let best = averages
                .iter()
                .fold(None::<&ValueAverage>, |best, v| match best {
                    Some(b) if b.average >= v.average => Some(b),
                    _ => Some(v),
                })?;
            let sensitivity = ParameterSensitivity {
                parameter: name.to_string(),
                best_value: best.value,
                best_average: best.average,
                score: population_std_dev(
                    &averages.iter().map(|v| v.average).collect::<Vec<_>>(),
                ),
                averages,
            };
            Some((name.to_string(), sensitivity))
        })
        .collect()
}

pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}
