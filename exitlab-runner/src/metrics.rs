//! Aggregate metrics over a batch of simulated positions.
//!
//! Every metric is a pure function of the per-position P&L figures. Values are
//! `f64` here: they feed ranking and reporting, not price arithmetic.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use exitlab_core::engine::SimulationResult;

/// Cap for profit factor when there are no losing positions.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub positions: usize,
    /// Sum of per-position simulated P&L, in percent.
    pub total_pnl_pct: f64,
    pub avg_pnl_pct: f64,
    pub median_pnl_pct: f64,
    /// Fraction of positions with positive P&L (0.0–1.0).
    pub win_rate: f64,
    pub profit_factor: f64,
    pub best_pnl_pct: f64,
    pub worst_pnl_pct: f64,
    /// Mean entry-to-close time of positions that fully closed.
    pub avg_hold_hours: f64,
    /// Fraction of positions fully closed before history ended.
    pub closed_rate: f64,
    /// Mean share of the peak run-up actually kept, in percent.
    pub avg_capture_pct: f64,
    /// Mean `simulated − actual` where ground truth was supplied.
    pub avg_delta_pct: Option<f64>,
}

impl BacktestMetrics {
    pub fn compute(results: &[SimulationResult]) -> Self {
        let pnls: Vec<f64> = results.iter().map(|r| to_f64(r.simulated_pnl_pct)).collect();
        let deltas: Vec<f64> = results
            .iter()
            .filter_map(|r| r.delta_pct.map(to_f64))
            .collect();
        Self {
            positions: results.len(),
            total_pnl_pct: pnls.iter().sum(),
            avg_pnl_pct: mean(&pnls),
            median_pnl_pct: median(&pnls),
            win_rate: win_rate(&pnls),
            profit_factor: profit_factor(&pnls),
            best_pnl_pct: pnls.iter().copied().reduce(f64::max).unwrap_or(0.0),
            worst_pnl_pct: pnls.iter().copied().reduce(f64::min).unwrap_or(0.0),
            avg_hold_hours: avg_hold_hours(results),
            closed_rate: closed_rate(results),
            avg_capture_pct: avg_capture_pct(results),
            avg_delta_pct: (!deltas.is_empty()).then(|| mean(&deltas)),
        }
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

// ─── Individual metric functions ────────────────────────────────────

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn win_rate(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    pnls.iter().filter(|p| **p > 0.0).count() as f64 / pnls.len() as f64
}

/// Gross gains / gross losses, capped at [`PROFIT_FACTOR_CAP`].
pub fn profit_factor(pnls: &[f64]) -> f64 {
    let gross_profit: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

pub fn avg_hold_hours(results: &[SimulationResult]) -> f64 {
    let hours: Vec<f64> = results
        .iter()
        .filter_map(|r| r.hold_duration())
        .map(|d| d.num_seconds() as f64 / 3600.0)
        .collect();
    mean(&hours)
}

pub fn closed_rate(results: &[SimulationResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().filter(|r| r.is_closed()).count() as f64 / results.len() as f64
}

/// Simulated P&L as a share of the best achievable run-up, averaged over
/// positions whose price ever rose above entry.
pub fn avg_capture_pct(results: &[SimulationResult]) -> f64 {
    let captures: Vec<f64> = results
        .iter()
        .filter(|r| r.peak_price > r.entry_price)
        .map(|r| {
            let run_up_pct = (r.peak_price / r.entry_price - Decimal::ONE) * Decimal::ONE_HUNDRED;
            to_f64(r.simulated_pnl_pct / run_up_pct * Decimal::ONE_HUNDRED)
        })
        .collect();
    mean(&captures)
}
