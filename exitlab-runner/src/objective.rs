//! Objective selector — which aggregate metric the optimizer ranks by.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metrics::BacktestMetrics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    TotalPnl,
    AvgPnl,
    MedianPnl,
    WinRate,
    ProfitFactor,
    WorstPnl,
    CaptureRate,
}

impl Objective {
    pub const ALL: [Objective; 7] = [
        Self::TotalPnl,
        Self::AvgPnl,
        Self::MedianPnl,
        Self::WinRate,
        Self::ProfitFactor,
        Self::WorstPnl,
        Self::CaptureRate,
    ];

    /// Extract the objective value from aggregate metrics.
    pub fn extract(&self, metrics: &BacktestMetrics) -> f64 {
        match self {
            Self::TotalPnl => metrics.total_pnl_pct,
            Self::AvgPnl => metrics.avg_pnl_pct,
            Self::MedianPnl => metrics.median_pnl_pct,
            Self::WinRate => metrics.win_rate,
            Self::ProfitFactor => metrics.profit_factor,
            Self::WorstPnl => metrics.worst_pnl_pct,
            Self::CaptureRate => metrics.avg_capture_pct,
        }
    }

    /// Returns true if `a` is better than `b`.
    ///
    /// Higher is better for every objective; for `WorstPnl` a less negative
    /// loss is the higher value.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        a > b
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalPnl => "total_pnl",
            Self::AvgPnl => "avg_pnl",
            Self::MedianPnl => "median_pnl",
            Self::WinRate => "win_rate",
            Self::ProfitFactor => "profit_factor",
            Self::WorstPnl => "worst_pnl",
            Self::CaptureRate => "capture_rate",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
