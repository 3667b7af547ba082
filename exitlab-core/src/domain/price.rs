//! PricePoint — one observation of a position's token price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single `(timestamp, price)` observation.
///
/// Histories are expected in chronological order but need not be evenly spaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self { timestamp, price }
    }
}

/// Index of the first point whose timestamp goes backwards, if any.
///
/// Equal timestamps are allowed (several ticks inside one clock resolution).
pub fn first_out_of_order(history: &[PricePoint]) -> Option<usize> {
    history
        .windows(2)
        .position(|w| w[1].timestamp < w[0].timestamp)
        .map(|i| i + 1)
}
