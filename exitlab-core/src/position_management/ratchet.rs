/// Ratchet invariant enforcement
///
/// **Core Rule:** a trailing stop level may rise, never fall.
///
/// The trailing stop derives each new level from a strictly larger peak with a
/// fixed positive retain fraction, so the level already rises by construction.
/// The ratchet is the second line: whatever level is proposed, the stored one
/// is `max(current, proposed)`.
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// High-water mark for a long stop level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetLevel {
    current_level: Option<Decimal>,
}

impl RatchetLevel {
    pub fn new() -> Self {
        Self {
            current_level: None,
        }
    }

    pub fn with_initial_level(initial_level: Decimal) -> Self {
        Self {
            current_level: Some(initial_level),
        }
    }

    /// Apply the ratchet to a proposed stop level.
    ///
    /// Returns the stored level after the update: the proposal if it is
    /// higher (or if nothing was stored yet), otherwise the current level.
    ///
    /// # Example
    /// ```
    /// use exitlab_core::position_management::RatchetLevel;
    /// use rust_decimal_macros::dec;
    ///
    /// let mut ratchet = RatchetLevel::with_initial_level(dec!(1.40));
    /// assert_eq!(ratchet.apply(dec!(1.75)), dec!(1.75));
    /// assert_eq!(ratchet.apply(dec!(1.54)), dec!(1.75));
    /// ```
    pub fn apply(&mut self, proposed: Decimal) -> Decimal {
        let level = match self.current_level {
            None => proposed,
            Some(current) => current.max(proposed),
        };
        self.current_level = Some(level);
        level
    }

    pub fn current_level(&self) -> Option<Decimal> {
        self.current_level
    }

    pub fn clear(&mut self) {
        self.current_level = None;
    }
}
