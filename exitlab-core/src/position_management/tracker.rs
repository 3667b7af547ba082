//! Trailing stop tracker — one `TrailingStop` per live position.
//!
//! The tracker is a caller-owned store, not a global. Each entry is updated
//! under the map's per-key exclusive guard, so updates for one position are
//! serialized while different positions update in parallel.
//!
//! Unknown position ids are a normal state (not yet initialized, or already
//! removed): every operation on them returns an inert result.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::{Position, PositionId, TrailingStopConfig};

use super::trailing_stop::{
    TrailingStop, TrailingStopStatus, TrailingStopTrigger, TrailingStopUpdate,
};

#[derive(Debug, Default)]
pub struct TrailingStopTracker {
    stops: DashMap<PositionId, TrailingStop>,
}

impl TrailingStopTracker {
    pub fn new() -> Self {
        Self {
            stops: DashMap::new(),
        }
    }

    /// Start tracking a position. Re-initializing replaces existing state.
    pub fn initialize(
        &self,
        position: &Position,
        config: &TrailingStopConfig,
    ) -> TrailingStopStatus {
        let stop = TrailingStop::new(position, config);
        let status = stop.status().clone();
        debug!(
            position = %position.id,
            enabled = config.enabled,
            activation = ?status.activation_price,
            "trailing stop initialized"
        );
        self.stops.insert(position.id.clone(), stop);
        status
    }

    /// Feed one price observation for a position.
    pub fn update(
        &self,
        position_id: &PositionId,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> TrailingStopUpdate {
        match self.stops.get_mut(position_id) {
            Some(mut stop) => stop.update(price, at),
            None => TrailingStopUpdate::inert(),
        }
    }

    /// True while trailing is INACTIVE (or untracked) and price is at or
    /// below the regular stop level.
    pub fn should_use_regular_stop_loss(
        &self,
        position_id: &PositionId,
        price: Decimal,
        stop_loss_level: Decimal,
    ) -> bool {
        match self.stops.get(position_id) {
            Some(stop) => stop.should_use_regular_stop_loss(price, stop_loss_level),
            None => price <= stop_loss_level,
        }
    }

    pub fn create_trigger(
        &self,
        position: &Position,
        trigger_price: Decimal,
    ) -> Option<TrailingStopTrigger> {
        self.stops
            .get(&position.id)
            .and_then(|stop| stop.create_trigger(position, trigger_price))
    }

    pub fn status(&self, position_id: &PositionId) -> Option<TrailingStopStatus> {
        self.stops.get(position_id).map(|stop| stop.status().clone())
    }

    /// Stop tracking (position closed). Returns the final status.
    pub fn remove(&self, position_id: &PositionId) -> Option<TrailingStopStatus> {
        self.stops
            .remove(position_id)
            .map(|(_, stop)| stop.status().clone())
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position_management::TrailingState;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn position(id: &str) -> Position {
        Position::new(PositionId::from(id), dec!(1.00), now(), dec!(10))
    }

    #[test]
    fn unknown_position_is_inert() {
        let tracker = TrailingStopTracker::new();
        let id = PositionId::from("ghost");
        assert_eq!(tracker.update(&id, dec!(5), now()), TrailingStopUpdate::inert());
        assert!(tracker.status(&id).is_none());
        assert!(tracker.remove(&id).is_none());
        assert!(tracker.should_use_regular_stop_loss(&id, dec!(0.5), dec!(0.7)));
    }

    #[test]
    fn initialize_update_remove_lifecycle() {
        let tracker = TrailingStopTracker::new();
        let p = position("p1");
        let status =
            tracker.initialize(&p, &TrailingStopConfig::enabled(dec!(2.0), dec!(30)));
        assert_eq!(status.state, TrailingState::Inactive);
        assert_eq!(tracker.len(), 1);

        let u = tracker.update(&p.id, dec!(2.2), now());
        assert!(u.newly_activated);
        assert_eq!(tracker.status(&p.id).unwrap().peak_price, Some(dec!(2.2)));

        let trig = tracker.create_trigger(&p, dec!(1.9)).unwrap();
        assert_eq!(trig.peak_price, dec!(2.2));

        let last = tracker.remove(&p.id).unwrap();
        assert_eq!(last.state, TrailingState::Active);
        assert!(tracker.is_empty());
    }

    #[test]
    fn reinitialize_resets_state() {
        let tracker = TrailingStopTracker::new();
        let p = position("p1");
        let cfg = TrailingStopConfig::enabled(dec!(2.0), dec!(30));
        tracker.initialize(&p, &cfg);
        tracker.update(&p.id, dec!(3.0), now());
        tracker.initialize(&p, &cfg);
        assert_eq!(tracker.status(&p.id).unwrap().state, TrailingState::Inactive);
    }

    #[test]
    fn positions_update_in_parallel_threads() {
        let tracker = Arc::new(TrailingStopTracker::new());
        let cfg = TrailingStopConfig::enabled(dec!(1.5), dec!(10));
        let ids: Vec<String> = (0..8).map(|i| format!("p{i}")).collect();
        for id in &ids {
            tracker.initialize(&position(id), &cfg);
        }

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let pid = PositionId::new(id);
                    for step in 0..50 {
                        let price = dec!(1.5) + Decimal::from(step) / dec!(100);
                        tracker.update(&pid, price, now());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for id in &ids {
            let status = tracker.status(&PositionId::new(id.clone())).unwrap();
            assert_eq!(status.peak_price, Some(dec!(1.99)));
            assert_eq!(status.trailing_stop_level, Some(dec!(1.791)));
        }
    }
}
