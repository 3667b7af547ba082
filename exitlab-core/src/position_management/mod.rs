/// Position management: trailing stop state machine + ratchet invariant
///
/// **Key Design Principles:**
/// 1. The trailing stop is a per-position value type; whoever owns it is its only writer
/// 2. **Ratchet invariant**: once active, the stop level may rise, never fall
/// 3. The live tracker is a caller-owned store keyed by position id, never a global
///
/// **Module Structure:**
/// - `ratchet`: high-water mark enforcement
/// - `trailing_stop`: INACTIVE → ACTIVE → TRIGGERED state machine
/// - `tracker`: concurrent store of trailing stops for live positions
pub mod ratchet;
pub mod tracker;
pub mod trailing_stop;

pub use ratchet::RatchetLevel;
pub use tracker::TrailingStopTracker;
pub use trailing_stop::{
    RatchetMove, TrailingState, TrailingStop, TrailingStopStatus, TrailingStopTrigger,
    TrailingStopUpdate,
};
