//! Replay engine: deterministic tick-by-tick simulation of exit strategies.

pub mod simulator;

pub use simulator::{
    simulate, simulate_with_mirror, ExitEvent, SimulationError, SimulationResult,
    MIN_HISTORY_POINTS,
};
