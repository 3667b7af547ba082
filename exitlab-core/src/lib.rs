//! ExitLab Core — exit strategy model, trailing stops, exit rules, simulation.
//!
//! This crate contains the decision engine for selling open positions:
//! - Domain types (strategies, positions, price points, exit decisions)
//! - Trailing stop state machine with ratchet invariant
//! - Caller-owned tracker store for live positions
//! - Fixed-priority exit rule resolver and live evaluator
//! - Pure, deterministic position simulator over price histories

pub mod domain;
pub mod engine;
pub mod position_management;
pub mod rules;

pub use domain::{
    ExitDecision, ExitReason, ExitStrategy, Position, PositionId, PricePoint, StrategyId,
    ValidationError,
};
pub use engine::{simulate, simulate_with_mirror, SimulationError, SimulationResult};
pub use position_management::{TrailingStopTracker, TrailingState};
pub use rules::ExitRuleEvaluator;
