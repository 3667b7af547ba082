//! Domain types for ExitLab

pub mod decision;
pub mod ids;
pub mod position;
pub mod price;
pub mod strategy;

pub use decision::{ExitDecision, ExitReason};
pub use ids::{PositionId, StrategyId};
pub use position::{hours_between, Position};
pub use price::{first_out_of_order, PricePoint};
pub use strategy::{
    ExitStrategy, MoonbagConfig, TakeProfitLevel, TimeRules, TrailingStopConfig, ValidationError,
};
