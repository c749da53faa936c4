//! Critical Data - Position accounting and the rebalance decision
//! Source of truth for leverage, equity and what the engine should do next

pub mod position;
pub mod decision;

// Re-export commonly used functions
pub use position::{take_snapshot, leverage_ratio, PositionSnapshot};
pub use decision::{decide, cooldown_elapsed};
