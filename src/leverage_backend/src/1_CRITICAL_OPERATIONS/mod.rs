//! # Critical Operations
//!
//! Everything that moves funds or changes the position state machine.
//!
//! - **leverage_engine/**: engage, rebalance, TWAP iteration, disengage, settlement
//! - **ripcord/**: emergency de-risking and the keeper reward
//! - **runtime/**: canister-resident engine, guarded per-call wrappers

pub mod leverage_engine;
pub mod ripcord;
pub mod runtime;

pub use leverage_engine::{IterateOutcome, LeverageEngine};
pub use ripcord::RipcordReceipt;
