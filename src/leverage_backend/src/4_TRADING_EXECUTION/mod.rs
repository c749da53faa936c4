//! # Trading Execution Module
//!
//! Turns a leverage decision into one bounded swap.
//!
//! ## Architecture
//! - **sizing/**: recentering and TWAP chunk sizing
//! - **slippage/**: minimum-output and fill tolerance checks
//! - **swaps/**: builds the intent handed to the settlement gateway
//!
//! ## Key Constraints
//! - **One chunk at a time**: a chunk is never larger than its cap
//!   (`max_trade_size`, or `ripcord_max_trade` on the emergency path)
//! - **Collateral units**: every chunk is sized in collateral base units,
//!   whichever asset is actually sold
//! - **Slippage Protected**: every intent carries a minimum output

pub mod sizing;
pub mod slippage;
pub mod swaps;
