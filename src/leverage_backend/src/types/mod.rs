//! Shared data types for the leverage engine

pub mod market;
pub mod state;
pub mod strategy;
pub mod swap;

pub use market::{PositionBalances, PriceReading};
pub use state::{Decision, RuntimeState};
pub use strategy::{ExecutionParams, IncentiveParams, InitArgs, LeverageBands, StrategyConfig};
pub use swap::{
    SettlementReceipt, SwapDirection, SwapFill, SwapIntent, SwapRecord, SwapState, SwapStatus,
    SwapTicket, TradeKind,
};
