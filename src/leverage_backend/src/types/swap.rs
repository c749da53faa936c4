//! Swap lifecycle types
//!
//! A chunk goes through two phases. Initiation escrows the sell asset with
//! the settlement gateway and opens a `SwapRecord` keyed by the gateway's
//! swap id. Completion consumes the gateway's `SwapFill` and closes the
//! record. At most one record is `Pending` at any time.

use candid::{CandidType, Deserialize, Nat, Principal};
use serde::Serialize;

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapState {
    #[default]
    Idle,
    PendingLever,
    PendingDelever,
}

impl SwapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapState::Idle => "idle",
            SwapState::PendingLever => "pending_lever",
            SwapState::PendingDelever => "pending_delever",
        }
    }
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Sell borrowed debt asset for collateral
    Lever,
    /// Sell withdrawn collateral for debt asset
    Delever,
}

impl SwapDirection {
    pub fn pending_state(&self) -> SwapState {
        match self {
            SwapDirection::Lever => SwapState::PendingLever,
            SwapDirection::Delever => SwapState::PendingDelever,
        }
    }
}

/// Which operation opened a chunk
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    Engage,
    Rebalance,
    Iterate,
    Ripcord,
    Disengage,
}

/// Order handed to the settlement gateway
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SwapIntent {
    pub direction: SwapDirection,
    pub sell_asset: Principal,
    pub buy_asset: Principal,
    pub sell_amount: Nat,
    pub min_buy_amount: Nat,
    /// Spot price used to size the order, WAD
    pub reference_price: Nat,
}

/// Gateway's report of a settled swap
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SwapFill {
    pub amount_out: Nat,
    /// Realised debt units per collateral unit, WAD
    pub fill_price: Nat,
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum SwapStatus {
    Pending,
    Settled { amount_out: Nat, fill_price: Nat, settled_at: u64 },
    Cancelled { refunded: Nat, cancelled_at: u64 },
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SwapRecord {
    pub id: u64,
    pub kind: TradeKind,
    pub direction: SwapDirection,
    /// Chunk size in collateral units
    pub chunk: Nat,
    /// Amount escrowed with the gateway, in the sell asset
    pub amount_in: Nat,
    pub expected_out: Nat,
    pub min_amount_out: Nat,
    /// Tolerance the price checker applies to this fill
    pub price_tolerance_bps: u32,
    pub initiated_at: u64,
    pub status: SwapStatus,
}

/// Returned by every operation that opens a chunk
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SwapTicket {
    pub swap_id: u64,
    pub kind: TradeKind,
    pub direction: SwapDirection,
    pub chunk: Nat,
    /// Full adjustment the chunk was cut from, collateral units
    pub total_notional: Nat,
    pub twap_target_ratio: Nat,
}

/// Returned by `complete_swap`
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub swap_id: u64,
    pub amount_out: Nat,
    pub fill_price: Nat,
    pub leverage_ratio: Nat,
    /// True when the sequence this chunk belonged to is finished
    pub sequence_concluded: bool,
    pub engaged: bool,
}
