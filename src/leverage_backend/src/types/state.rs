use candid::{CandidType, Deserialize, Nat};
use serde::Serialize;
use super::swap::SwapState;

/// Mutable engine state. Only `LeverageEngine` writes it, by committing a
/// fully staged copy once the operation's venue writes have happened.
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimeState {
    pub swap_state: SwapState,
    /// Non-zero only while a multi-chunk sequence is in progress
    pub twap_target_ratio: Nat,
    /// Size of the chunk awaiting settlement
    pub pending_swap_amount: Nat,
    pub last_rebalance_time: u64,
    pub last_ripcord_time: u64,
    pub engaged: bool,
    /// Gateway id of the in-flight swap
    pub active_swap: Option<u64>,
    pub paused: bool,
    /// Set while a disengage sequence is repaying all debt
    pub unwinding: bool,
    /// Debt-asset proceeds left over after a delever fill repaid all debt
    pub residual_debt_asset: Nat,
    /// Collateral held by the canister that could not be put back into the
    /// lending market
    pub idle_collateral: Nat,
}

/// Output of `should_rebalance`
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    None,
    Rebalance,
    Iterate,
    Ripcord,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::None => "none",
            Decision::Rebalance => "rebalance",
            Decision::Iterate => "iterate",
            Decision::Ripcord => "ripcord",
        }
    }
}
