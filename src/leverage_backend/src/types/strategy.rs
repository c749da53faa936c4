//! Strategy configuration
//!
//! Ratios (`target`, `recenter_speed`, tolerances) are WAD fixed point,
//! amounts are collateral-asset base units, durations are nanoseconds.

use candid::{CandidType, Deserialize, Nat, Principal};
use serde::Serialize;
use crate::infrastructure::access::AccessPolicy;

/// Collaborator canisters, fixed at install
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    pub lending_market: Principal,
    pub collateral_asset: Principal,
    pub debt_asset: Principal,
    pub price_oracle: Principal,
    pub twap_oracle: Principal,
    pub swap_gateway: Principal,
    pub price_checker: Principal,
    /// Native-currency ledger funding ripcord rewards
    pub native_ledger: Principal,
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LeverageBands {
    pub target: Nat,
    pub min: Nat,
    pub max: Nat,
    pub ripcord: Nat,
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionParams {
    pub max_trade_size: Nat,
    pub twap_cooldown_nanos: u64,
    pub slippage_tolerance_bps: u32,
    pub rebalance_interval_nanos: u64,
    /// Fraction of the gap to target closed per normal rebalance, WAD in [0, 1]
    pub recenter_speed: Nat,
    /// Distance from target that counts as "reached", WAD
    pub target_tolerance: Nat,
    /// Oracle readings older than this fail the operation
    pub max_oracle_age_nanos: u64,
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IncentiveParams {
    pub ripcord_slippage_tolerance_bps: u32,
    pub ripcord_cooldown_nanos: u64,
    pub ripcord_max_trade: Nat,
    /// Native-currency base units paid per successful ripcord
    pub fixed_reward: Nat,
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone)]
pub struct InitArgs {
    pub policy: AccessPolicy,
    pub config: StrategyConfig,
    pub bands: LeverageBands,
    pub execution: ExecutionParams,
    pub incentive: IncentiveParams,
}
