use candid::{CandidType, Deserialize, Nat};
use serde::Serialize;

/// One oracle observation. `price` is WAD-scaled debt units per collateral unit.
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PriceReading {
    pub price: Nat,
    /// Nanoseconds since epoch, as reported by the oracle
    pub timestamp: u64,
}

/// Engine's position at the lending market, raw base units
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PositionBalances {
    pub collateral: Nat,
    pub debt: Nat,
}
