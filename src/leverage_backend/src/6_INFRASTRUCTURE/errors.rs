//! Error taxonomy for the leverage engine
//!
//! Every variant crosses the canister boundary, so all payloads are plain
//! strings and integers. Categories follow how a caller should react:
//! - `Guard`: wrong role, wrong state, cooldown, bad configuration. Do not retry as-is.
//! - `MarketData`: stale or rejected prices, unsettled fills. Retry once data recovers.
//! - `Capacity`: not enough balance or liquidity at a venue.
//! - `Calculation`: arithmetic that has no safe answer.
//! - `Venue`: inter-canister call failed or was rejected.
//! - `System`: canister-level coordination.

use candid::{CandidType, Deserialize};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LeverageError>;

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Error)]
pub enum LeverageError {
    #[error("guard violation: {0}")]
    Guard(GuardError),
    #[error("market data failure: {0}")]
    MarketData(MarketDataError),
    #[error("capacity failure: {0}")]
    Capacity(CapacityError),
    #[error("calculation failure: {0}")]
    Calculation(CalculationError),
    #[error("venue failure: {0}")]
    Venue(VenueError),
    #[error("system failure: {0}")]
    System(SystemError),
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("anonymous callers are not accepted")]
    AnonymousCaller,
    #[error("{principal} lacks the {required} capability")]
    Unauthorized { principal: String, required: String },
    #[error("{principal} is not the originator of this call; {operation} must be invoked directly")]
    DirectCallerRequired { principal: String, operation: String },
    #[error("{operation} is cooling down, retry in {wait_seconds}s")]
    CooldownActive { operation: String, wait_seconds: u64 },
    #[error("swap {swap_id} is still pending settlement")]
    SwapPending { swap_id: u64 },
    #[error("no swap is pending")]
    NoPendingSwap,
    #[error("strategy is not engaged")]
    NotEngaged,
    #[error("strategy is already engaged")]
    AlreadyEngaged,
    #[error("no collateral has been deposited")]
    NoCollateral,
    #[error("leverage {leverage} is at or above the ripcord band, use ripcord")]
    RipcordRequired { leverage: String },
    #[error("leverage {leverage} is below the ripcord band {ripcord}")]
    NotAtRipcord { leverage: String, ripcord: String },
    #[error("a TWAP sequence toward {target} is in progress, use iterate_rebalance")]
    TwapInProgress { target: String },
    #[error("no TWAP sequence is in progress")]
    NoTwapInProgress,
    #[error("rebalance not due for another {wait_seconds}s")]
    RebalanceNotDue { wait_seconds: u64 },
    #[error("leverage {leverage} already within tolerance of {target}")]
    NothingToRebalance { leverage: String, target: String },
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
    #[error("configuration is locked while {reason}")]
    ConfigurationLocked { reason: String },
    #[error("strategy is paused")]
    Paused,
    #[error("swap {swap_id} cannot be cancelled: {reason}")]
    SwapNotCancellable { swap_id: u64, reason: String },
    #[error("no ripcord reward is owed to the caller")]
    NoRewardOwed,
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketDataError {
    #[error("{source_name} price is {age_seconds}s old (max {max_age_seconds}s)")]
    StalePrice { source_name: String, age_seconds: u64, max_age_seconds: u64 },
    #[error("{source_name} reported a non-positive price")]
    NonPositivePrice { source_name: String },
    #[error("fill price {fill_price} deviates from TWAP {twap_price} by more than {tolerance_bps}bps")]
    PriceCheckFailed { fill_price: String, twap_price: String, tolerance_bps: u32 },
    #[error("swap {swap_id} has not settled yet")]
    SwapNotSettled { swap_id: u64 },
    #[error("fill returned {actual}, expected {expected} (minimum {minimum})")]
    SlippageExceeded { expected: String, actual: String, minimum: String },
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("insufficient {asset}: available {available}, required {required}")]
    InsufficientBalance { asset: String, available: String, required: String },
    #[error("{venue} cannot provide liquidity: {reason}")]
    InsufficientLiquidity { venue: String, reason: String },
    #[error("withdrawal would leave leverage at {resulting}, above max {max}")]
    WithdrawalBreachesLeverage { resulting: String, max: String },
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Error)]
pub enum CalculationError {
    #[error("division by zero in {operation}")]
    DivisionByZero { operation: String },
    #[error("position is insolvent: collateral value {collateral_value}, debt {debt}")]
    Insolvent { collateral_value: String, debt: String },
    #[error("overflow in {operation}")]
    Overflow { operation: String },
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: String, reason: String },
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    #[error("call to {venue}.{method} failed: {reason}")]
    CallFailed { venue: String, method: String, reason: String },
    #[error("{venue}.{method} rejected the request: {reason}")]
    Rejected { venue: String, method: String, reason: String },
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Error)]
pub enum SystemError {
    #[error("{operation} is already in progress")]
    OperationInProgress { operation: String },
    #[error("engine has not been initialised")]
    NotInitialized,
}

impl From<GuardError> for LeverageError {
    fn from(e: GuardError) -> Self {
        LeverageError::Guard(e)
    }
}

impl From<MarketDataError> for LeverageError {
    fn from(e: MarketDataError) -> Self {
        LeverageError::MarketData(e)
    }
}

impl From<CapacityError> for LeverageError {
    fn from(e: CapacityError) -> Self {
        LeverageError::Capacity(e)
    }
}

impl From<CalculationError> for LeverageError {
    fn from(e: CalculationError) -> Self {
        LeverageError::Calculation(e)
    }
}

impl From<VenueError> for LeverageError {
    fn from(e: VenueError) -> Self {
        LeverageError::Venue(e)
    }
}

impl From<SystemError> for LeverageError {
    fn from(e: SystemError) -> Self {
        LeverageError::System(e)
    }
}
