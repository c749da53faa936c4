//! # Market Venues
//!
//! Interfaces to every collaborator the engine trades through. The engine is
//! generic over `Venues`, so the same state machine runs against the
//! inter-canister adapters in `ic` and the in-memory venues in `sim`.
//!
//! ## Collaborators
//! - **Price oracles**: spot (swap pricing) and TWAP (leverage accounting)
//! - **Lending market**: holds collateral and debt for the canister
//! - **Settlement gateway**: asynchronous swap settlement, cancellable
//! - **Price checker**: validates a fill price against the TWAP
//! - **Token ledgers**: native-currency treasury and collateral asset
//!
//! Every call returns `Result`: a venue that traps or rejects surfaces as a
//! `VenueError`, never a panic.

#![allow(async_fn_in_trait)]

use candid::{Nat, Principal};
use crate::infrastructure::Result;
use crate::types::{PositionBalances, PriceReading, SwapFill, SwapIntent};

pub mod ic;
#[cfg(test)]
pub mod sim;

pub trait PriceOracle {
    async fn read(&self) -> Result<PriceReading>;
}

/// Lending position of this canister
pub trait LendingMarket {
    async fn supply(&self, asset: Principal, amount: &Nat) -> Result<Nat>;
    async fn withdraw(&self, asset: Principal, amount: &Nat) -> Result<Nat>;
    async fn borrow(&self, asset: Principal, amount: &Nat) -> Result<Nat>;
    async fn repay(&self, asset: Principal, amount: &Nat) -> Result<Nat>;
    async fn position(&self) -> Result<PositionBalances>;
}

pub trait SwapGateway {
    /// Escrow the sell side and open a swap, returning its id
    async fn initiate(&self, intent: &SwapIntent) -> Result<u64>;
    /// `None` until solvers have settled the swap
    async fn settled_fill(&self, swap_id: u64) -> Result<Option<SwapFill>>;
    /// Abandon an unsettled swap and return the escrowed amount
    async fn cancel(&self, swap_id: u64) -> Result<Nat>;
}

pub trait PriceChecker {
    async fn validate(&self, fill_price: &Nat, twap_price: &Nat, tolerance_bps: u32) -> Result<bool>;
}

pub trait TokenLedger {
    /// Balance held by this canister
    async fn balance(&self) -> Result<Nat>;
    /// Transfer from this canister, returning the block index
    async fn transfer(&self, to: Principal, amount: &Nat) -> Result<Nat>;
}

/// The full set of collaborators one engine operation may touch
pub trait Venues {
    type Oracle: PriceOracle;
    type Lending: LendingMarket;
    type Gateway: SwapGateway;
    type Checker: PriceChecker;
    type Ledger: TokenLedger;

    fn spot_oracle(&self) -> &Self::Oracle;
    fn twap_oracle(&self) -> &Self::Oracle;
    fn lending(&self) -> &Self::Lending;
    fn gateway(&self) -> &Self::Gateway;
    fn price_checker(&self) -> &Self::Checker;
    fn native_ledger(&self) -> &Self::Ledger;
    fn collateral_ledger(&self) -> &Self::Ledger;
}
