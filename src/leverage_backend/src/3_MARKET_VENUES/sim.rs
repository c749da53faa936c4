//! In-memory venues for engine tests
//!
//! Each venue keeps its state behind a `RefCell` so tests can move prices,
//! settle swaps and inject failures between engine calls while the engine
//! holds a shared reference.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use candid::{Nat, Principal};
use crate::infrastructure::{Result, LeverageError, CapacityError, VenueError};
use crate::infrastructure::math::{checked_sub, div_wad, mul_wad};
use crate::types::{PositionBalances, PriceReading, SwapDirection, SwapFill, SwapIntent};
use crate::_4_TRADING_EXECUTION::slippage::price_within_tolerance;
use super::{LendingMarket, PriceChecker, PriceOracle, SwapGateway, TokenLedger, Venues};

fn rejected(venue: &str, method: &str, reason: impl Into<String>) -> LeverageError {
    LeverageError::Venue(VenueError::Rejected {
        venue: venue.to_string(),
        method: method.to_string(),
        reason: reason.into(),
    })
}

/// One-shot failures, consumed by the next call to the named method
#[derive(Default)]
pub struct Faults(RefCell<Vec<&'static str>>);

impl Faults {
    pub fn fail_next(&self, method: &'static str) {
        self.0.borrow_mut().push(method);
    }

    fn check(&self, venue: &str, method: &'static str) -> Result<()> {
        let mut armed = self.0.borrow_mut();
        if let Some(i) = armed.iter().position(|m| *m == method) {
            armed.remove(i);
            return Err(rejected(venue, method, "venue unavailable"));
        }
        Ok(())
    }
}

pub struct SimOracle {
    reading: RefCell<PriceReading>,
}

impl SimOracle {
    pub fn new(price: Nat, timestamp: u64) -> Self {
        Self { reading: RefCell::new(PriceReading { price, timestamp }) }
    }

    pub fn set(&self, price: Nat, timestamp: u64) {
        *self.reading.borrow_mut() = PriceReading { price, timestamp };
    }
}

impl PriceOracle for SimOracle {
    async fn read(&self) -> Result<PriceReading> {
        Ok(self.reading.borrow().clone())
    }
}

#[derive(Default)]
pub struct SimLending {
    pub balances: RefCell<PositionBalances>,
    /// Remaining borrowable liquidity, unlimited when `None`
    pub borrow_liquidity: RefCell<Option<Nat>>,
    pub faults: Faults,
}

impl LendingMarket for SimLending {
    async fn supply(&self, _asset: Principal, amount: &Nat) -> Result<Nat> {
        self.faults.check("lending", "supply")?;
        let mut b = self.balances.borrow_mut();
        b.collateral += amount.clone();
        Ok(b.collateral.clone())
    }

    async fn withdraw(&self, _asset: Principal, amount: &Nat) -> Result<Nat> {
        self.faults.check("lending", "withdraw")?;
        let mut b = self.balances.borrow_mut();
        b.collateral = checked_sub(&b.collateral, amount, "sim withdraw")
            .map_err(|_| rejected("lending", "withdraw", "insufficient collateral"))?;
        Ok(b.collateral.clone())
    }

    async fn borrow(&self, _asset: Principal, amount: &Nat) -> Result<Nat> {
        self.faults.check("lending", "borrow")?;
        if let Some(liquidity) = self.borrow_liquidity.borrow_mut().as_mut() {
            if amount > liquidity {
                return Err(LeverageError::Capacity(CapacityError::InsufficientLiquidity {
                    venue: "lending".to_string(),
                    reason: format!("{} requested, {} available", amount, liquidity),
                }));
            }
            *liquidity = checked_sub(liquidity, amount, "sim liquidity")?;
        }
        let mut b = self.balances.borrow_mut();
        b.debt += amount.clone();
        Ok(b.debt.clone())
    }

    async fn repay(&self, _asset: Principal, amount: &Nat) -> Result<Nat> {
        self.faults.check("lending", "repay")?;
        let mut b = self.balances.borrow_mut();
        b.debt = checked_sub(&b.debt, amount, "sim repay")
            .map_err(|_| rejected("lending", "repay", "repaying more than owed"))?;
        Ok(b.debt.clone())
    }

    async fn position(&self) -> Result<PositionBalances> {
        self.faults.check("lending", "position")?;
        Ok(self.balances.borrow().clone())
    }
}

pub struct SimSwap {
    pub intent: SwapIntent,
    pub fill: Option<SwapFill>,
    pub cancelled: bool,
}

#[derive(Default)]
pub struct SimGateway {
    pub swaps: RefCell<BTreeMap<u64, SimSwap>>,
    next_id: Cell<u64>,
    pub reject_initiate: Cell<bool>,
}

impl SimGateway {
    /// Settle `swap_id` as if solvers filled it exactly at `fill_price`
    pub fn settle_at_price(&self, swap_id: u64, fill_price: Nat) {
        let mut swaps = self.swaps.borrow_mut();
        let Some(swap) = swaps.get_mut(&swap_id) else { return };
        let amount_out = match swap.intent.direction {
            SwapDirection::Lever => div_wad(&swap.intent.sell_amount, &fill_price),
            SwapDirection::Delever => mul_wad(&swap.intent.sell_amount, &fill_price),
        }
        .unwrap_or_default();
        swap.fill = Some(SwapFill { amount_out, fill_price });
    }

    pub fn settle_with(&self, swap_id: u64, fill: SwapFill) {
        if let Some(swap) = self.swaps.borrow_mut().get_mut(&swap_id) {
            swap.fill = Some(fill);
        }
    }

}

impl SwapGateway for SimGateway {
    async fn initiate(&self, intent: &SwapIntent) -> Result<u64> {
        if self.reject_initiate.get() {
            return Err(rejected("gateway", "initiate_swap", "solver auction closed"));
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.swaps.borrow_mut().insert(id, SimSwap { intent: intent.clone(), fill: None, cancelled: false });
        Ok(id)
    }

    async fn settled_fill(&self, swap_id: u64) -> Result<Option<SwapFill>> {
        match self.swaps.borrow().get(&swap_id) {
            Some(swap) if swap.cancelled => Err(rejected("gateway", "settled_fill", "swap cancelled")),
            Some(swap) => Ok(swap.fill.clone()),
            None => Err(rejected("gateway", "settled_fill", "unknown swap")),
        }
    }

    async fn cancel(&self, swap_id: u64) -> Result<Nat> {
        let mut swaps = self.swaps.borrow_mut();
        match swaps.get_mut(&swap_id) {
            Some(swap) if swap.fill.is_some() => Err(rejected("gateway", "cancel_swap", "already settled")),
            Some(swap) => {
                swap.cancelled = true;
                Ok(swap.intent.sell_amount.clone())
            }
            None => Err(rejected("gateway", "cancel_swap", "unknown swap")),
        }
    }
}

pub struct SimChecker;

impl PriceChecker for SimChecker {
    async fn validate(&self, fill_price: &Nat, twap_price: &Nat, tolerance_bps: u32) -> Result<bool> {
        price_within_tolerance(fill_price, twap_price, tolerance_bps)
    }
}

/// Ledger holding a balance for this canister and recording payouts
pub struct SimLedger {
    pub own_balance: RefCell<Nat>,
    pub received: RefCell<BTreeMap<Principal, Nat>>,
    pub faults: Faults,
}

impl SimLedger {
    pub fn with_balance(balance: Nat) -> Self {
        Self { own_balance: RefCell::new(balance), received: RefCell::new(BTreeMap::new()), faults: Faults::default() }
    }

    pub fn balance_of(&self, owner: Principal) -> Nat {
        self.received.borrow().get(&owner).cloned().unwrap_or_default()
    }
}

impl TokenLedger for SimLedger {
    async fn balance(&self) -> Result<Nat> {
        self.faults.check("ledger", "icrc1_balance_of")?;
        Ok(self.own_balance.borrow().clone())
    }

    async fn transfer(&self, to: Principal, amount: &Nat) -> Result<Nat> {
        self.faults.check("ledger", "icrc1_transfer")?;
        let mut own = self.own_balance.borrow_mut();
        *own = checked_sub(&own, amount, "sim transfer")
            .map_err(|_| rejected("ledger", "icrc1_transfer", "InsufficientFunds"))?;
        let mut received = self.received.borrow_mut();
        let entry = received.entry(to).or_default();
        *entry += amount.clone();
        Ok(Nat::from(received.len() as u64))
    }
}

pub struct SimVenues {
    pub spot: SimOracle,
    pub twap: SimOracle,
    pub lending: SimLending,
    pub gateway: SimGateway,
    pub checker: SimChecker,
    pub native: SimLedger,
    pub collateral: SimLedger,
}

impl SimVenues {
    pub fn new(price: Nat, now: u64, treasury: Nat) -> Self {
        Self {
            spot: SimOracle::new(price.clone(), now),
            twap: SimOracle::new(price, now),
            lending: SimLending::default(),
            gateway: SimGateway::default(),
            checker: SimChecker,
            native: SimLedger::with_balance(treasury),
            collateral: SimLedger::with_balance(Nat::from(u64::MAX)),
        }
    }

    /// Move both oracles to `price`, observed at `timestamp`
    pub fn set_price(&self, price: Nat, timestamp: u64) {
        self.spot.set(price.clone(), timestamp);
        self.twap.set(price, timestamp);
    }

    /// Re-observe the current prices at `timestamp`
    pub fn refresh(&self, timestamp: u64) {
        let spot = self.spot.reading.borrow().price.clone();
        let twap = self.twap.reading.borrow().price.clone();
        self.spot.set(spot, timestamp);
        self.twap.set(twap, timestamp);
    }

    pub fn position(&self) -> PositionBalances {
        self.lending.balances.borrow().clone()
    }
}

impl Venues for SimVenues {
    type Oracle = SimOracle;
    type Lending = SimLending;
    type Gateway = SimGateway;
    type Checker = SimChecker;
    type Ledger = SimLedger;

    fn spot_oracle(&self) -> &SimOracle { &self.spot }
    fn twap_oracle(&self) -> &SimOracle { &self.twap }
    fn lending(&self) -> &SimLending { &self.lending }
    fn gateway(&self) -> &SimGateway { &self.gateway }
    fn price_checker(&self) -> &SimChecker { &self.checker }
    fn native_ledger(&self) -> &SimLedger { &self.native }
    fn collateral_ledger(&self) -> &SimLedger { &self.collateral }
}
