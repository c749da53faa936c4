//! # Inter-canister Venue Adapters
//!
//! Thin `ic_cdk::call` wrappers, one per collaborator canister named in
//! `StrategyConfig`. Call failures (`RejectionCode`) map to
//! `VenueError::CallFailed`; a venue answering `Err` maps to
//! `VenueError::Rejected`.
//!
//! ## Venue Methods
//! - oracle: `read_price() -> PriceReading`
//! - lending: `supply|withdraw|borrow|repay(asset, amount) -> Result<Nat, String>`,
//!   `position(owner, collateral, debt) -> PositionBalances`
//! - gateway: `initiate_swap(SwapIntent) -> Result<u64, String>`,
//!   `settled_fill(u64) -> Option<SwapFill>`, `cancel_swap(u64) -> Result<Nat, String>`
//! - checker: `validate_fill(Nat, Nat, u32) -> bool`
//! - ledgers: ICRC-1 `icrc1_balance_of` / `icrc1_transfer`, ICRC-2 `icrc2_approve`

use candid::{CandidType, Nat, Principal};
use candid::utils::ArgumentEncoder;
use icrc_ledger_types::icrc1::account::Account;
use icrc_ledger_types::icrc1::transfer::{TransferArg, TransferError};
use icrc_ledger_types::icrc2::approve::{ApproveArgs, ApproveError};
use serde::de::DeserializeOwned;
use crate::infrastructure::{Result, LeverageError, VenueError};
use crate::types::{PositionBalances, PriceReading, StrategyConfig, SwapFill, SwapIntent};
use super::{LendingMarket, PriceChecker, PriceOracle, SwapGateway, TokenLedger, Venues};

/// Gateway allowance lifetime (15 minutes)
const APPROVAL_EXPIRY_NANOS: u64 = 900_000_000_000;

pub(crate) async fn call_venue<A, R>(venue: &str, canister: Principal, method: &str, args: A) -> Result<R>
where
    A: ArgumentEncoder,
    R: CandidType + DeserializeOwned,
{
    let (reply,): (R,) = ic_cdk::call(canister, method, args)
        .await
        .map_err(|(code, msg)| {
            crate::log!("❌ {}.{} call failed: {:?} - {}", venue, method, code, msg);
            LeverageError::Venue(VenueError::CallFailed {
                venue: venue.to_string(),
                method: method.to_string(),
                reason: format!("{:?} - {}", code, msg),
            })
        })?;
    Ok(reply)
}

fn rejected(venue: &str, method: &str, reason: String) -> LeverageError {
    crate::log!("❌ {}.{} rejected: {}", venue, method, reason);
    LeverageError::Venue(VenueError::Rejected {
        venue: venue.to_string(),
        method: method.to_string(),
        reason,
    })
}

pub struct IcOracle {
    canister: Principal,
    label: &'static str,
}

impl PriceOracle for IcOracle {
    async fn read(&self) -> Result<PriceReading> {
        call_venue(self.label, self.canister, "read_price", ()).await
    }
}

pub struct IcLending {
    canister: Principal,
    collateral_asset: Principal,
    debt_asset: Principal,
}

impl IcLending {
    async fn move_funds(&self, method: &str, asset: Principal, amount: &Nat) -> Result<Nat> {
        let reply: std::result::Result<Nat, String> =
            call_venue("lending", self.canister, method, (asset, amount.clone())).await?;
        reply.map_err(|reason| rejected("lending", method, reason))
    }
}

impl LendingMarket for IcLending {
    async fn supply(&self, asset: Principal, amount: &Nat) -> Result<Nat> {
        approve(asset, self.canister, amount).await?;
        self.move_funds("supply", asset, amount).await
    }

    async fn withdraw(&self, asset: Principal, amount: &Nat) -> Result<Nat> {
        self.move_funds("withdraw", asset, amount).await
    }

    async fn borrow(&self, asset: Principal, amount: &Nat) -> Result<Nat> {
        self.move_funds("borrow", asset, amount).await
    }

    async fn repay(&self, asset: Principal, amount: &Nat) -> Result<Nat> {
        approve(asset, self.canister, amount).await?;
        self.move_funds("repay", asset, amount).await
    }

    async fn position(&self) -> Result<PositionBalances> {
        call_venue(
            "lending",
            self.canister,
            "position",
            (ic_cdk::id(), self.collateral_asset, self.debt_asset),
        )
        .await
    }
}

pub struct IcGateway {
    canister: Principal,
}

impl SwapGateway for IcGateway {
    async fn initiate(&self, intent: &SwapIntent) -> Result<u64> {
        approve(intent.sell_asset, self.canister, &intent.sell_amount).await?;
        let reply: std::result::Result<u64, String> =
            call_venue("gateway", self.canister, "initiate_swap", (intent.clone(),)).await?;
        reply.map_err(|reason| rejected("gateway", "initiate_swap", reason))
    }

    async fn settled_fill(&self, swap_id: u64) -> Result<Option<SwapFill>> {
        call_venue("gateway", self.canister, "settled_fill", (swap_id,)).await
    }

    async fn cancel(&self, swap_id: u64) -> Result<Nat> {
        let reply: std::result::Result<Nat, String> =
            call_venue("gateway", self.canister, "cancel_swap", (swap_id,)).await?;
        reply.map_err(|reason| rejected("gateway", "cancel_swap", reason))
    }
}

pub struct IcChecker {
    canister: Principal,
}

impl PriceChecker for IcChecker {
    async fn validate(&self, fill_price: &Nat, twap_price: &Nat, tolerance_bps: u32) -> Result<bool> {
        call_venue(
            "price_checker",
            self.canister,
            "validate_fill",
            (fill_price.clone(), twap_price.clone(), tolerance_bps),
        )
        .await
    }
}

/// ICRC-1 ledger
pub struct IcLedger {
    canister: Principal,
}

impl TokenLedger for IcLedger {
    async fn balance(&self) -> Result<Nat> {
        let account = Account { owner: ic_cdk::id(), subaccount: None };
        call_venue("ledger", self.canister, "icrc1_balance_of", (account,)).await
    }

    async fn transfer(&self, to: Principal, amount: &Nat) -> Result<Nat> {
        let arg = TransferArg {
            from_subaccount: None,
            to: Account { owner: to, subaccount: None },
            fee: None,
            created_at_time: Some(ic_cdk::api::time()),
            memo: None,
            amount: amount.clone(),
        };

        let reply: std::result::Result<Nat, TransferError> =
            call_venue("ledger", self.canister, "icrc1_transfer", (arg,)).await?;

        match reply {
            Ok(block) => {
                crate::log!("✅ Transferred {} to {} (block: {})", amount, to, block);
                Ok(block)
            }
            Err(e) => Err(rejected("ledger", "icrc1_transfer", format!("{:?}", e))),
        }
    }
}

/// Allow `spender` to pull `amount` of `token` from this canister
async fn approve(token: Principal, spender: Principal, amount: &Nat) -> Result<Nat> {
    let now = ic_cdk::api::time();
    let args = ApproveArgs {
        from_subaccount: None,
        spender: Account { owner: spender, subaccount: None },
        amount: amount.clone(),
        expected_allowance: None,
        expires_at: Some(now + APPROVAL_EXPIRY_NANOS),
        fee: None,
        memo: None,
        created_at_time: Some(now),
    };

    let reply: std::result::Result<Nat, ApproveError> =
        call_venue("ledger", token, "icrc2_approve", (args,)).await?;

    reply.map_err(|e| rejected("ledger", "icrc2_approve", format!("{:?}", e)))
}

/// Live venue set built from the stored configuration
pub struct IcVenues {
    spot: IcOracle,
    twap: IcOracle,
    lending: IcLending,
    gateway: IcGateway,
    checker: IcChecker,
    native: IcLedger,
    collateral: IcLedger,
}

impl IcVenues {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            spot: IcOracle { canister: config.price_oracle, label: "spot_oracle" },
            twap: IcOracle { canister: config.twap_oracle, label: "twap_oracle" },
            lending: IcLending {
                canister: config.lending_market,
                collateral_asset: config.collateral_asset,
                debt_asset: config.debt_asset,
            },
            gateway: IcGateway { canister: config.swap_gateway },
            checker: IcChecker { canister: config.price_checker },
            native: IcLedger { canister: config.native_ledger },
            collateral: IcLedger { canister: config.collateral_asset },
        }
    }
}

impl Venues for IcVenues {
    type Oracle = IcOracle;
    type Lending = IcLending;
    type Gateway = IcGateway;
    type Checker = IcChecker;
    type Ledger = IcLedger;

    fn spot_oracle(&self) -> &IcOracle { &self.spot }
    fn twap_oracle(&self) -> &IcOracle { &self.twap }
    fn lending(&self) -> &IcLending { &self.lending }
    fn gateway(&self) -> &IcGateway { &self.gateway }
    fn price_checker(&self) -> &IcChecker { &self.checker }
    fn native_ledger(&self) -> &IcLedger { &self.native }
    fn collateral_ledger(&self) -> &IcLedger { &self.collateral }
}
