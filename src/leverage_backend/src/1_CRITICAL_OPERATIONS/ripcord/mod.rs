//! # Ripcord
//!
//! Emergency de-risking path, open to any directly-calling principal once
//! leverage reaches the ripcord band.
//!
//! ## Differences from a normal rebalance
//! - Gated only by the short ripcord cooldown, never by the rebalance interval
//! - Targets the `max` band directly, no recentering
//! - Chunks capped at `ripcord_max_trade` with their own slippage tolerance
//! - Cancels any TWAP sequence in progress, except an operator unwind, which
//!   resumes through `iterate_rebalance` once the ripcord chunk settles
//! - Pays `fixed_reward` in the native currency to the caller
//!
//! The reward is paid after the chunk is committed. A short treasury reduces
//! the reward, never the de-risking trade. A reward whose transfer fails is
//! recorded as owed and can be collected with `claim_ripcord_reward`.

use candid::{CandidType, Deserialize, Nat, Principal};
use serde::Serialize;
use crate::infrastructure::{Result, GuardError, CapacityError, CallerIdentity, Capability};
use crate::infrastructure::math::{checked_sub, format_ratio, is_zero, min_nat, wad};
use crate::types::{SwapTicket, TradeKind};
use crate::_1_CRITICAL_OPERATIONS::leverage_engine::LeverageEngine;
use crate::_2_CRITICAL_DATA::decision::{cooldown_elapsed, cooldown_remaining_seconds};
use crate::_2_CRITICAL_DATA::position::take_snapshot;
use crate::_3_MARKET_VENUES::{TokenLedger, Venues};
use crate::_4_TRADING_EXECUTION::sizing::plan_chunk;

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RipcordReceipt {
    pub ticket: SwapTicket,
    /// Leverage that triggered the ripcord
    pub leverage: Nat,
    pub reward_paid: Nat,
    /// Reward that could not be transferred, now claimable
    pub reward_owed: Nat,
}

/// Outcome of a reward payout attempt
struct Payout {
    paid: Nat,
    owed: Nat,
}

/// Reward actually payable from the treasury
pub fn reward_amount(fixed_reward: &Nat, treasury: &Nat) -> Nat {
    min_nat(fixed_reward, treasury)
}

impl LeverageEngine {
    pub async fn ripcord<V: Venues>(&mut self, venues: &V, caller: &CallerIdentity, now: u64) -> Result<RipcordReceipt> {
        self.policy.authorize(caller, Capability::DirectOriginator, "ripcord")?;
        self.require_idle()?;

        let snapshot = take_snapshot(venues, now, self.execution.max_oracle_age_nanos).await?;
        let leverage = snapshot.leverage()?;
        if leverage < self.bands.ripcord {
            return Err(GuardError::NotAtRipcord {
                leverage: format_ratio(&leverage),
                ripcord: format_ratio(&self.bands.ripcord),
            }
            .into());
        }

        let cooldown = self.incentive.ripcord_cooldown_nanos;
        if !cooldown_elapsed(self.state.last_ripcord_time, cooldown, now) {
            return Err(GuardError::CooldownActive {
                operation: "ripcord".to_string(),
                wait_seconds: cooldown_remaining_seconds(self.state.last_ripcord_time, cooldown, now),
            }
            .into());
        }

        let plan = plan_chunk(&leverage, &self.bands.max, snapshot.collateral(), &self.incentive.ripcord_max_trade)?
            .ok_or_else(|| GuardError::NotAtRipcord {
                leverage: format_ratio(&leverage),
                ripcord: format_ratio(&self.bands.ripcord),
            })?;

        crate::log!(
            "🚨 RIPCORD by {} at leverage {} (ripcord {}), delevering {} toward {}",
            caller.principal,
            format_ratio(&leverage),
            format_ratio(&self.bands.ripcord),
            plan.chunk,
            format_ratio(&self.bands.max)
        );

        let (record, ticket) = self
            .open_chunk(
                venues,
                &plan,
                TradeKind::Ripcord,
                self.incentive.ripcord_slippage_tolerance_bps,
                &snapshot,
                now,
            )
            .await?;

        let mut next = self.state.clone();
        if self.state.unwinding {
            crate::log!("⚠️ Ripcord interrupts disengage; the unwind resumes after settlement");
            next.twap_target_ratio = wad();
        } else {
            next.twap_target_ratio = Nat::from(0u64);
        }
        next.last_ripcord_time = now;
        next.last_rebalance_time = now;
        let ticket = self.commit_chunk(next, record, ticket);

        let payout = pay_reward(venues, caller.principal, &self.incentive.fixed_reward).await;
        if !is_zero(&payout.owed) {
            *self.owed_rewards.entry(caller.principal).or_default() += payout.owed.clone();
        }

        Ok(RipcordReceipt { ticket, leverage, reward_paid: payout.paid, reward_owed: payout.owed })
    }

    /// Collect ripcord rewards owed to the caller, as far as the treasury covers them
    pub async fn claim_ripcord_reward<V: Venues>(&mut self, venues: &V, caller: &CallerIdentity) -> Result<Nat> {
        self.policy.authorize(caller, Capability::Authenticated, "claim_ripcord_reward")?;
        let owed = self.owed_rewards.get(&caller.principal).cloned().ok_or(GuardError::NoRewardOwed)?;

        let treasury = venues.native_ledger().balance().await?;
        let amount = reward_amount(&owed, &treasury);
        if is_zero(&amount) {
            return Err(CapacityError::InsufficientBalance {
                asset: "native".to_string(),
                available: treasury.to_string(),
                required: owed.to_string(),
            }
            .into());
        }

        venues.native_ledger().transfer(caller.principal, &amount).await?;

        let remaining = checked_sub(&owed, &amount, "claim reward")?;
        if is_zero(&remaining) {
            self.owed_rewards.remove(&caller.principal);
        } else {
            self.owed_rewards.insert(caller.principal, remaining);
        }
        crate::log!("💰 Paid owed ripcord reward {} to {}", amount, caller.principal);
        Ok(amount)
    }
}

async fn pay_reward<V: Venues>(venues: &V, to: Principal, fixed_reward: &Nat) -> Payout {
    let nothing = || Payout { paid: Nat::from(0u64), owed: Nat::from(0u64) };
    if is_zero(fixed_reward) {
        return nothing();
    }

    let treasury = match venues.native_ledger().balance().await {
        Ok(balance) => balance,
        Err(e) => {
            crate::log!("⚠️ Treasury balance unavailable, ripcord reward {} owed to {}: {}", fixed_reward, to, e);
            return Payout { paid: Nat::from(0u64), owed: fixed_reward.clone() };
        }
    };

    let reward = reward_amount(fixed_reward, &treasury);
    if &reward < fixed_reward {
        crate::log!("⚠️ Ripcord treasury short: paying {} of {}", reward, fixed_reward);
    }
    if is_zero(&reward) {
        return nothing();
    }

    match venues.native_ledger().transfer(to, &reward).await {
        Ok(_) => {
            crate::log!("💰 Paid ripcord reward {} to {}", reward, to);
            Payout { paid: reward, owed: Nat::from(0u64) }
        }
        Err(e) => {
            crate::log!("⚠️ Ripcord reward transfer to {} failed, recorded as owed: {}", to, e);
            Payout { paid: Nat::from(0u64), owed: reward }
        }
    }
}
