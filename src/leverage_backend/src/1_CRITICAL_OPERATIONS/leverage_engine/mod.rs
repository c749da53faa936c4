//! # Leverage Engine
//!
//! Owns the position state machine and every operation that moves funds.
//!
//! ## States
//! ```text
//!            engage / rebalance / iterate / ripcord / disengage
//!   IDLE  ───────────────────────────────────────────────▶  PENDING_LEVER
//!    ▲                                                       PENDING_DELEVER
//!    └──────────── complete_swap / cancel_pending_swap ─────────┘
//! ```
//! At most one chunk is in flight. A pending swap must settle (or be
//! force-cancelled by the operator) before anything new is sized.
//!
//! ## Commit Protocol
//! Each operation reads and validates first, then performs its venue calls,
//! then stages the next `RuntimeState` and assigns it in one step. Any `Err`
//! returns before the assignment, so a failed call leaves the engine exactly
//! as it was. Every operation ends on a single fallible venue write
//! (`initiate` when opening a chunk, `supply`/`repay` when settling one), so a
//! retry never applies the same funds twice. Once a venue has released funds
//! that cannot be undone (a cancelled swap, a withdrawal whose transfer
//! failed), the engine records where they sit instead of failing.
//!
//! ## Timekeeping
//! `now` is passed in by the caller (`ic_cdk::api::time()` in the canister)
//! so every guard is a pure comparison against stored timestamps.

use std::collections::BTreeMap;
use candid::{CandidType, Deserialize, Nat, Principal};
use serde::Serialize;
use crate::infrastructure::{Result, GuardError, CapacityError, MarketDataError, LeverageError, CalculationError};
use crate::infrastructure::{AccessPolicy, CallerIdentity, Capability, MAX_SWAP_HISTORY, NANOS_PER_SECOND, SWAP_CANCEL_GRACE_NANOS};
use crate::infrastructure::admin::log_admin_action;
use crate::infrastructure::config::{validate_bands, validate_execution, validate_incentive, validate_init_args};
use crate::infrastructure::math::{abs_diff, checked_sub, format_ratio, is_zero, min_nat, wad};
use crate::types::{
    Decision, ExecutionParams, IncentiveParams, InitArgs, LeverageBands, PositionBalances, RuntimeState,
    SettlementReceipt, StrategyConfig, SwapDirection, SwapRecord, SwapState, SwapStatus, SwapTicket, TradeKind,
};
use crate::_2_CRITICAL_DATA::decision::{cooldown_elapsed, cooldown_remaining_seconds, decide, off_target, outside_bands};
use crate::_2_CRITICAL_DATA::position::{leverage_ratio, read_twap, real_assets, take_snapshot, PositionSnapshot};
use crate::_3_MARKET_VENUES::{LendingMarket, PriceChecker, SwapGateway, TokenLedger, Venues};
use crate::_4_TRADING_EXECUTION::sizing::{plan_chunk, plan_unwind, recenter, ChunkPlan};
use crate::_4_TRADING_EXECUTION::slippage::validate_swap_result;
use crate::_4_TRADING_EXECUTION::swaps::prepare_swap;


/// Result of `iterate_rebalance`
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum IterateOutcome {
    /// Another chunk was opened
    Traded(SwapTicket),
    /// The sequence target was already reached; nothing was traded
    Concluded { leverage: Nat },
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone)]
pub struct LeverageEngine {
    pub(crate) policy: AccessPolicy,
    pub(crate) config: StrategyConfig,
    pub(crate) bands: LeverageBands,
    pub(crate) execution: ExecutionParams,
    pub(crate) incentive: IncentiveParams,
    pub(crate) state: RuntimeState,
    /// Swap book, oldest first. The pending record, if any, is the last one.
    pub(crate) swaps: Vec<SwapRecord>,
    /// Ripcord rewards whose transfer failed, claimable by the caller
    pub(crate) owed_rewards: BTreeMap<Principal, Nat>,
}

fn zero() -> Nat {
    Nat::from(0u64)
}

fn nothing_to_rebalance(leverage: &Nat, target: &Nat) -> LeverageError {
    GuardError::NothingToRebalance {
        leverage: format_ratio(leverage),
        target: format_ratio(target),
    }
    .into()
}

impl LeverageEngine {
    pub fn new(args: InitArgs) -> Result<Self> {
        validate_init_args(&args)?;

        crate::log!(
            "✅ Leverage engine configured: target {}, bands [{}, {}], ripcord {}",
            format_ratio(&args.bands.target),
            format_ratio(&args.bands.min),
            format_ratio(&args.bands.max),
            format_ratio(&args.bands.ripcord)
        );

        Ok(Self {
            policy: args.policy,
            config: args.config,
            bands: args.bands,
            execution: args.execution,
            incentive: args.incentive,
            state: RuntimeState::default(),
            swaps: Vec::new(),
            owed_rewards: BTreeMap::new(),
        })
    }

    // ===== Views =====

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn bands(&self) -> &LeverageBands {
        &self.bands
    }

    pub fn execution(&self) -> &ExecutionParams {
        &self.execution
    }

    pub fn incentive(&self) -> &IncentiveParams {
        &self.incentive
    }

    pub fn runtime_state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn swap_state(&self) -> SwapState {
        self.state.swap_state
    }

    pub fn pending_swap_amount(&self) -> &Nat {
        &self.state.pending_swap_amount
    }

    pub fn swap_history(&self) -> &[SwapRecord] {
        &self.swaps
    }

    pub fn owed_rewards(&self) -> &BTreeMap<Principal, Nat> {
        &self.owed_rewards
    }

    pub fn pending_record(&self) -> Option<&SwapRecord> {
        let id = self.state.active_swap?;
        self.swaps.iter().rev().find(|r| r.id == id)
    }

    /// Recommended next action. Reads venues, never mutates.
    pub async fn should_rebalance<V: Venues>(&self, venues: &V, now: u64) -> Result<Decision> {
        if self.state.swap_state != SwapState::Idle {
            return Ok(Decision::None);
        }

        let snapshot = self.snapshot(venues, now).await?;
        let leverage = snapshot.leverage()?;
        Ok(decide(&self.state, &self.bands, &self.execution, &self.incentive, &leverage, now))
    }

    /// Leverage at the TWAP price
    pub async fn current_leverage<V: Venues>(&self, venues: &V, now: u64) -> Result<Nat> {
        let (balances, twap) = futures::join!(
            venues.lending().position(),
            read_twap(venues, now, self.execution.max_oracle_age_nanos)
        );
        leverage_ratio(&balances?, &twap?.price)
    }

    /// Net position in collateral units at the TWAP price
    pub async fn real_assets<V: Venues>(&self, venues: &V, now: u64) -> Result<Nat> {
        let (balances, twap) = futures::join!(
            venues.lending().position(),
            read_twap(venues, now, self.execution.max_oracle_age_nanos)
        );
        real_assets(&balances?, &twap?.price)
    }

    // ===== Capital Router =====

    /// Supply collateral the router has already transferred to this canister
    pub async fn deposit<V: Venues>(&mut self, venues: &V, caller: &CallerIdentity, amount: Nat) -> Result<Nat> {
        self.policy.authorize(caller, Capability::CapitalRouter, "deposit")?;
        self.require_unpaused()?;
        self.require_idle()?;
        require_positive(&amount)?;

        let collateral = venues.lending().supply(self.config.collateral_asset, &amount).await?;
        crate::log!("✅ Deposited {} collateral (position now {})", amount, collateral);
        Ok(collateral)
    }

    /// Withdraw collateral and send it to the router
    pub async fn withdraw<V: Venues>(
        &mut self,
        venues: &V,
        caller: &CallerIdentity,
        amount: Nat,
        now: u64,
    ) -> Result<Nat> {
        self.policy.authorize(caller, Capability::CapitalRouter, "withdraw")?;
        self.require_idle()?;
        require_positive(&amount)?;

        let snapshot = self.snapshot(venues, now).await?;
        let remaining = checked_sub(snapshot.collateral(), &amount, "withdraw").map_err(|_| {
            LeverageError::from(CapacityError::InsufficientBalance {
                asset: self.config.collateral_asset.to_text(),
                available: snapshot.collateral().to_string(),
                required: amount.to_string(),
            })
        })?;

        let after = PositionBalances { collateral: remaining.clone(), debt: snapshot.debt().clone() };
        let resulting = leverage_ratio(&after, &snapshot.twap.price).map_err(|_| {
            LeverageError::from(CapacityError::WithdrawalBreachesLeverage {
                resulting: "insolvent".to_string(),
                max: format_ratio(&self.bands.max),
            })
        })?;
        if resulting > self.bands.max {
            return Err(CapacityError::WithdrawalBreachesLeverage {
                resulting: format_ratio(&resulting),
                max: format_ratio(&self.bands.max),
            }
            .into());
        }

        venues.lending().withdraw(self.config.collateral_asset, &amount).await?;
        if let Err(e) = venues.collateral_ledger().transfer(self.policy.capital_router, &amount).await {
            crate::log!("❌ Transfer of {} collateral to router failed: {}", amount, e);
            if let Err(resupply) = venues.lending().supply(self.config.collateral_asset, &amount).await {
                crate::log!("🚨 CRITICAL: {} collateral left idle in the canister: {}", amount, resupply);
                self.state.idle_collateral += amount.clone();
            }
            return Err(e);
        }

        crate::log!("✅ Withdrew {} collateral to router (leverage now {})", amount, format_ratio(&resulting));
        Ok(remaining)
    }

    // ===== State Transitions =====

    /// First leveraging cycle toward `target`
    pub async fn engage<V: Venues>(&mut self, venues: &V, caller: &CallerIdentity, now: u64) -> Result<SwapTicket> {
        self.policy.authorize(caller, Capability::OperatorDirect, "engage")?;
        self.require_unpaused()?;
        self.require_idle()?;
        if self.state.engaged {
            return Err(GuardError::AlreadyEngaged.into());
        }
        self.require_no_sequence()?;

        let snapshot = self.snapshot(venues, now).await?;
        if is_zero(snapshot.collateral()) {
            return Err(GuardError::NoCollateral.into());
        }

        let leverage = snapshot.leverage()?;
        let plan = plan_chunk(&leverage, &self.bands.target, snapshot.collateral(), &self.execution.max_trade_size)?
            .ok_or_else(|| nothing_to_rebalance(&leverage, &self.bands.target))?;

        crate::log!("🔄 Engaging from {} toward {}", format_ratio(&leverage), format_ratio(&self.bands.target));

        let (record, ticket) = self
            .open_chunk(venues, &plan, TradeKind::Engage, self.execution.slippage_tolerance_bps, &snapshot, now)
            .await?;

        let mut next = self.state.clone();
        next.twap_target_ratio = plan.twap_target_ratio.clone();
        next.last_rebalance_time = now;
        Ok(self.commit_chunk(next, record, ticket))
    }

    /// Normal rebalance toward the recentered leverage
    pub async fn rebalance<V: Venues>(&mut self, venues: &V, caller: &CallerIdentity, now: u64) -> Result<SwapTicket> {
        self.policy.authorize(caller, Capability::Authenticated, "rebalance")?;
        self.require_unpaused()?;
        self.require_idle()?;
        self.require_no_sequence()?;
        if !self.state.engaged {
            return Err(GuardError::NotEngaged.into());
        }

        let snapshot = self.snapshot(venues, now).await?;
        let leverage = snapshot.leverage()?;
        self.require_below_ripcord(&leverage)?;

        if !outside_bands(&leverage, &self.bands) {
            if !off_target(&leverage, &self.bands, &self.execution) {
                return Err(nothing_to_rebalance(&leverage, &self.bands.target));
            }
            let interval = self.execution.rebalance_interval_nanos;
            if !cooldown_elapsed(self.state.last_rebalance_time, interval, now) {
                return Err(GuardError::RebalanceNotDue {
                    wait_seconds: cooldown_remaining_seconds(self.state.last_rebalance_time, interval, now),
                }
                .into());
            }
        }

        let new_leverage = recenter(&leverage, &self.bands, &self.execution.recenter_speed)?;
        let plan = plan_chunk(&leverage, &new_leverage, snapshot.collateral(), &self.execution.max_trade_size)?
            .ok_or_else(|| nothing_to_rebalance(&leverage, &new_leverage))?;

        crate::log!("🔄 Rebalancing from {} toward {}", format_ratio(&leverage), format_ratio(&new_leverage));

        let (record, ticket) = self
            .open_chunk(venues, &plan, TradeKind::Rebalance, self.execution.slippage_tolerance_bps, &snapshot, now)
            .await?;

        let mut next = self.state.clone();
        next.twap_target_ratio = plan.twap_target_ratio.clone();
        next.last_rebalance_time = now;
        Ok(self.commit_chunk(next, record, ticket))
    }

    /// Next chunk of an active TWAP sequence
    pub async fn iterate_rebalance<V: Venues>(
        &mut self,
        venues: &V,
        caller: &CallerIdentity,
        now: u64,
    ) -> Result<IterateOutcome> {
        self.policy.authorize(caller, Capability::Authenticated, "iterate_rebalance")?;
        self.require_unpaused()?;
        self.require_idle()?;
        if is_zero(&self.state.twap_target_ratio) {
            return Err(GuardError::NoTwapInProgress.into());
        }
        let cooldown = self.execution.twap_cooldown_nanos;
        if !cooldown_elapsed(self.state.last_rebalance_time, cooldown, now) {
            return Err(GuardError::CooldownActive {
                operation: "iterate_rebalance".to_string(),
                wait_seconds: cooldown_remaining_seconds(self.state.last_rebalance_time, cooldown, now),
            }
            .into());
        }

        let snapshot = self.snapshot(venues, now).await?;
        let leverage = snapshot.leverage()?;
        self.require_below_ripcord(&leverage)?;

        let target = self.state.twap_target_ratio.clone();
        let (plan, kind) = if self.state.unwinding {
            let plan = plan_unwind(
                snapshot.collateral(),
                snapshot.debt(),
                &snapshot.spot.price,
                self.execution.slippage_tolerance_bps,
                &self.execution.max_trade_size,
            )?;
            (plan, TradeKind::Disengage)
        } else if self.target_reached(&leverage, &target) {
            (None, TradeKind::Iterate)
        } else {
            let plan = plan_chunk(&leverage, &target, snapshot.collateral(), &self.execution.max_trade_size)?;
            (plan, TradeKind::Iterate)
        };

        let mut next = self.state.clone();
        next.last_rebalance_time = now;

        let Some(plan) = plan else {
            next.twap_target_ratio = zero();
            next.unwinding = false;
            next.engaged = !is_zero(snapshot.debt());
            self.state = next;
            crate::log!(
                "✅ Sequence toward {} concluded at {} without trading",
                format_ratio(&target),
                format_ratio(&leverage)
            );
            return Ok(IterateOutcome::Concluded { leverage });
        };

        let (record, ticket) = self
            .open_chunk(venues, &plan, kind, self.execution.slippage_tolerance_bps, &snapshot, now)
            .await?;
        Ok(IterateOutcome::Traded(self.commit_chunk(next, record, ticket)))
    }

    /// Start unwinding the whole position back to 1.0
    pub async fn disengage<V: Venues>(&mut self, venues: &V, caller: &CallerIdentity, now: u64) -> Result<SwapTicket> {
        self.policy.authorize(caller, Capability::Operator, "disengage")?;
        self.require_idle()?;

        let snapshot = self.snapshot(venues, now).await?;
        let plan = plan_unwind(
            snapshot.collateral(),
            snapshot.debt(),
            &snapshot.spot.price,
            self.execution.slippage_tolerance_bps,
            &self.execution.max_trade_size,
        )?
        .ok_or(LeverageError::Guard(GuardError::NotEngaged))?;

        let (record, ticket) = self
            .open_chunk(venues, &plan, TradeKind::Disengage, self.execution.slippage_tolerance_bps, &snapshot, now)
            .await?;

        let mut next = self.state.clone();
        next.twap_target_ratio = wad();
        next.unwinding = true;
        next.last_rebalance_time = now;
        let ticket = self.commit_chunk(next, record, ticket);

        log_admin_action(
            caller.principal,
            format!("DISENGAGE started: debt {} over {} collateral", snapshot.debt(), plan.total_notional),
            now,
        );
        Ok(ticket)
    }

    /// Reconcile the pending swap from its settled fill
    pub async fn complete_swap<V: Venues>(
        &mut self,
        venues: &V,
        caller: &CallerIdentity,
        now: u64,
    ) -> Result<SettlementReceipt> {
        self.policy.authorize(caller, Capability::Authenticated, "complete_swap")?;
        let record = self.pending_record().cloned().ok_or(LeverageError::Guard(GuardError::NoPendingSwap))?;

        let twap = read_twap(venues, now, self.execution.max_oracle_age_nanos).await?;

        let fill = venues
            .gateway()
            .settled_fill(record.id)
            .await?
            .ok_or(LeverageError::MarketData(MarketDataError::SwapNotSettled { swap_id: record.id }))?;

        let accepted = venues
            .price_checker()
            .validate(&fill.fill_price, &twap.price, record.price_tolerance_bps)
            .await?;
        if !accepted {
            crate::log!(
                "❌ Fill for swap #{} rejected: price {} vs twap {} (tolerance {} bps)",
                record.id,
                format_ratio(&fill.fill_price),
                format_ratio(&twap.price),
                record.price_tolerance_bps
            );
            return Err(MarketDataError::PriceCheckFailed {
                fill_price: format_ratio(&fill.fill_price),
                twap_price: format_ratio(&twap.price),
                tolerance_bps: record.price_tolerance_bps,
            }
            .into());
        }

        validate_swap_result(&record.expected_out, &fill.amount_out, &record.min_amount_out)?;

        // Post-settlement position is derived, not re-read, so the venue
        // write below is the last fallible step
        let before = venues.lending().position().await?;
        let mut balances = before.clone();
        let mut next = self.state.clone();
        let repay = match record.direction {
            SwapDirection::Lever => {
                balances.collateral += fill.amount_out.clone();
                zero()
            }
            SwapDirection::Delever => {
                let repay = min_nat(&fill.amount_out, &before.debt);
                balances.debt = checked_sub(&before.debt, &repay, "settle repay")?;
                next.residual_debt_asset += checked_sub(&fill.amount_out, &repay, "repay surplus")?;
                repay
            }
        };
        let leverage = leverage_ratio(&balances, &twap.price)?;
        let concluded = self.sequence_concluded(record.direction, &balances, &leverage);

        match record.direction {
            SwapDirection::Lever => {
                venues.lending().supply(self.config.collateral_asset, &fill.amount_out).await?;
            }
            SwapDirection::Delever if !is_zero(&repay) => {
                venues.lending().repay(self.config.debt_asset, &repay).await?;
            }
            SwapDirection::Delever => {}
        }
        if next.residual_debt_asset > self.state.residual_debt_asset {
            crate::log!("💰 Debt fully repaid, residual debt asset now {}", next.residual_debt_asset);
        }

        if concluded {
            next.twap_target_ratio = zero();
            next.unwinding = false;
            next.engaged = !is_zero(&balances.debt);
        }
        next.swap_state = SwapState::Idle;
        next.pending_swap_amount = zero();
        next.active_swap = None;

        let engaged = next.engaged;
        self.state = next;
        self.close_record(
            record.id,
            SwapStatus::Settled {
                amount_out: fill.amount_out.clone(),
                fill_price: fill.fill_price.clone(),
                settled_at: now,
            },
        );

        crate::log!(
            "✅ Swap #{} settled: {} out at {}, leverage {}{}",
            record.id,
            fill.amount_out,
            format_ratio(&fill.fill_price),
            format_ratio(&leverage),
            if concluded { " (sequence concluded)" } else { "" }
        );

        Ok(SettlementReceipt {
            swap_id: record.id,
            amount_out: fill.amount_out,
            fill_price: fill.fill_price,
            leverage_ratio: leverage,
            sequence_concluded: concluded,
            engaged,
        })
    }

    /// Operator exit from a swap the gateway never settled
    pub async fn cancel_pending_swap<V: Venues>(
        &mut self,
        venues: &V,
        caller: &CallerIdentity,
        now: u64,
    ) -> Result<Nat> {
        self.policy.authorize(caller, Capability::Operator, "cancel_pending_swap")?;
        let record = self.pending_record().cloned().ok_or(LeverageError::Guard(GuardError::NoPendingSwap))?;

        let age = now.saturating_sub(record.initiated_at);
        if age < SWAP_CANCEL_GRACE_NANOS {
            return Err(GuardError::SwapNotCancellable {
                swap_id: record.id,
                reason: format!(
                    "swap is {}s old, cancellable after {}s",
                    age / NANOS_PER_SECOND,
                    SWAP_CANCEL_GRACE_NANOS / NANOS_PER_SECOND
                ),
            }
            .into());
        }

        if venues.gateway().settled_fill(record.id).await?.is_some() {
            return Err(GuardError::SwapNotCancellable {
                swap_id: record.id,
                reason: "swap has settled, complete it instead".to_string(),
            }
            .into());
        }

        let refunded = venues.gateway().cancel(record.id).await?;

        // The swap is gone at the gateway: commit first, then return the refund
        let mut next = self.state.clone();
        next.swap_state = SwapState::Idle;
        next.pending_swap_amount = zero();
        next.active_swap = None;
        next.twap_target_ratio = zero();
        next.unwinding = false;
        self.state = next;
        self.close_record(record.id, SwapStatus::Cancelled { refunded: refunded.clone(), cancelled_at: now });
        if !is_zero(&refunded) {
            self.restore_refund(venues, record.direction, &refunded).await;
        }

        log_admin_action(
            caller.principal,
            format!("CANCEL_SWAP #{}: refunded {} and returned it to the lending market", record.id, refunded),
            now,
        );
        Ok(refunded)
    }

    // ===== Configuration =====

    pub fn set_leverage_bands(&mut self, caller: &CallerIdentity, bands: LeverageBands, now: u64) -> Result<()> {
        self.policy.authorize(caller, Capability::Operator, "set_leverage_bands")?;
        self.require_unlocked()?;
        validate_bands(&bands)?;

        log_admin_action(
            caller.principal,
            format!(
                "SET_BANDS target {} min {} max {} ripcord {}",
                format_ratio(&bands.target),
                format_ratio(&bands.min),
                format_ratio(&bands.max),
                format_ratio(&bands.ripcord)
            ),
            now,
        );
        self.bands = bands;
        Ok(())
    }

    pub fn set_execution_params(&mut self, caller: &CallerIdentity, execution: ExecutionParams, now: u64) -> Result<()> {
        self.policy.authorize(caller, Capability::Operator, "set_execution_params")?;
        self.require_unlocked()?;
        validate_execution(&execution)?;
        validate_incentive(&self.incentive, &execution)?;

        log_admin_action(
            caller.principal,
            format!(
                "SET_EXECUTION max_trade {} slippage {}bps interval {}s twap_cooldown {}s",
                execution.max_trade_size,
                execution.slippage_tolerance_bps,
                execution.rebalance_interval_nanos / NANOS_PER_SECOND,
                execution.twap_cooldown_nanos / NANOS_PER_SECOND
            ),
            now,
        );
        self.execution = execution;
        Ok(())
    }

    pub fn set_incentive_params(&mut self, caller: &CallerIdentity, incentive: IncentiveParams, now: u64) -> Result<()> {
        self.policy.authorize(caller, Capability::Operator, "set_incentive_params")?;
        self.require_unlocked()?;
        validate_incentive(&incentive, &self.execution)?;

        log_admin_action(
            caller.principal,
            format!(
                "SET_INCENTIVE reward {} ripcord_max_trade {} cooldown {}s",
                incentive.fixed_reward,
                incentive.ripcord_max_trade,
                incentive.ripcord_cooldown_nanos / NANOS_PER_SECOND
            ),
            now,
        );
        self.incentive = incentive;
        Ok(())
    }

    pub fn set_paused(&mut self, caller: &CallerIdentity, paused: bool, now: u64) -> Result<()> {
        self.policy.authorize(caller, Capability::Operator, "set_paused")?;
        self.state.paused = paused;
        log_admin_action(caller.principal, if paused { "PAUSED" } else { "UNPAUSED" }.to_string(), now);
        Ok(())
    }

    // ===== Internals =====

    async fn snapshot<V: Venues>(&self, venues: &V, now: u64) -> Result<PositionSnapshot> {
        take_snapshot(venues, now, self.execution.max_oracle_age_nanos).await
    }

    pub(crate) fn require_idle(&self) -> Result<()> {
        if self.state.swap_state != SwapState::Idle {
            return Err(GuardError::SwapPending { swap_id: self.state.active_swap.unwrap_or_default() }.into());
        }
        Ok(())
    }

    fn require_unpaused(&self) -> Result<()> {
        if self.state.paused {
            return Err(GuardError::Paused.into());
        }
        Ok(())
    }

    fn require_no_sequence(&self) -> Result<()> {
        if !is_zero(&self.state.twap_target_ratio) {
            return Err(GuardError::TwapInProgress { target: format_ratio(&self.state.twap_target_ratio) }.into());
        }
        Ok(())
    }

    fn require_below_ripcord(&self, leverage: &Nat) -> Result<()> {
        if leverage >= &self.bands.ripcord {
            crate::log!("🚨 Leverage {} at or above ripcord {}", format_ratio(leverage), format_ratio(&self.bands.ripcord));
            return Err(GuardError::RipcordRequired { leverage: format_ratio(leverage) }.into());
        }
        Ok(())
    }

    fn require_unlocked(&self) -> Result<()> {
        if let Some(swap_id) = self.state.active_swap {
            return Err(GuardError::ConfigurationLocked { reason: format!("swap #{} is pending", swap_id) }.into());
        }
        if !is_zero(&self.state.twap_target_ratio) {
            return Err(GuardError::ConfigurationLocked {
                reason: format!("sequence toward {} is active", format_ratio(&self.state.twap_target_ratio)),
            }
            .into());
        }
        Ok(())
    }

    /// Source the sell side of a chunk and hand it to the gateway
    pub(crate) async fn open_chunk<V: Venues>(
        &self,
        venues: &V,
        plan: &ChunkPlan,
        kind: TradeKind,
        tolerance_bps: u32,
        snapshot: &PositionSnapshot,
        now: u64,
    ) -> Result<(SwapRecord, SwapTicket)> {
        let prepared = prepare_swap(&self.config, plan.direction, &plan.chunk, &snapshot.spot.price, tolerance_bps)?;

        match plan.direction {
            SwapDirection::Lever => {
                venues.lending().borrow(self.config.debt_asset, &prepared.amount_in).await?;
            }
            SwapDirection::Delever => {
                venues.lending().withdraw(self.config.collateral_asset, &prepared.amount_in).await?;
            }
        }

        let swap_id = match venues.gateway().initiate(&prepared.intent).await {
            Ok(id) => id,
            Err(e) => {
                self.return_sourced(venues, plan.direction, &prepared.amount_in).await;
                return Err(e);
            }
        };

        crate::log!(
            "🔄 {:?} swap #{} opened: {:?} {} collateral units ({} notional)",
            kind, swap_id, plan.direction, plan.chunk, plan.total_notional
        );

        let record = SwapRecord {
            id: swap_id,
            kind,
            direction: plan.direction,
            chunk: plan.chunk.clone(),
            amount_in: prepared.amount_in,
            expected_out: prepared.expected_out,
            min_amount_out: prepared.intent.min_buy_amount,
            price_tolerance_bps: tolerance_bps,
            initiated_at: now,
            status: SwapStatus::Pending,
        };
        let ticket = SwapTicket {
            swap_id,
            kind,
            direction: plan.direction,
            chunk: plan.chunk.clone(),
            total_notional: plan.total_notional.clone(),
            twap_target_ratio: plan.twap_target_ratio.clone(),
        };
        Ok((record, ticket))
    }

    /// Put funds sourced for a rejected swap back where they came from
    async fn return_sourced<V: Venues>(&self, venues: &V, direction: SwapDirection, amount: &Nat) {
        let result = match direction {
            SwapDirection::Lever => venues.lending().repay(self.config.debt_asset, amount).await,
            SwapDirection::Delever => venues.lending().supply(self.config.collateral_asset, amount).await,
        };
        match result {
            Ok(_) => crate::log!("⚠️ Swap not opened, returned {} to the lending market", amount),
            Err(e) => crate::log!("🚨 CRITICAL: swap not opened and {} could not be returned: {}", amount, e),
        }
    }

    /// Put a cancelled swap's refund back into the lending market. Whatever
    /// cannot be returned is tracked on the state.
    async fn restore_refund<V: Venues>(&mut self, venues: &V, direction: SwapDirection, refunded: &Nat) {
        match direction {
            SwapDirection::Lever => {
                let repaid = self.repay_from(venues, refunded).await;
                match repaid {
                    Ok(surplus) => self.state.residual_debt_asset += surplus,
                    Err(e) => {
                        crate::log!("🚨 CRITICAL: refund of {} debt asset not repaid: {}", refunded, e);
                        self.state.residual_debt_asset += refunded.clone();
                    }
                }
            }
            SwapDirection::Delever => {
                if let Err(e) = venues.lending().supply(self.config.collateral_asset, refunded).await {
                    crate::log!("🚨 CRITICAL: refund of {} collateral not resupplied: {}", refunded, e);
                    self.state.idle_collateral += refunded.clone();
                }
            }
        }
    }

    /// Repay as much debt as `proceeds` cover, returning the surplus
    async fn repay_from<V: Venues>(&self, venues: &V, proceeds: &Nat) -> Result<Nat> {
        let position = venues.lending().position().await?;
        let repay = min_nat(proceeds, &position.debt);
        if !is_zero(&repay) {
            venues.lending().repay(self.config.debt_asset, &repay).await?;
        }
        let surplus = checked_sub(proceeds, &repay, "repay surplus")?;
        if !is_zero(&surplus) {
            crate::log!("💰 {} debt-asset surplus kept as residual", surplus);
        }
        Ok(surplus)
    }

    fn sequence_concluded(&self, direction: SwapDirection, balances: &PositionBalances, leverage: &Nat) -> bool {
        if self.state.unwinding {
            return is_zero(&balances.debt);
        }
        let target = &self.state.twap_target_ratio;
        if is_zero(target) {
            return true;
        }
        self.reached_from(direction, leverage, target)
    }

    /// Sequence target reached, overshoot included, judged by the direction it trades in
    fn target_reached(&self, leverage: &Nat, target: &Nat) -> bool {
        match self.swaps.last() {
            Some(last) => self.reached_from(last.direction, leverage, target),
            None => abs_diff(leverage, target) <= self.execution.target_tolerance,
        }
    }

    fn reached_from(&self, direction: SwapDirection, leverage: &Nat, target: &Nat) -> bool {
        let tolerance = &self.execution.target_tolerance;
        match direction {
            SwapDirection::Lever => leverage.clone() + tolerance.clone() >= *target,
            SwapDirection::Delever => *leverage <= target.clone() + tolerance.clone(),
        }
    }

    pub(crate) fn commit_chunk(&mut self, mut next: RuntimeState, record: SwapRecord, mut ticket: SwapTicket) -> SwapTicket {
        next.swap_state = record.direction.pending_state();
        next.pending_swap_amount = record.chunk.clone();
        next.active_swap = Some(record.id);
        ticket.twap_target_ratio = next.twap_target_ratio.clone();

        self.state = next;
        self.swaps.push(record);
        let len = self.swaps.len();
        if len > MAX_SWAP_HISTORY {
            self.swaps.drain(0..(len - MAX_SWAP_HISTORY));
        }
        ticket
    }

    fn close_record(&mut self, swap_id: u64, status: SwapStatus) {
        if let Some(record) = self.swaps.iter_mut().rev().find(|r| r.id == swap_id) {
            record.status = status;
        }
    }
}

fn require_positive(amount: &Nat) -> Result<()> {
    if is_zero(amount) {
        return Err(CalculationError::InvalidAmount {
            amount: amount.to_string(),
            reason: "amount must be positive".to_string(),
        }
        .into());
    }
    Ok(())
}
