//! # Engine Runtime
//!
//! Holds the single `LeverageEngine` of this canister and runs every
//! operation against the real venues.
//!
//! Each state-changing call:
//! 1. acquires the canister-wide `OperationGuard`
//! 2. checks out a copy of the engine
//! 3. runs the operation with the caller's identity and `ic_cdk::api::time()`
//! 4. stores the copy back, whatever the result
//!
//! A failed operation has not committed its staged state, so storing it is a
//! no-op except for funds the engine had to record as stranded after a venue
//! released them.
//!
//! The guard stays held across every `await`, so no other message can
//! observe or modify the engine while a copy is checked out.

use std::cell::RefCell;
use candid::{Nat, Principal};
use crate::infrastructure::{CallerIdentity, Capability, LeverageError, OperationGuard, Result, SystemError};
use crate::infrastructure::admin::AdminAction;
use crate::types::{
    Decision, ExecutionParams, IncentiveParams, InitArgs, LeverageBands, RuntimeState, SettlementReceipt,
    SwapRecord, SwapTicket,
};
use crate::_3_MARKET_VENUES::ic::IcVenues;
use super::leverage_engine::{IterateOutcome, LeverageEngine};
use super::ripcord::RipcordReceipt;

thread_local! {
    static ENGINE: RefCell<Option<LeverageEngine>> = RefCell::new(None);
}

// ===== Lifecycle =====

/// Validate install arguments and build the engine
pub fn initialize(args: InitArgs) -> Result<()> {
    let engine = LeverageEngine::new(args)?;
    install(engine);
    Ok(())
}

pub fn install(engine: LeverageEngine) {
    ENGINE.with(|e| *e.borrow_mut() = Some(engine));
}

pub fn export_engine() -> Option<LeverageEngine> {
    ENGINE.with(|e| e.borrow().clone())
}

/// Run `f` against the installed engine without modifying it
pub fn with_engine<R>(f: impl FnOnce(&LeverageEngine) -> R) -> Result<R> {
    ENGINE.with(|e| {
        e.borrow()
            .as_ref()
            .map(f)
            .ok_or(LeverageError::System(SystemError::NotInitialized))
    })
}

fn checkout() -> Result<(LeverageEngine, IcVenues)> {
    let engine = export_engine().ok_or(LeverageError::System(SystemError::NotInitialized))?;
    let venues = IcVenues::from_config(engine.config());
    Ok((engine, venues))
}

fn store(engine: LeverageEngine) {
    install(engine);
}

fn caller() -> CallerIdentity {
    CallerIdentity::from_principal(ic_cdk::caller())
}

fn now() -> u64 {
    ic_cdk::api::time()
}

// ===== Capital Router =====

pub async fn deposit(amount: Nat) -> Result<Nat> {
    let _guard = OperationGuard::acquire("deposit")?;
    let (mut engine, venues) = checkout()?;
    let result = engine.deposit(&venues, &caller(), amount).await;
    store(engine);
    result
}

pub async fn withdraw(amount: Nat) -> Result<Nat> {
    let _guard = OperationGuard::acquire("withdraw")?;
    let (mut engine, venues) = checkout()?;
    let result = engine.withdraw(&venues, &caller(), amount, now()).await;
    store(engine);
    result
}

// ===== State Transitions =====

pub async fn engage() -> Result<SwapTicket> {
    let _guard = OperationGuard::acquire("engage")?;
    let (mut engine, venues) = checkout()?;
    let result = engine.engage(&venues, &caller(), now()).await;
    store(engine);
    result
}

pub async fn rebalance() -> Result<SwapTicket> {
    let _guard = OperationGuard::acquire("rebalance")?;
    let (mut engine, venues) = checkout()?;
    let result = engine.rebalance(&venues, &caller(), now()).await;
    store(engine);
    result
}

pub async fn iterate_rebalance() -> Result<IterateOutcome> {
    let _guard = OperationGuard::acquire("iterate_rebalance")?;
    let (mut engine, venues) = checkout()?;
    let result = engine.iterate_rebalance(&venues, &caller(), now()).await;
    store(engine);
    result
}

pub async fn ripcord() -> Result<RipcordReceipt> {
    let _guard = OperationGuard::acquire("ripcord")?;
    let (mut engine, venues) = checkout()?;
    let result = engine.ripcord(&venues, &caller(), now()).await;
    store(engine);
    result
}

pub async fn disengage() -> Result<SwapTicket> {
    let _guard = OperationGuard::acquire("disengage")?;
    let (mut engine, venues) = checkout()?;
    let result = engine.disengage(&venues, &caller(), now()).await;
    store(engine);
    result
}

pub async fn complete_swap() -> Result<SettlementReceipt> {
    let _guard = OperationGuard::acquire("complete_swap")?;
    let (mut engine, venues) = checkout()?;
    let result = engine.complete_swap(&venues, &caller(), now()).await;
    store(engine);
    result
}

pub async fn claim_ripcord_reward() -> Result<Nat> {
    let _guard = OperationGuard::acquire("claim_ripcord_reward")?;
    let (mut engine, venues) = checkout()?;
    let result = engine.claim_ripcord_reward(&venues, &caller()).await;
    store(engine);
    result
}

pub async fn cancel_pending_swap() -> Result<Nat> {
    let _guard = OperationGuard::acquire("cancel_pending_swap")?;
    let (mut engine, venues) = checkout()?;
    let result = engine.cancel_pending_swap(&venues, &caller(), now()).await;
    store(engine);
    result
}

// ===== Configuration =====

fn configure(operation: &str, f: impl FnOnce(&mut LeverageEngine, &CallerIdentity, u64) -> Result<()>) -> Result<()> {
    let _guard = OperationGuard::acquire(operation)?;
    let (mut engine, _) = checkout()?;
    f(&mut engine, &caller(), now())?;
    store(engine);
    Ok(())
}

pub fn set_leverage_bands(bands: LeverageBands) -> Result<()> {
    configure("set_leverage_bands", |engine, caller, now| engine.set_leverage_bands(caller, bands, now))
}

pub fn set_execution_params(execution: ExecutionParams) -> Result<()> {
    configure("set_execution_params", |engine, caller, now| engine.set_execution_params(caller, execution, now))
}

pub fn set_incentive_params(incentive: IncentiveParams) -> Result<()> {
    configure("set_incentive_params", |engine, caller, now| engine.set_incentive_params(caller, incentive, now))
}

pub fn set_paused(paused: bool) -> Result<()> {
    configure("set_paused", |engine, caller, now| engine.set_paused(caller, paused, now))
}

// ===== Views =====

pub async fn should_rebalance() -> Result<Decision> {
    let (engine, venues) = checkout()?;
    engine.should_rebalance(&venues, now()).await
}

pub async fn current_leverage() -> Result<Nat> {
    let (engine, venues) = checkout()?;
    engine.current_leverage(&venues, now()).await
}

pub async fn real_assets() -> Result<Nat> {
    let (engine, venues) = checkout()?;
    engine.real_assets(&venues, now()).await
}

pub fn get_runtime_state() -> Result<RuntimeState> {
    with_engine(|engine| engine.runtime_state().clone())
}

pub fn get_swap_history() -> Result<Vec<SwapRecord>> {
    with_engine(|engine| engine.swap_history().to_vec())
}

pub fn get_owed_rewards() -> Result<Vec<(Principal, Nat)>> {
    with_engine(|engine| engine.owed_rewards().iter().map(|(p, n)| (*p, n.clone())).collect())
}

/// Admin log, readable by the operator only
pub fn get_admin_action_log() -> Result<Vec<AdminAction>> {
    let caller = caller();
    with_engine(|engine| engine.policy().authorize(&caller, Capability::Operator, "get_admin_action_log"))??;
    Ok(crate::infrastructure::get_admin_log())
}
