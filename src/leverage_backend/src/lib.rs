//! Leverage Backend - Carry-trade position manager with Numbered Zones
//!
//! Architecture:
//! 1_CRITICAL_OPERATIONS - Engage, rebalance, TWAP iteration, ripcord, settlement
//! 2_CRITICAL_DATA - Position snapshot, leverage math, rebalance decision
//! 3_MARKET_VENUES - Oracles, lending market, swap gateway, price checker, ledgers
//! 4_TRADING_EXECUTION - Chunk sizing, slippage, swap intents
//! 5_INFORMATIONAL - Status views
//! 6_INFRASTRUCTURE - Math, errors, constants, access, persistence
//! 7_AUTOMATION - Registrar polling registered strategies

// Import numbered modules with explicit paths
#[path = "1_CRITICAL_OPERATIONS/mod.rs"]
mod critical_operations_1;
use critical_operations_1 as _1_CRITICAL_OPERATIONS;

#[path = "2_CRITICAL_DATA/mod.rs"]
mod critical_data_2;
use critical_data_2 as _2_CRITICAL_DATA;

#[path = "3_MARKET_VENUES/mod.rs"]
mod market_venues_3;
use market_venues_3 as _3_MARKET_VENUES;

#[path = "4_TRADING_EXECUTION/mod.rs"]
mod trading_execution_4;
use trading_execution_4 as _4_TRADING_EXECUTION;

#[path = "5_INFORMATIONAL/mod.rs"]
mod informational_5;
use informational_5 as _5_INFORMATIONAL;

#[path = "6_INFRASTRUCTURE/mod.rs"]
mod infrastructure_6;
use infrastructure_6 as infrastructure;

#[path = "7_AUTOMATION/mod.rs"]
mod automation_7;
use automation_7 as _7_AUTOMATION;

mod types;

use candid::{candid_method, Nat, Principal};
use ic_cdk::{init, pre_upgrade, post_upgrade, query, update};
use infrastructure::{Result, AdminAction};
use types::{
    Decision, ExecutionParams, IncentiveParams, InitArgs, LeverageBands, RuntimeState, SettlementReceipt,
    SwapRecord, SwapTicket,
};
use _1_CRITICAL_OPERATIONS::{runtime, IterateOutcome, RipcordReceipt};
use _5_INFORMATIONAL::{PositionReport, StrategyStatus};
use _7_AUTOMATION::{registrar, RegisteredStrategy, UpkeepOutcome};

// ===== CAPITAL ROUTER =====

/// Supply collateral already transferred to this canister
#[update]
#[candid_method(update)]
async fn deposit(amount: Nat) -> Result<Nat> {
    runtime::deposit(amount).await
}

/// Withdraw collateral to the capital router
#[update]
#[candid_method(update)]
async fn withdraw(amount: Nat) -> Result<Nat> {
    runtime::withdraw(amount).await
}

// ===== LEVERAGE ENGINE =====

#[update]
#[candid_method(update)]
async fn engage() -> Result<SwapTicket> {
    runtime::engage().await
}

#[update]
#[candid_method(update)]
async fn rebalance() -> Result<SwapTicket> {
    runtime::rebalance().await
}

#[update]
#[candid_method(update)]
async fn iterate_rebalance() -> Result<IterateOutcome> {
    runtime::iterate_rebalance().await
}

/// Emergency delever, callable by any principal that signs its own call
#[update]
#[candid_method(update)]
async fn ripcord() -> Result<RipcordReceipt> {
    runtime::ripcord().await
}

/// Collect ripcord rewards whose transfer failed earlier
#[update]
#[candid_method(update)]
async fn claim_ripcord_reward() -> Result<Nat> {
    runtime::claim_ripcord_reward().await
}

#[update]
#[candid_method(update)]
async fn disengage() -> Result<SwapTicket> {
    runtime::disengage().await
}

#[update]
#[candid_method(update)]
async fn complete_swap() -> Result<SettlementReceipt> {
    runtime::complete_swap().await
}

#[update]
#[candid_method(update)]
async fn cancel_pending_swap() -> Result<Nat> {
    runtime::cancel_pending_swap().await
}

/// Reads oracles and the lending market, so it runs as an update call
#[update]
#[candid_method(update)]
async fn should_rebalance() -> Result<Decision> {
    runtime::should_rebalance().await
}

#[update]
#[candid_method(update)]
async fn get_current_leverage() -> Result<Nat> {
    runtime::current_leverage().await
}

#[update]
#[candid_method(update)]
async fn get_real_assets() -> Result<Nat> {
    runtime::real_assets().await
}

#[update]
#[candid_method(update)]
async fn get_position_report() -> Result<PositionReport> {
    let engine = runtime::with_engine(|engine| engine.clone())?;
    let venues = _3_MARKET_VENUES::ic::IcVenues::from_config(engine.config());
    _5_INFORMATIONAL::position_report(&engine, &venues, ic_cdk::api::time()).await
}

// ===== QUERIES =====

#[query]
#[candid_method(query)]
fn get_runtime_state() -> Result<RuntimeState> {
    runtime::get_runtime_state()
}

#[query]
#[candid_method(query)]
fn get_strategy_status() -> Result<StrategyStatus> {
    runtime::with_engine(_5_INFORMATIONAL::strategy_status)
}

#[query]
#[candid_method(query)]
fn get_swap_history() -> Result<Vec<SwapRecord>> {
    runtime::get_swap_history()
}

#[query]
#[candid_method(query)]
fn get_owed_rewards() -> Result<Vec<(Principal, Nat)>> {
    runtime::get_owed_rewards()
}

/// Name of the engine operation holding the guard, if any
#[query]
#[candid_method(query)]
fn get_operation_in_progress() -> Option<String> {
    infrastructure::reentrancy::current_operation()
}

#[query]
#[candid_method(query)]
fn get_canister_id() -> Principal {
    ic_cdk::id()
}

#[query]
#[candid_method(query)]
fn get_cycles_balance() -> Nat {
    Nat::from(ic_cdk::api::canister_balance128())
}

// ===== ADMIN CONTROLS =====

#[update]
#[candid_method(update)]
fn set_leverage_bands(bands: LeverageBands) -> Result<()> {
    runtime::set_leverage_bands(bands)
}

#[update]
#[candid_method(update)]
fn set_execution_params(execution: ExecutionParams) -> Result<()> {
    runtime::set_execution_params(execution)
}

#[update]
#[candid_method(update)]
fn set_incentive_params(incentive: IncentiveParams) -> Result<()> {
    runtime::set_incentive_params(incentive)
}

/// Pause blocks deposit, engage, rebalance and iterate_rebalance
#[update]
#[candid_method(update)]
fn set_paused(paused: bool) -> Result<()> {
    runtime::set_paused(paused)
}

/// Get admin action log (operator only)
#[query]
#[candid_method(query)]
fn get_admin_action_log() -> Result<Vec<AdminAction>> {
    runtime::get_admin_action_log()
}

// ===== AUTOMATION REGISTRAR =====

#[update]
#[candid_method(update)]
fn register_strategy(strategy: Principal) -> Result<()> {
    registrar::register_strategy(strategy)
}

#[update]
#[candid_method(update)]
fn deregister_strategy(strategy: Principal) -> Result<()> {
    registrar::deregister_strategy(strategy)
}

#[query]
#[candid_method(query)]
fn list_strategies() -> Vec<RegisteredStrategy> {
    registrar::list_strategies()
}

#[update]
#[candid_method(update)]
async fn check_upkeep(strategy: Principal) -> Result<Decision> {
    registrar::check_strategy(strategy).await
}

#[update]
#[candid_method(update)]
async fn perform_upkeep(strategy: Principal) -> Result<UpkeepOutcome> {
    registrar::perform_strategy_upkeep(strategy).await
}

// ===== INITIALIZATION =====

#[init]
fn init(args: InitArgs) {
    ic_cdk::println!("===================================");
    ic_cdk::println!("Leverage Backend Initialized");
    ic_cdk::println!("Architecture: Numbered Security Zones");
    ic_cdk::println!("===================================");

    if let Err(e) = runtime::initialize(args) {
        ic_cdk::trap(&format!("Invalid install arguments: {}", e));
    }

    registrar::start_automation_timer();
}

#[pre_upgrade]
fn pre_upgrade() {
    ic_cdk::println!("===================================");
    ic_cdk::println!("Leverage Backend Pre-Upgrade");
    ic_cdk::println!("===================================");

    infrastructure::stable_storage::save_state(infrastructure::stable_storage::StableState {
        engine: runtime::export_engine(),
        admin_log: infrastructure::admin::export_admin_log(),
        registrar: registrar::export_registrar(),
    });
}

#[post_upgrade]
fn post_upgrade() {
    ic_cdk::println!("===================================");
    ic_cdk::println!("Leverage Backend Post-Upgrade");
    ic_cdk::println!("===================================");

    let state = infrastructure::stable_storage::restore_state();
    let swaps = state.engine.as_ref().map(|e| e.swap_history().len()).unwrap_or(0);

    match state.engine {
        Some(engine) => runtime::install(engine),
        None => ic_cdk::println!("⚠️ No engine restored; canister must be reinstalled with InitArgs"),
    }
    infrastructure::admin::import_admin_log(state.admin_log);
    registrar::import_registrar(state.registrar);

    registrar::start_automation_timer();

    ic_cdk::println!("✅ Backend upgraded successfully ({} swap records restored)", swaps);
}

// ===== CANDID EXPORT =====

ic_cdk::export_candid!();
