//! # Automation Registrar
//!
//! Keeps a list of strategy canisters and keeps them moving: every
//! `AUTOMATION_POLL_INTERVAL_SECONDS` the timer visits each registered
//! strategy, completes a settled swap if one is pending, asks
//! `should_rebalance`, and forwards the matching operation.
//!
//! ## Caller class
//! The registrar reaches strategies through inter-canister calls, so every
//! forwarded operation arrives as a delegated caller. `rebalance` and
//! `iterate_rebalance` accept that. `ripcord` does not: the strategy answers
//! `DirectCallerRequired` and the registrar records `RequiresDirectCaller`
//! so a human or off-chain keeper can pull it. The registrar never retries
//! or works around that guard.
//!
//! ## Example Flow
//! ```text
//! poll(strategy)
//!   complete_swap      -> settled chunk reconciled (NoPendingSwap ignored)
//!   should_rebalance   -> Iterate
//!   iterate_rebalance  -> Executed { Iterate, "swap #12 ..." }
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use candid::{CandidType, Deserialize, Principal};
use serde::Serialize;
use crate::infrastructure::{
    Result, LeverageError, GuardError, CallerIdentity, Capability, AUTOMATION_POLL_INTERVAL_SECONDS,
};
use crate::types::{Decision, SettlementReceipt, SwapTicket};
use crate::_1_CRITICAL_OPERATIONS::leverage_engine::IterateOutcome;
use crate::_1_CRITICAL_OPERATIONS::ripcord::RipcordReceipt;
use crate::_1_CRITICAL_OPERATIONS::runtime;
use crate::_3_MARKET_VENUES::ic::call_venue;

// === TYPES ===

/// What happened the last time a strategy was serviced
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum UpkeepOutcome {
    NoAction,
    Executed { decision: Decision, detail: String },
    /// Ripcord is due but only a direct caller may pull it
    RequiresDirectCaller { decision: Decision },
    Failed { decision: Decision, reason: String },
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RegisteredStrategy {
    pub strategy: Principal,
    pub registered_at: u64,
    pub last_check: Option<u64>,
    pub last_decision: Option<Decision>,
    pub last_outcome: Option<UpkeepOutcome>,
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, Default)]
pub struct AutomationRegistrar {
    strategies: BTreeMap<Principal, RegisteredStrategy>,
}

impl AutomationRegistrar {
    pub fn register(&mut self, strategy: Principal, now: u64) -> Result<()> {
        if strategy == Principal::anonymous() {
            return Err(LeverageError::Guard(GuardError::InvalidConfiguration {
                reason: "strategy cannot be the anonymous principal".to_string(),
            }));
        }
        if self.strategies.contains_key(&strategy) {
            return Err(LeverageError::Guard(GuardError::InvalidConfiguration {
                reason: format!("strategy {} is already registered", strategy),
            }));
        }

        self.strategies.insert(strategy, RegisteredStrategy {
            strategy,
            registered_at: now,
            last_check: None,
            last_decision: None,
            last_outcome: None,
        });
        Ok(())
    }

    pub fn deregister(&mut self, strategy: Principal) -> Result<()> {
        self.strategies
            .remove(&strategy)
            .map(|_| ())
            .ok_or_else(|| not_registered(strategy))
    }

    pub fn get(&self, strategy: Principal) -> Option<&RegisteredStrategy> {
        self.strategies.get(&strategy)
    }

    pub fn list(&self) -> Vec<RegisteredStrategy> {
        self.strategies.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<Principal> {
        self.strategies.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Store the result of a check or upkeep. Unknown ids are ignored: the
    /// strategy may have been deregistered while the call was in flight.
    pub fn record(&mut self, strategy: Principal, now: u64, decision: Decision, outcome: Option<UpkeepOutcome>) {
        if let Some(entry) = self.strategies.get_mut(&strategy) {
            entry.last_check = Some(now);
            entry.last_decision = Some(decision);
            if outcome.is_some() {
                entry.last_outcome = outcome;
            }
        }
    }
}

fn not_registered(strategy: Principal) -> LeverageError {
    LeverageError::Guard(GuardError::InvalidConfiguration {
        reason: format!("strategy {} is not registered", strategy),
    })
}

// === STRATEGY HANDLE ===

/// The slice of a strategy's interface the registrar drives
#[allow(async_fn_in_trait)]
pub trait StrategyHandle {
    async fn should_rebalance(&self) -> Result<Decision>;
    /// Forward the operation matching `decision`, returning a one-line summary
    async fn execute(&self, decision: Decision) -> Result<String>;
    async fn complete_swap(&self) -> Result<SettlementReceipt>;
}

/// A strategy canister reached through inter-canister calls
pub struct RemoteStrategy {
    canister: Principal,
}

impl RemoteStrategy {
    pub fn new(canister: Principal) -> Self {
        Self { canister }
    }
}

impl StrategyHandle for RemoteStrategy {
    async fn should_rebalance(&self) -> Result<Decision> {
        call_venue::<_, Result<Decision>>("strategy", self.canister, "should_rebalance", ()).await?
    }

    async fn execute(&self, decision: Decision) -> Result<String> {
        match decision {
            Decision::None => Ok("nothing to do".to_string()),
            Decision::Rebalance => {
                let ticket = call_venue::<_, Result<SwapTicket>>("strategy", self.canister, "rebalance", ()).await??;
                Ok(describe_ticket(&ticket))
            }
            Decision::Iterate => {
                let outcome = call_venue::<_, Result<IterateOutcome>>("strategy", self.canister, "iterate_rebalance", ())
                    .await??;
                Ok(match outcome {
                    IterateOutcome::Traded(ticket) => describe_ticket(&ticket),
                    IterateOutcome::Concluded { leverage } => format!("sequence concluded at {}", leverage),
                })
            }
            Decision::Ripcord => {
                let receipt = call_venue::<_, Result<RipcordReceipt>>("strategy", self.canister, "ripcord", ()).await??;
                Ok(format!("{}, reward {}", describe_ticket(&receipt.ticket), receipt.reward_paid))
            }
        }
    }

    async fn complete_swap(&self) -> Result<SettlementReceipt> {
        call_venue::<_, Result<SettlementReceipt>>("strategy", self.canister, "complete_swap", ()).await?
    }
}

fn describe_ticket(ticket: &SwapTicket) -> String {
    format!(
        "swap #{} {:?} {:?} chunk {} of {}",
        ticket.swap_id, ticket.kind, ticket.direction, ticket.chunk, ticket.total_notional
    )
}

// === UPKEEP ===

pub async fn check_upkeep<H: StrategyHandle>(handle: &H) -> Result<Decision> {
    handle.should_rebalance().await
}

/// Forward whatever the strategy currently asks for
pub async fn perform_upkeep<H: StrategyHandle>(handle: &H) -> Result<(Decision, UpkeepOutcome)> {
    let decision = handle.should_rebalance().await?;
    if decision == Decision::None {
        return Ok((decision, UpkeepOutcome::NoAction));
    }

    let outcome = match handle.execute(decision).await {
        Ok(detail) => UpkeepOutcome::Executed { decision, detail },
        Err(LeverageError::Guard(GuardError::DirectCallerRequired { .. })) => {
            crate::log!("⚠️ {} is due but needs a direct caller, leaving it to keepers", decision.as_str());
            UpkeepOutcome::RequiresDirectCaller { decision }
        }
        Err(e) => UpkeepOutcome::Failed { decision, reason: e.to_string() },
    };
    Ok((decision, outcome))
}

/// Full service of one strategy: settle, then act
pub async fn poll_strategy<H: StrategyHandle>(handle: &H) -> (Decision, UpkeepOutcome) {
    match handle.complete_swap().await {
        Ok(receipt) => crate::log!("✅ Completed swap #{} during upkeep", receipt.swap_id),
        Err(LeverageError::Guard(GuardError::NoPendingSwap)) => {}
        Err(e) => crate::log!("⚠️ Pending swap not completed: {}", e),
    }

    match perform_upkeep(handle).await {
        Ok(result) => result,
        Err(e) => (Decision::None, UpkeepOutcome::Failed { decision: Decision::None, reason: e.to_string() }),
    }
}

// === STATE ===

thread_local! {
    static REGISTRAR: RefCell<AutomationRegistrar> = RefCell::new(AutomationRegistrar::default());
    static AUTOMATION_IN_PROGRESS: RefCell<bool> = RefCell::new(false);
}

pub fn export_registrar() -> AutomationRegistrar {
    REGISTRAR.with(|r| r.borrow().clone())
}

pub fn import_registrar(registrar: AutomationRegistrar) {
    REGISTRAR.with(|r| *r.borrow_mut() = registrar);
}

fn require_operator() -> Result<CallerIdentity> {
    let caller = CallerIdentity::from_principal(ic_cdk::caller());
    runtime::with_engine(|engine| engine.policy().authorize(&caller, Capability::Operator, "registrar"))??;
    Ok(caller)
}

fn require_registered(strategy: Principal) -> Result<()> {
    REGISTRAR.with(|r| r.borrow().get(strategy).map(|_| ()).ok_or_else(|| not_registered(strategy)))
}

// === PUBLIC API ===

pub fn register_strategy(strategy: Principal) -> Result<()> {
    let caller = require_operator()?;
    let now = ic_cdk::api::time();
    REGISTRAR.with(|r| r.borrow_mut().register(strategy, now))?;
    crate::infrastructure::log_admin_action(caller.principal, format!("REGISTER_STRATEGY {}", strategy), now);
    Ok(())
}

pub fn deregister_strategy(strategy: Principal) -> Result<()> {
    let caller = require_operator()?;
    REGISTRAR.with(|r| r.borrow_mut().deregister(strategy))?;
    crate::infrastructure::log_admin_action(caller.principal, format!("DEREGISTER_STRATEGY {}", strategy), ic_cdk::api::time());
    Ok(())
}

pub fn list_strategies() -> Vec<RegisteredStrategy> {
    REGISTRAR.with(|r| r.borrow().list())
}

pub async fn check_strategy(strategy: Principal) -> Result<Decision> {
    require_registered(strategy)?;
    let decision = check_upkeep(&RemoteStrategy::new(strategy)).await?;
    REGISTRAR.with(|r| r.borrow_mut().record(strategy, ic_cdk::api::time(), decision, None));
    Ok(decision)
}

pub async fn perform_strategy_upkeep(strategy: Principal) -> Result<UpkeepOutcome> {
    require_registered(strategy)?;
    let (decision, outcome) = perform_upkeep(&RemoteStrategy::new(strategy)).await?;
    REGISTRAR.with(|r| r.borrow_mut().record(strategy, ic_cdk::api::time(), decision, Some(outcome.clone())));
    Ok(outcome)
}

/// Service every registered strategy once
async fn poll_all() -> usize {
    let ids = REGISTRAR.with(|r| r.borrow().ids());
    for strategy in &ids {
        let (decision, outcome) = poll_strategy(&RemoteStrategy::new(*strategy)).await;
        match &outcome {
            UpkeepOutcome::NoAction => {}
            UpkeepOutcome::Executed { detail, .. } => crate::log!("✅ Upkeep {}: {}", strategy, detail),
            UpkeepOutcome::RequiresDirectCaller { .. } => crate::log!("🚨 Upkeep {}: ripcord awaiting direct caller", strategy),
            UpkeepOutcome::Failed { reason, .. } => crate::log!("❌ Upkeep {} failed: {}", strategy, reason),
        }
        REGISTRAR.with(|r| r.borrow_mut().record(*strategy, ic_cdk::api::time(), decision, Some(outcome)));
    }
    ids.len()
}

/// Start the polling timer
///
/// Called from init and post_upgrade. A cycle still running when the next
/// tick fires makes that tick a no-op.
pub fn start_automation_timer() {
    crate::log!("🕐 Starting automation timer (every {}s)", AUTOMATION_POLL_INTERVAL_SECONDS);

    ic_cdk_timers::set_timer_interval(
        std::time::Duration::from_secs(AUTOMATION_POLL_INTERVAL_SECONDS),
        || {
            let already_running = AUTOMATION_IN_PROGRESS.with(|flag| {
                let is_running = *flag.borrow();
                if !is_running {
                    *flag.borrow_mut() = true;
                }
                is_running
            });

            if already_running {
                crate::log!("⚠️ Automation cycle already in progress, skipping this tick");
                return;
            }

            ic_cdk::spawn(async {
                let polled = poll_all().await;

                AUTOMATION_IN_PROGRESS.with(|flag| {
                    *flag.borrow_mut() = false;
                });

                if polled > 0 {
                    crate::log!("✅ Automation cycle serviced {} strategies", polled);
                }
            });
        },
    );
}

#[cfg(test)]
mod tests;
