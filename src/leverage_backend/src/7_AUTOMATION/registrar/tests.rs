use super::*;
use std::cell::{Cell, RefCell};
use candid::Nat;
use futures::executor::block_on;
use crate::infrastructure::CallerIdentity;
use crate::_1_CRITICAL_OPERATIONS::leverage_engine::LeverageEngine;
use crate::_1_CRITICAL_OPERATIONS::leverage_engine::tests::{fixture, operator, ratio, relay, Fixture, MINUTE, NOW};
use crate::_3_MARKET_VENUES::sim::SimVenues;

fn strategy(id: u8) -> Principal {
    Principal::from_slice(&[0, 0, 0, 0, 0, 0, 1, id, 1, 1])
}

struct MockHandle {
    decision: Decision,
    execute_error: Option<LeverageError>,
    pending: bool,
    executed: RefCell<Vec<Decision>>,
    completions: Cell<u32>,
}

impl MockHandle {
    fn deciding(decision: Decision) -> Self {
        Self { decision, execute_error: None, pending: false, executed: RefCell::new(Vec::new()), completions: Cell::new(0) }
    }
}

impl StrategyHandle for MockHandle {
    async fn should_rebalance(&self) -> Result<Decision> {
        Ok(self.decision)
    }

    async fn execute(&self, decision: Decision) -> Result<String> {
        self.executed.borrow_mut().push(decision);
        match &self.execute_error {
            Some(e) => Err(e.clone()),
            None => Ok(format!("{} done", decision.as_str())),
        }
    }

    async fn complete_swap(&self) -> Result<SettlementReceipt> {
        if !self.pending {
            return Err(LeverageError::Guard(GuardError::NoPendingSwap));
        }
        self.completions.set(self.completions.get() + 1);
        Ok(SettlementReceipt {
            swap_id: 1,
            amount_out: Nat::from(1u64),
            fill_price: Nat::from(1u64),
            leverage_ratio: Nat::from(1u64),
            sequence_concluded: true,
            engaged: true,
        })
    }
}

/// Strategy engine driven in-process, calling as another canister would
struct EngineHandle {
    engine: RefCell<LeverageEngine>,
    venues: SimVenues,
    caller: CallerIdentity,
    now: u64,
}

impl EngineHandle {
    fn from_fixture(f: Fixture, now: u64) -> Self {
        Self { engine: RefCell::new(f.engine), venues: f.venues, caller: relay(), now }
    }
}

impl StrategyHandle for EngineHandle {
    async fn should_rebalance(&self) -> Result<Decision> {
        let engine = self.engine.borrow().clone();
        engine.should_rebalance(&self.venues, self.now).await
    }

    async fn execute(&self, decision: Decision) -> Result<String> {
        let mut engine = self.engine.borrow().clone();
        let detail = match decision {
            Decision::None => "nothing to do".to_string(),
            Decision::Rebalance => describe_ticket(&engine.rebalance(&self.venues, &self.caller, self.now).await?),
            Decision::Iterate => match engine.iterate_rebalance(&self.venues, &self.caller, self.now).await? {
                IterateOutcome::Traded(ticket) => describe_ticket(&ticket),
                IterateOutcome::Concluded { leverage } => format!("concluded at {}", leverage),
            },
            Decision::Ripcord => describe_ticket(&engine.ripcord(&self.venues, &self.caller, self.now).await?.ticket),
        };
        *self.engine.borrow_mut() = engine;
        Ok(detail)
    }

    async fn complete_swap(&self) -> Result<SettlementReceipt> {
        let mut engine = self.engine.borrow().clone();
        let receipt = engine.complete_swap(&self.venues, &self.caller, self.now).await?;
        *self.engine.borrow_mut() = engine;
        Ok(receipt)
    }
}

// ===== Registry =====

#[test]
fn test_register_and_deregister() {
    let mut registrar = AutomationRegistrar::default();
    registrar.register(strategy(1), 10).unwrap();
    registrar.register(strategy(2), 20).unwrap();
    assert_eq!(registrar.len(), 2);
    assert!(registrar.register(strategy(1), 30).is_err());
    assert!(registrar.register(Principal::anonymous(), 30).is_err());

    registrar.deregister(strategy(1)).unwrap();
    assert!(registrar.deregister(strategy(1)).is_err());
    assert_eq!(registrar.ids(), vec![strategy(2)]);
    assert_eq!(registrar.list()[0].registered_at, 20);
}

#[test]
fn test_record_keeps_last_outcome_on_check() {
    let mut registrar = AutomationRegistrar::default();
    registrar.register(strategy(1), 0).unwrap();

    let executed = UpkeepOutcome::Executed { decision: Decision::Rebalance, detail: "swap #1".to_string() };
    registrar.record(strategy(1), 5, Decision::Rebalance, Some(executed.clone()));
    registrar.record(strategy(1), 9, Decision::None, None);

    let entry = registrar.get(strategy(1)).unwrap();
    assert_eq!(entry.last_check, Some(9));
    assert_eq!(entry.last_decision, Some(Decision::None));
    assert_eq!(entry.last_outcome, Some(executed));

    // deregistered mid-flight
    registrar.record(strategy(7), 9, Decision::None, None);
    assert_eq!(registrar.len(), 1);
}

// ===== Upkeep =====

#[test]
fn test_no_action_when_nothing_due() {
    let handle = MockHandle::deciding(Decision::None);
    let (decision, outcome) = block_on(perform_upkeep(&handle)).unwrap();
    assert_eq!(decision, Decision::None);
    assert_eq!(outcome, UpkeepOutcome::NoAction);
    assert!(handle.executed.borrow().is_empty());
}

#[test]
fn test_forwards_matching_operation() {
    let handle = MockHandle::deciding(Decision::Iterate);
    let (_, outcome) = block_on(perform_upkeep(&handle)).unwrap();
    assert_eq!(outcome, UpkeepOutcome::Executed { decision: Decision::Iterate, detail: "iterate done".to_string() });
    assert_eq!(*handle.executed.borrow(), vec![Decision::Iterate]);
}

#[test]
fn test_direct_caller_rejection_is_surfaced() {
    let mut handle = MockHandle::deciding(Decision::Ripcord);
    handle.execute_error = Some(LeverageError::Guard(GuardError::DirectCallerRequired {
        principal: strategy(1).to_text(),
        operation: "ripcord".to_string(),
    }));

    let (_, outcome) = block_on(perform_upkeep(&handle)).unwrap();
    assert_eq!(outcome, UpkeepOutcome::RequiresDirectCaller { decision: Decision::Ripcord });
    assert_eq!(handle.executed.borrow().len(), 1);
}

#[test]
fn test_other_failures_are_recorded() {
    let mut handle = MockHandle::deciding(Decision::Rebalance);
    handle.execute_error = Some(LeverageError::Guard(GuardError::Paused));

    let (_, outcome) = block_on(perform_upkeep(&handle)).unwrap();
    assert!(matches!(outcome, UpkeepOutcome::Failed { decision: Decision::Rebalance, ref reason } if reason.contains("paused")));
}

#[test]
fn test_poll_completes_pending_swap_first() {
    let mut handle = MockHandle::deciding(Decision::None);
    handle.pending = true;
    let (_, outcome) = block_on(poll_strategy(&handle));
    assert_eq!(handle.completions.get(), 1);
    assert_eq!(outcome, UpkeepOutcome::NoAction);
}

// ===== Against the engine =====

#[test]
fn test_engine_ripcord_needs_direct_caller() {
    let mut f = fixture();
    f.engage_to_target(NOW);
    f.venues.set_price(ratio(80), NOW + MINUTE);
    let handle = EngineHandle::from_fixture(f, NOW + MINUTE);

    assert_eq!(block_on(check_upkeep(&handle)).unwrap(), Decision::Ripcord);
    let (_, outcome) = block_on(perform_upkeep(&handle)).unwrap();
    assert_eq!(outcome, UpkeepOutcome::RequiresDirectCaller { decision: Decision::Ripcord });
    assert_eq!(handle.venues.gateway.swaps.borrow().len(), 1);
}

#[test]
fn test_engine_band_breach_rebalanced_by_registrar() {
    let mut f = fixture();
    f.engage_to_target(NOW);
    f.venues.set_price(ratio(88), NOW + MINUTE);
    let handle = EngineHandle::from_fixture(f, NOW + MINUTE);

    let (decision, outcome) = block_on(perform_upkeep(&handle)).unwrap();
    assert_eq!(decision, Decision::Rebalance);
    assert!(matches!(outcome, UpkeepOutcome::Executed { decision: Decision::Rebalance, .. }));
    assert_ne!(handle.engine.borrow().swap_state(), crate::types::SwapState::Idle);
}

#[test]
fn test_engine_poll_settles_then_idles() {
    let mut f = fixture();
    f.deposit(100_000);
    block_on(f.engine.engage(&f.venues, &operator(), NOW)).unwrap();
    f.settle_at_market();
    let handle = EngineHandle::from_fixture(f, NOW + MINUTE);

    let (decision, outcome) = block_on(poll_strategy(&handle));
    assert_eq!(decision, Decision::None);
    assert_eq!(outcome, UpkeepOutcome::NoAction);
    assert!(handle.engine.borrow().runtime_state().engaged);
}
