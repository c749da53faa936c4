//! Stable storage management for upgrade persistence

use candid::{CandidType, Deserialize};
use crate::_1_CRITICAL_OPERATIONS::leverage_engine::LeverageEngine;
use crate::_7_AUTOMATION::registrar::AutomationRegistrar;
use crate::infrastructure::admin::AdminAction;

#[derive(CandidType, Deserialize, Default)]
pub struct StableState {
    pub engine: Option<LeverageEngine>,
    pub admin_log: Vec<AdminAction>,
    pub registrar: AutomationRegistrar,
}

pub fn save_state(state: StableState) {
    crate::log!(
        "💾 Saving engine ({}), {} admin entries and {} registered strategies to stable storage",
        if state.engine.is_some() { "initialised" } else { "empty" },
        state.admin_log.len(),
        state.registrar.len()
    );

    // A failed save must not trap the upgrade. The engine state is lost but
    // funds stay at the venues under the canister's principal.
    match ic_cdk::storage::stable_save((state,)) {
        Ok(_) => {
            crate::log!("✅ Successfully saved state to stable memory");
        }
        Err(e) => {
            crate::log!("⚠️ WARNING: Failed to save state to stable memory: {}", e);
        }
    }
}

pub fn restore_state() -> StableState {
    match ic_cdk::storage::stable_restore::<(StableState,)>() {
        Ok((state,)) => {
            crate::log!(
                "✅ Restored engine, {} admin entries and {} registered strategies from stable storage",
                state.admin_log.len(),
                state.registrar.len()
            );
            state
        }
        Err(e) => {
            crate::log!("⚠️  No stable state to restore (first deployment or empty): {}", e);
            StableState::default()
        }
    }
}
