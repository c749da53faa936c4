//! Reentrancy guard for engine operations
//! Serialises state-changing calls across inter-canister `await` points
//!
//! The ledger model the engine is written against runs one message at a time.
//! On the IC, a message that awaits another canister yields, and a second
//! message may start in between. `OperationGuard` restores the one-at-a-time
//! model: whoever acquires it first proceeds, everyone else fails immediately
//! with no side effects and may retry.

use std::cell::RefCell;
use crate::infrastructure::errors::{LeverageError, Result, SystemError};

thread_local! {
    /// Name of the operation currently holding the guard
    static ACTIVE_OPERATION: RefCell<Option<String>> = RefCell::new(None);
}

/// Guard for engine operations, released on drop
#[derive(Debug)]
pub struct OperationGuard {
    operation: String,
}

impl OperationGuard {
    /// Acquire the engine for `operation`
    pub fn acquire(operation: &str) -> Result<Self> {
        ACTIVE_OPERATION.with(|active| {
            let mut active = active.borrow_mut();
            match active.as_ref() {
                Some(current) => Err(LeverageError::System(SystemError::OperationInProgress {
                    operation: current.clone(),
                })),
                None => {
                    *active = Some(operation.to_string());
                    Ok(OperationGuard { operation: operation.to_string() })
                }
            }
        })
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        ACTIVE_OPERATION.with(|active| {
            *active.borrow_mut() = None;
        });
    }
}

/// Name of the operation in flight, if any (monitoring)
pub fn current_operation() -> Option<String> {
    ACTIVE_OPERATION.with(|active| active.borrow().clone())
}
