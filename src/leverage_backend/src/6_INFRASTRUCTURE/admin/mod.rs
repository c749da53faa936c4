//! Admin Controls Module
//!
//! Audit log for operator actions: configuration changes, pause toggles and
//! force-cancelled swaps. Authorization itself lives in `access`; this module
//! only records what an authorized operator did.

use candid::Principal;
use std::cell::RefCell;
use crate::infrastructure::constants::MAX_ADMIN_LOG_ENTRIES;

/// Admin action log entry
#[derive(Clone, Debug, PartialEq, Eq, candid::CandidType, candid::Deserialize, serde::Serialize)]
pub struct AdminAction {
    pub timestamp: u64,
    pub admin: Principal,
    pub action: String,
}

thread_local! {
    static ADMIN_LOG: RefCell<Vec<AdminAction>> = RefCell::new(Vec::new());
}

/// Log an admin action
pub fn log_admin_action(admin: Principal, action: String, now: u64) {
    ADMIN_LOG.with(|log| {
        let mut log = log.borrow_mut();

        log.push(AdminAction {
            timestamp: now,
            admin,
            action: action.clone(),
        });

        let len = log.len();
        if len > MAX_ADMIN_LOG_ENTRIES {
            log.drain(0..(len - MAX_ADMIN_LOG_ENTRIES));
        }
    });

    crate::log!("📝 Admin action: {} by {}", action, admin);
}

/// Get admin action log
pub fn get_admin_log() -> Vec<AdminAction> {
    ADMIN_LOG.with(|log| log.borrow().clone())
}

pub fn export_admin_log() -> Vec<AdminAction> {
    get_admin_log()
}

pub fn import_admin_log(entries: Vec<AdminAction>) {
    ADMIN_LOG.with(|log| *log.borrow_mut() = entries);
}
