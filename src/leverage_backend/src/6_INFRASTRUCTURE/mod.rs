//! Infrastructure - Shared utilities and types
//! Foundation layer for all other modules

pub mod constants;
pub mod errors;
pub mod math;
pub mod logging;
pub mod access;
pub mod admin;
pub mod config;
pub mod reentrancy;
pub mod stable_storage;

// Re-export commonly used items
pub use constants::*;
pub use errors::{
    LeverageError, Result, GuardError, MarketDataError, CapacityError, CalculationError,
    VenueError, SystemError,
};
pub use math::{multiply_and_divide, mul_wad, div_wad, wad, is_zero};
pub use access::{AccessPolicy, CallerIdentity, CallOrigin, Capability};
pub use reentrancy::OperationGuard;
pub use admin::{log_admin_action, get_admin_log, AdminAction};
