//! Automation - Keeps registered strategies serviced on a timer

pub mod registrar;

pub use registrar::{AutomationRegistrar, RegisteredStrategy, UpkeepOutcome};
