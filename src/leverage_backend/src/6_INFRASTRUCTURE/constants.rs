//! System-wide constants

/// Fixed-point scale for ratios and prices (1.0 = 10^18)
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator (100% = 10_000 bps)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Upper bound accepted for any slippage or price-check tolerance (10%)
pub const MAX_TOLERANCE_BPS: u32 = 1_000;

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// A pending swap must be at least this old before the operator may force-cancel it
pub const SWAP_CANCEL_GRACE_NANOS: u64 = 3_600 * NANOS_PER_SECOND;

/// Settled/cancelled swap records kept for audit
pub const MAX_SWAP_HISTORY: usize = 100;

/// Admin log entries kept
pub const MAX_ADMIN_LOG_ENTRIES: usize = 1_000;

/// Automation registrar polling interval (5 minutes)
pub const AUTOMATION_POLL_INTERVAL_SECONDS: u64 = 300;

/// Hard ceiling on any configured leverage band (20x)
pub const MAX_LEVERAGE_RATIO: u128 = 20 * WAD;
