//! Rebalance decision
//!
//! Pure function of engine state, configuration, the current leverage and
//! the clock. It never reads a venue and never mutates anything, so two calls
//! with the same inputs always agree.
//!
//! ## Priority
//! 1. Swap pending → `None` (single flight)
//! 2. Leverage at or above ripcord → `Ripcord`, gated only by the ripcord cooldown
//! 3. TWAP sequence active → `Iterate` once the TWAP cooldown has passed
//! 4. Not engaged → `None`
//! 5. Leverage outside `[min, max]` → `Rebalance`, interval waived
//! 6. Leverage off target by more than the tolerance and interval elapsed → `Rebalance`

use candid::Nat;
use crate::infrastructure::NANOS_PER_SECOND;
use crate::infrastructure::math::{abs_diff, is_zero};
use crate::types::{Decision, ExecutionParams, IncentiveParams, LeverageBands, RuntimeState, SwapState};

/// `last == 0` means never, which is always elapsed
pub fn cooldown_elapsed(last: u64, period_nanos: u64, now: u64) -> bool {
    last == 0 || now.saturating_sub(last) >= period_nanos
}

/// Whole seconds until the cooldown passes, rounded up
pub fn cooldown_remaining_seconds(last: u64, period_nanos: u64, now: u64) -> u64 {
    if cooldown_elapsed(last, period_nanos, now) {
        return 0;
    }
    let remaining = period_nanos - now.saturating_sub(last);
    remaining.div_ceil(NANOS_PER_SECOND)
}

pub fn outside_bands(leverage: &Nat, bands: &LeverageBands) -> bool {
    leverage < &bands.min || leverage > &bands.max
}

pub fn off_target(leverage: &Nat, bands: &LeverageBands, execution: &ExecutionParams) -> bool {
    abs_diff(leverage, &bands.target) > execution.target_tolerance
}

pub fn decide(
    state: &RuntimeState,
    bands: &LeverageBands,
    execution: &ExecutionParams,
    incentive: &IncentiveParams,
    leverage: &Nat,
    now: u64,
) -> Decision {
    if state.swap_state != SwapState::Idle {
        return Decision::None;
    }

    if leverage >= &bands.ripcord {
        return if cooldown_elapsed(state.last_ripcord_time, incentive.ripcord_cooldown_nanos, now) {
            Decision::Ripcord
        } else {
            Decision::None
        };
    }

    if !is_zero(&state.twap_target_ratio) {
        return if cooldown_elapsed(state.last_rebalance_time, execution.twap_cooldown_nanos, now) {
            Decision::Iterate
        } else {
            Decision::None
        };
    }

    if !state.engaged {
        return Decision::None;
    }

    if outside_bands(leverage, bands) {
        return Decision::Rebalance;
    }

    if off_target(leverage, bands, execution)
        && cooldown_elapsed(state.last_rebalance_time, execution.rebalance_interval_nanos, now)
    {
        return Decision::Rebalance;
    }

    Decision::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::WAD;
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000 * NANOS_PER_SECOND;
    const HOUR: u64 = 3_600 * NANOS_PER_SECOND;
    const MINUTE: u64 = 60 * NANOS_PER_SECOND;

    fn r(hundredths: u64) -> Nat {
        Nat::from(WAD / 100 * hundredths as u128)
    }

    fn bands() -> LeverageBands {
        LeverageBands { target: r(200), min: r(170), max: r(230), ripcord: r(250) }
    }

    fn execution() -> ExecutionParams {
        ExecutionParams {
            max_trade_size: Nat::from(100_000u64),
            twap_cooldown_nanos: 5 * MINUTE,
            slippage_tolerance_bps: 50,
            rebalance_interval_nanos: HOUR,
            recenter_speed: r(50),
            target_tolerance: r(5),
            max_oracle_age_nanos: 10 * MINUTE,
        }
    }

    fn incentive() -> IncentiveParams {
        IncentiveParams {
            ripcord_slippage_tolerance_bps: 150,
            ripcord_cooldown_nanos: MINUTE,
            ripcord_max_trade: Nat::from(50_000u64),
            fixed_reward: Nat::from(1_000u64),
        }
    }

    fn engaged() -> RuntimeState {
        RuntimeState { engaged: true, last_rebalance_time: NOW - 2 * HOUR, ..Default::default() }
    }

    fn run(state: &RuntimeState, leverage: u64, now: u64) -> Decision {
        decide(state, &bands(), &execution(), &incentive(), &r(leverage), now)
    }

    #[test]
    fn test_balanced_position_needs_nothing() {
        assert_eq!(run(&engaged(), 202, NOW), Decision::None);
    }

    #[test]
    fn test_pending_swap_blocks_everything() {
        let mut state = engaged();
        state.swap_state = SwapState::PendingDelever;
        assert_eq!(run(&state, 300, NOW), Decision::None);
    }

    #[test]
    fn test_ripcord_uses_its_own_cooldown() {
        let mut state = engaged();
        state.last_rebalance_time = NOW;
        assert_eq!(run(&state, 250, NOW), Decision::Ripcord);

        state.last_ripcord_time = NOW - 30 * NANOS_PER_SECOND;
        assert_eq!(run(&state, 260, NOW), Decision::None);
        assert_eq!(run(&state, 260, NOW + 30 * NANOS_PER_SECOND), Decision::Ripcord);
    }

    #[test]
    fn test_active_sequence_iterates_after_twap_cooldown() {
        let mut state = engaged();
        state.twap_target_ratio = r(200);
        state.last_rebalance_time = NOW - MINUTE;
        assert_eq!(run(&state, 150, NOW), Decision::None);
        assert_eq!(run(&state, 150, NOW + 4 * MINUTE), Decision::Iterate);
    }

    #[test]
    fn test_band_breach_waives_interval() {
        let mut state = engaged();
        state.last_rebalance_time = NOW - MINUTE;
        assert_eq!(run(&state, 240, NOW), Decision::Rebalance);
        assert_eq!(run(&state, 160, NOW), Decision::Rebalance);
    }

    #[test]
    fn test_drift_inside_bands_waits_for_interval() {
        let mut state = engaged();
        state.last_rebalance_time = NOW - MINUTE;
        assert_eq!(run(&state, 220, NOW), Decision::None);
        assert_eq!(run(&state, 220, NOW - MINUTE + HOUR), Decision::Rebalance);
    }

    #[test]
    fn test_not_engaged_is_quiet() {
        let state = RuntimeState::default();
        assert_eq!(run(&state, 100, NOW), Decision::None);
    }

    #[test]
    fn test_cooldown_remaining_rounds_up() {
        assert_eq!(cooldown_remaining_seconds(NOW, MINUTE, NOW + 1), 60);
        assert_eq!(cooldown_remaining_seconds(NOW, MINUTE, NOW + MINUTE), 0);
        assert_eq!(cooldown_remaining_seconds(0, MINUTE, NOW), 0);
    }

    proptest! {
        #[test]
        fn prop_decision_is_idempotent(
            leverage in 100u64..400,
            since_rebalance in 0u64..7_200,
            since_ripcord in 0u64..7_200,
            twap in prop::bool::ANY,
            engaged in prop::bool::ANY,
        ) {
            let state = RuntimeState {
                engaged,
                twap_target_ratio: if twap { r(200) } else { Nat::from(0u64) },
                last_rebalance_time: NOW - since_rebalance * NANOS_PER_SECOND,
                last_ripcord_time: NOW - since_ripcord * NANOS_PER_SECOND,
                ..Default::default()
            };
            let first = run(&state, leverage, NOW);
            prop_assert_eq!(first, run(&state, leverage, NOW));
            prop_assert_eq!(first, run(&state.clone(), leverage, NOW));
        }

        #[test]
        fn prop_ripcord_only_at_ripcord_band(leverage in 100u64..400) {
            let decision = run(&engaged(), leverage, NOW);
            prop_assert_eq!(decision == Decision::Ripcord, leverage >= 250);
        }
    }
}
