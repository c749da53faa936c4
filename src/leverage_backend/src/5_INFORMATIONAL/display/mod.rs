//! Display module - Strategy status and live position for UI
//!
//! Ratios are returned both raw (WAD `Nat`) and rendered as decimal strings
//! (`"2.35"`) so dashboards never have to handle 18-decimal fixed point.

use candid::{CandidType, Deserialize, Nat};
use serde::Serialize;
use crate::infrastructure::{Result, NANOS_PER_SECOND};
use crate::infrastructure::math::format_ratio;
use crate::types::{Decision, ExecutionParams, IncentiveParams, LeverageBands, RuntimeState};
use crate::_1_CRITICAL_OPERATIONS::leverage_engine::LeverageEngine;
use crate::_2_CRITICAL_DATA::position::take_snapshot;
use crate::_2_CRITICAL_DATA::decision::decide;
use crate::_3_MARKET_VENUES::Venues;

/// Bands rendered as decimals
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RenderedBands {
    pub target: String,
    pub min: String,
    pub max: String,
    pub ripcord: String,
}

/// Configuration and state of the strategy, no venue reads
#[derive(CandidType, Deserialize, Serialize, Debug, Clone)]
pub struct StrategyStatus {
    pub bands: LeverageBands,
    pub rendered_bands: RenderedBands,
    pub execution: ExecutionParams,
    pub incentive: IncentiveParams,
    pub state: RuntimeState,
    pub swap_state: String,
    /// Rendered `twap_target_ratio`, `None` when no sequence is active
    pub twap_target: Option<String>,
    pub rebalance_interval_seconds: u64,
    pub swaps_recorded: u64,
}

/// Live position read from the venues
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PositionReport {
    pub collateral: Nat,
    pub debt: Nat,
    pub spot_price: Nat,
    pub twap_price: Nat,
    pub leverage: Nat,
    pub leverage_display: String,
    pub real_assets: Nat,
    /// What `should_rebalance` would return now
    pub next_action: Decision,
    pub timestamp: u64,
}

pub fn strategy_status(engine: &LeverageEngine) -> StrategyStatus {
    let bands = engine.bands().clone();
    let state = engine.runtime_state().clone();

    StrategyStatus {
        rendered_bands: RenderedBands {
            target: format_ratio(&bands.target),
            min: format_ratio(&bands.min),
            max: format_ratio(&bands.max),
            ripcord: format_ratio(&bands.ripcord),
        },
        swap_state: state.swap_state.as_str().to_string(),
        twap_target: if state.twap_target_ratio == Nat::from(0u64) {
            None
        } else {
            Some(format_ratio(&state.twap_target_ratio))
        },
        rebalance_interval_seconds: engine.execution().rebalance_interval_nanos / NANOS_PER_SECOND,
        swaps_recorded: engine.swap_history().len() as u64,
        bands,
        execution: engine.execution().clone(),
        incentive: engine.incentive().clone(),
        state,
    }
}

pub async fn position_report<V: Venues>(engine: &LeverageEngine, venues: &V, now: u64) -> Result<PositionReport> {
    let snapshot = take_snapshot(venues, now, engine.execution().max_oracle_age_nanos).await?;
    let leverage = snapshot.leverage()?;
    let next_action = decide(
        engine.runtime_state(),
        engine.bands(),
        engine.execution(),
        engine.incentive(),
        &leverage,
        now,
    );

    Ok(PositionReport {
        real_assets: snapshot.real_assets()?,
        leverage_display: format_ratio(&leverage),
        collateral: snapshot.balances.collateral,
        debt: snapshot.balances.debt,
        spot_price: snapshot.spot.price,
        twap_price: snapshot.twap.price,
        leverage,
        next_action,
        timestamp: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use crate::_1_CRITICAL_OPERATIONS::leverage_engine::tests::{fixture, operator, ratio, MINUTE, NOW};

    #[test]
    fn test_status_renders_bands() {
        let f = fixture();
        let status = strategy_status(&f.engine);
        assert_eq!(status.rendered_bands.target, "2");
        assert_eq!(status.rendered_bands.min, "1.7");
        assert_eq!(status.rendered_bands.ripcord, "2.5");
        assert_eq!(status.swap_state, "idle");
        assert_eq!(status.twap_target, None);
        assert_eq!(status.rebalance_interval_seconds, 3_600);
    }

    #[test]
    fn test_status_shows_active_sequence() {
        let mut f = fixture();
        f.deposit(500_000);
        block_on(f.engine.engage(&f.venues, &operator(), NOW)).unwrap();

        let status = strategy_status(&f.engine);
        assert_eq!(status.twap_target.as_deref(), Some("2"));
        assert_eq!(status.swap_state, "pending_lever");
        assert_eq!(status.swaps_recorded, 1);
    }

    #[test]
    fn test_position_report_after_engage() {
        let mut f = fixture();
        f.engage_to_target(NOW);
        f.venues.set_price(ratio(88), NOW + MINUTE);

        let report = block_on(position_report(&f.engine, &f.venues, NOW + MINUTE)).unwrap();
        assert_eq!(report.collateral, Nat::from(200_000u64));
        assert_eq!(report.debt, Nat::from(100_000u64));
        assert_eq!(report.next_action, Decision::Rebalance);
        assert!(report.leverage_display.starts_with("2.31"));
        // 200k - 100k / 0.88
        assert_eq!(report.real_assets, Nat::from(86_364u64));
    }
}
