//! Configuration validation
//!
//! Every parameter set is checked in full before it is stored, both at
//! install and through the operator setters. A rejected set leaves the
//! previous configuration in place.

use candid::{Nat, Principal};
use crate::infrastructure::constants::{MAX_LEVERAGE_RATIO, MAX_TOLERANCE_BPS, WAD};
use crate::infrastructure::errors::{GuardError, LeverageError, Result};
use crate::infrastructure::math::{format_ratio, is_zero};
use crate::types::{ExecutionParams, IncentiveParams, InitArgs, LeverageBands, StrategyConfig};

fn invalid(reason: impl Into<String>) -> LeverageError {
    LeverageError::Guard(GuardError::InvalidConfiguration { reason: reason.into() })
}

pub fn validate_strategy_config(config: &StrategyConfig) -> Result<()> {
    let references = [
        ("lending_market", config.lending_market),
        ("collateral_asset", config.collateral_asset),
        ("debt_asset", config.debt_asset),
        ("price_oracle", config.price_oracle),
        ("twap_oracle", config.twap_oracle),
        ("swap_gateway", config.swap_gateway),
        ("price_checker", config.price_checker),
        ("native_ledger", config.native_ledger),
    ];

    for (name, principal) in references {
        if principal == Principal::anonymous() {
            return Err(invalid(format!("{} is not set", name)));
        }
    }

    if config.collateral_asset == config.debt_asset {
        return Err(invalid("collateral and debt assets must differ"));
    }

    Ok(())
}

/// 1.0 <= min < target < max < ripcord <= MAX_LEVERAGE_RATIO
pub fn validate_bands(bands: &LeverageBands) -> Result<()> {
    let one = Nat::from(WAD);
    let ceiling = Nat::from(MAX_LEVERAGE_RATIO);

    if bands.min < one {
        return Err(invalid(format!("min {} is below 1.0", format_ratio(&bands.min))));
    }
    if bands.target <= bands.min {
        return Err(invalid("target must be above min"));
    }
    if bands.max <= bands.target {
        return Err(invalid("max must be above target"));
    }
    if bands.ripcord <= bands.max {
        return Err(invalid("ripcord must be above max"));
    }
    if bands.ripcord > ceiling {
        return Err(invalid(format!(
            "ripcord {} exceeds ceiling {}",
            format_ratio(&bands.ripcord),
            format_ratio(&ceiling)
        )));
    }

    Ok(())
}

pub fn validate_execution(execution: &ExecutionParams) -> Result<()> {
    if is_zero(&execution.max_trade_size) {
        return Err(invalid("max_trade_size must be positive"));
    }
    if execution.slippage_tolerance_bps > MAX_TOLERANCE_BPS {
        return Err(invalid(format!(
            "slippage tolerance {} bps exceeds {} bps",
            execution.slippage_tolerance_bps, MAX_TOLERANCE_BPS
        )));
    }
    if is_zero(&execution.recenter_speed) || execution.recenter_speed > Nat::from(WAD) {
        return Err(invalid("recenter_speed must be within (0, 1]"));
    }
    if execution.max_oracle_age_nanos == 0 {
        return Err(invalid("max_oracle_age must be positive"));
    }
    if execution.rebalance_interval_nanos == 0 {
        return Err(invalid("rebalance_interval must be positive"));
    }
    Ok(())
}

/// Incentive params are validated against the execution params they run beside
pub fn validate_incentive(incentive: &IncentiveParams, execution: &ExecutionParams) -> Result<()> {
    if incentive.ripcord_slippage_tolerance_bps > MAX_TOLERANCE_BPS {
        return Err(invalid(format!(
            "ripcord slippage tolerance {} bps exceeds {} bps",
            incentive.ripcord_slippage_tolerance_bps, MAX_TOLERANCE_BPS
        )));
    }
    if incentive.ripcord_cooldown_nanos >= execution.rebalance_interval_nanos {
        return Err(invalid("ripcord cooldown must be shorter than rebalance interval"));
    }
    if is_zero(&incentive.ripcord_max_trade) {
        return Err(invalid("ripcord_max_trade must be positive"));
    }
    if incentive.ripcord_max_trade > execution.max_trade_size {
        return Err(invalid("ripcord_max_trade cannot exceed max_trade_size"));
    }
    Ok(())
}

pub fn validate_init_args(args: &InitArgs) -> Result<()> {
    args.policy.validate()?;
    validate_strategy_config(&args.config)?;
    validate_bands(&args.bands)?;
    validate_execution(&args.execution)?;
    validate_incentive(&args.incentive, &args.execution)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(tenths: u64) -> Nat {
        Nat::from(WAD / 10 * tenths as u128)
    }

    fn bands() -> LeverageBands {
        LeverageBands { target: ratio(20), min: ratio(17), max: ratio(23), ripcord: ratio(25) }
    }

    fn execution() -> ExecutionParams {
        ExecutionParams {
            max_trade_size: Nat::from(100_000u64),
            twap_cooldown_nanos: 60,
            slippage_tolerance_bps: 50,
            rebalance_interval_nanos: 3_600,
            recenter_speed: ratio(5),
            target_tolerance: Nat::from(WAD / 100),
            max_oracle_age_nanos: 600,
        }
    }

    fn incentive() -> IncentiveParams {
        IncentiveParams {
            ripcord_slippage_tolerance_bps: 150,
            ripcord_cooldown_nanos: 60,
            ripcord_max_trade: Nat::from(50_000u64),
            fixed_reward: Nat::from(1_000u64),
        }
    }

    #[test]
    fn test_bands_must_be_strictly_increasing() {
        assert!(validate_bands(&bands()).is_ok());

        let mut b = bands();
        b.max = b.target.clone();
        assert!(validate_bands(&b).is_err());

        let mut b = bands();
        b.min = ratio(9);
        assert!(validate_bands(&b).is_err());

        let mut b = bands();
        b.ripcord = Nat::from(MAX_LEVERAGE_RATIO + 1);
        assert!(validate_bands(&b).is_err());
    }

    #[test]
    fn test_min_of_exactly_one_is_allowed() {
        let mut b = bands();
        b.min = ratio(10);
        assert!(validate_bands(&b).is_ok());
    }

    #[test]
    fn test_execution_limits() {
        assert!(validate_execution(&execution()).is_ok());

        let mut e = execution();
        e.recenter_speed = ratio(11);
        assert!(validate_execution(&e).is_err());

        // a zero speed would never move toward target
        let mut e = execution();
        e.recenter_speed = Nat::from(0u64);
        assert!(validate_execution(&e).is_err());

        let mut e = execution();
        e.recenter_speed = ratio(10);
        assert!(validate_execution(&e).is_ok());

        let mut e = execution();
        e.slippage_tolerance_bps = MAX_TOLERANCE_BPS + 1;
        assert!(validate_execution(&e).is_err());

        let mut e = execution();
        e.max_trade_size = Nat::from(0u64);
        assert!(validate_execution(&e).is_err());
    }

    #[test]
    fn test_incentive_cross_checks() {
        assert!(validate_incentive(&incentive(), &execution()).is_ok());

        let mut i = incentive();
        i.ripcord_cooldown_nanos = 3_600;
        assert!(validate_incentive(&i, &execution()).is_err());

        let mut i = incentive();
        i.ripcord_max_trade = Nat::from(100_001u64);
        assert!(validate_incentive(&i, &execution()).is_err());
    }

    #[test]
    fn test_assets_must_differ() {
        let asset = Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, 1, 1, 1]);
        let other = Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, 2, 1, 1]);
        let config = StrategyConfig {
            lending_market: other,
            collateral_asset: asset,
            debt_asset: asset,
            price_oracle: other,
            twap_oracle: other,
            swap_gateway: other,
            price_checker: other,
            native_ledger: other,
        };
        assert!(validate_strategy_config(&config).is_err());
    }
}
