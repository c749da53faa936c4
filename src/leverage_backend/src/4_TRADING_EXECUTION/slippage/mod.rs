//! # Slippage Protection Module
//!
//! Calculates slippage limits and validates swap results
//! to ensure trades execute within acceptable price ranges.
//!
//! ## Key Functions
//! - `calculate_min_receive`: Get minimum acceptable output amount
//! - `validate_swap_result`: Verify the settled output clears the minimum
//! - `price_within_tolerance`: Compare a fill price against the TWAP
//!
//! ## Safety Checks
//! - Positive slippage (getting more than expected) is allowed
//! - Zero expected amounts are rejected
//! - Tolerances are basis points and capped at `MAX_TOLERANCE_BPS`

use candid::Nat;
use crate::infrastructure::{Result, LeverageError, CalculationError, GuardError, MarketDataError};
use crate::infrastructure::constants::{BPS_DENOMINATOR, MAX_TOLERANCE_BPS};
use crate::infrastructure::math::{abs_diff, apply_bps_haircut, is_zero, multiply_and_divide};

/// Calculate minimum acceptable receive amount based on slippage tolerance
///
/// ## Example
/// - Expected: 100 tokens
/// - Tolerance: 200 bps (2%)
/// - Result: 98 tokens (will accept down to 98)
pub fn calculate_min_receive(expected_amount: &Nat, tolerance_bps: u32) -> Result<Nat> {
    validate_tolerance_bps(tolerance_bps)?;
    apply_bps_haircut(expected_amount, tolerance_bps)
}

/// Validate that a settled swap meets its minimum
///
/// ## Returns
/// - `Ok(())` if `actual >= minimum`
/// - `Err(MarketDataError::SlippageExceeded)` otherwise
pub fn validate_swap_result(expected: &Nat, actual: &Nat, minimum: &Nat) -> Result<()> {
    if is_zero(expected) {
        return Err(LeverageError::Calculation(CalculationError::InvalidAmount {
            amount: expected.to_string(),
            reason: "Expected amount cannot be zero".to_string(),
        }));
    }

    if actual >= expected {
        crate::log!("✅ Positive slippage: expected {}, got {}", expected, actual);
        return Ok(());
    }

    if actual < minimum {
        return Err(LeverageError::MarketData(MarketDataError::SlippageExceeded {
            expected: expected.to_string(),
            actual: actual.to_string(),
            minimum: minimum.to_string(),
        }));
    }

    crate::log!("✅ Slippage acceptable: expected {}, got {} (min {})", expected, actual, minimum);
    Ok(())
}

/// Whether `price` lies within `tolerance_bps` of `reference`
///
/// Deviation is measured relative to the reference:
/// `|price − reference| × 10_000 ≤ reference × tolerance_bps`
pub fn price_within_tolerance(price: &Nat, reference: &Nat, tolerance_bps: u32) -> Result<bool> {
    if is_zero(reference) {
        return Ok(false);
    }
    let allowed = multiply_and_divide(reference, &Nat::from(tolerance_bps), &Nat::from(BPS_DENOMINATOR))?;
    Ok(abs_diff(price, reference) <= allowed)
}

pub fn validate_tolerance_bps(tolerance_bps: u32) -> Result<()> {
    if tolerance_bps > MAX_TOLERANCE_BPS {
        return Err(LeverageError::Guard(GuardError::InvalidConfiguration {
            reason: format!("tolerance {} bps exceeds {} bps", tolerance_bps, MAX_TOLERANCE_BPS),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_min_receive() {
        // 2% slippage on 100 tokens = 98 minimum
        let min = calculate_min_receive(&Nat::from(100u64), 200).unwrap();
        assert_eq!(min, Nat::from(98u64));

        // 5% slippage on 1000 tokens = 950 minimum
        let min = calculate_min_receive(&Nat::from(1000u64), 500).unwrap();
        assert_eq!(min, Nat::from(950u64));
    }

    #[test]
    fn test_calculate_min_receive_rejects_wide_tolerance() {
        assert!(calculate_min_receive(&Nat::from(100u64), MAX_TOLERANCE_BPS + 1).is_err());
    }

    #[test]
    fn test_validate_swap_result_within_limit() {
        let result = validate_swap_result(&Nat::from(100u64), &Nat::from(98u64), &Nat::from(98u64));
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_swap_result_positive_slippage() {
        let result = validate_swap_result(&Nat::from(100u64), &Nat::from(105u64), &Nat::from(98u64));
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_swap_result_below_minimum() {
        let result = validate_swap_result(&Nat::from(100u64), &Nat::from(95u64), &Nat::from(98u64));
        assert!(matches!(
            result,
            Err(LeverageError::MarketData(MarketDataError::SlippageExceeded { .. }))
        ));
    }

    #[test]
    fn test_validate_swap_result_zero_expected() {
        let result = validate_swap_result(&Nat::from(0u64), &Nat::from(100u64), &Nat::from(0u64));
        assert!(result.is_err());
    }

    #[test]
    fn test_price_within_tolerance() {
        let twap = Nat::from(1_000_000u64);
        assert!(price_within_tolerance(&Nat::from(1_010_000u64), &twap, 100).unwrap());
        assert!(price_within_tolerance(&Nat::from(990_000u64), &twap, 100).unwrap());
        assert!(!price_within_tolerance(&Nat::from(1_010_001u64), &twap, 100).unwrap());
        assert!(!price_within_tolerance(&Nat::from(1u64), &Nat::from(0u64), 100).unwrap());
    }
}
