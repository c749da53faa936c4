//! Pure mathematical functions - no I/O, no async
//! All functions here must be deterministic and side-effect free
//!
//! Ratios and prices are WAD fixed-point (`1.0 == 10^18`), token amounts are
//! raw base units. Intermediate products go through `BigUint` so nothing
//! overflows before the final division.

use candid::Nat;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rust_decimal::Decimal;
use crate::infrastructure::constants::{BPS_DENOMINATOR, WAD};
use crate::infrastructure::errors::{CalculationError, LeverageError, Result};

/// Multiply two Nats and divide by a third with arbitrary precision
/// Formula: (a × b) ÷ c, rounded down
pub fn multiply_and_divide(a: &Nat, b: &Nat, c: &Nat) -> Result<Nat> {
    if c.0.is_zero() {
        return Err(LeverageError::Calculation(CalculationError::DivisionByZero {
            operation: format!("({} × {}) ÷ {}", a, b, c),
        }));
    }

    let result = (nat_to_biguint(a) * nat_to_biguint(b)) / nat_to_biguint(c);
    Ok(biguint_to_nat(result))
}

pub fn wad() -> Nat {
    Nat::from(WAD)
}

pub fn is_zero(n: &Nat) -> bool {
    n.0.is_zero()
}

/// a × b ÷ WAD
pub fn mul_wad(a: &Nat, b: &Nat) -> Result<Nat> {
    multiply_and_divide(a, b, &wad())
}

/// a × WAD ÷ b
pub fn div_wad(a: &Nat, b: &Nat) -> Result<Nat> {
    multiply_and_divide(a, &wad(), b)
}

/// Shrink an amount by a tolerance: amount × (10_000 − bps) ÷ 10_000
pub fn apply_bps_haircut(amount: &Nat, bps: u32) -> Result<Nat> {
    let keep = BPS_DENOMINATOR.saturating_sub(bps);
    multiply_and_divide(amount, &Nat::from(keep), &Nat::from(BPS_DENOMINATOR))
}

/// Grow an amount by a tolerance: amount × (10_000 + bps) ÷ 10_000
pub fn apply_bps_premium(amount: &Nat, bps: u32) -> Result<Nat> {
    let grown = BPS_DENOMINATOR.saturating_add(bps);
    multiply_and_divide(amount, &Nat::from(grown), &Nat::from(BPS_DENOMINATOR))
}

pub fn abs_diff(a: &Nat, b: &Nat) -> Nat {
    if a >= b {
        Nat(&a.0 - &b.0)
    } else {
        Nat(&b.0 - &a.0)
    }
}

pub fn min_nat(a: &Nat, b: &Nat) -> Nat {
    if a <= b { a.clone() } else { b.clone() }
}

pub fn max_nat(a: &Nat, b: &Nat) -> Nat {
    if a >= b { a.clone() } else { b.clone() }
}

/// a − b, refusing to wrap below zero
pub fn checked_sub(a: &Nat, b: &Nat, operation: &str) -> Result<Nat> {
    if b > a {
        return Err(LeverageError::Calculation(CalculationError::Overflow {
            operation: format!("{}: {} - {} underflows", operation, a, b),
        }));
    }
    Ok(Nat(&a.0 - &b.0))
}

/// Render a WAD fixed-point value as a normalised decimal
pub fn ratio_to_decimal(value: &Nat) -> Result<Decimal> {
    let overflow = || LeverageError::Calculation(CalculationError::Overflow {
        operation: format!("ratio_to_decimal({})", value),
    });

    let raw = value.0.to_i128().ok_or_else(overflow)?;
    Decimal::try_from_i128_with_scale(raw, 18)
        .map(|d| d.normalize())
        .map_err(|_| overflow())
}

/// Human-readable ratio for logs and error payloads, never fails
pub fn format_ratio(value: &Nat) -> String {
    match ratio_to_decimal(value) {
        Ok(d) => d.to_string(),
        Err(_) => format!("{} (wad)", value),
    }
}

// ===== Helper Functions =====

fn nat_to_biguint(nat: &Nat) -> BigUint {
    nat.0.clone()
}

fn biguint_to_nat(big: BigUint) -> Nat {
    Nat::from(big)
}

// ===== Tests =====
