//! # Swap Intent Construction
//!
//! Converts a sized chunk into the order the settlement gateway receives.
//!
//! ## Swap Flow
//! 1. **Lever**: borrow `chunk × spot` debt asset, sell it for `chunk` collateral
//! 2. **Delever**: withdraw `chunk` collateral, sell it for `chunk × spot` debt asset
//! 3. Minimum output is the expected output less the applicable tolerance
//!
//! The expected output is priced at spot. The fill itself is later checked
//! against the TWAP by the price checker.

use candid::Nat;
use crate::infrastructure::{Result, LeverageError, CalculationError};
use crate::infrastructure::math::{is_zero, mul_wad};
use crate::types::{StrategyConfig, SwapDirection, SwapIntent};
use super::slippage::calculate_min_receive;

/// A chunk ready to hand to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSwap {
    pub intent: SwapIntent,
    /// Amount of the sell asset to source (borrow or withdraw)
    pub amount_in: Nat,
    pub expected_out: Nat,
}

pub fn prepare_swap(
    config: &StrategyConfig,
    direction: SwapDirection,
    chunk: &Nat,
    spot_price: &Nat,
    tolerance_bps: u32,
) -> Result<PreparedSwap> {
    if is_zero(chunk) {
        return Err(LeverageError::Calculation(CalculationError::InvalidAmount {
            amount: chunk.to_string(),
            reason: "chunk size must be positive".to_string(),
        }));
    }

    let chunk_value = mul_wad(chunk, spot_price)?;

    let (sell_asset, buy_asset, amount_in, expected_out) = match direction {
        SwapDirection::Lever => (config.debt_asset, config.collateral_asset, chunk_value, chunk.clone()),
        SwapDirection::Delever => (config.collateral_asset, config.debt_asset, chunk.clone(), chunk_value),
    };

    if is_zero(&amount_in) || is_zero(&expected_out) {
        return Err(LeverageError::Calculation(CalculationError::InvalidAmount {
            amount: chunk.to_string(),
            reason: "chunk rounds to zero at current price".to_string(),
        }));
    }

    let min_buy_amount = calculate_min_receive(&expected_out, tolerance_bps)?;

    crate::log!(
        "🔄 Prepared {:?} swap: sell {} of {} for >= {} of {}",
        direction, amount_in, sell_asset, min_buy_amount, buy_asset
    );

    Ok(PreparedSwap {
        intent: SwapIntent {
            direction,
            sell_asset,
            buy_asset,
            sell_amount: amount_in.clone(),
            min_buy_amount,
            reference_price: spot_price.clone(),
        },
        amount_in,
        expected_out,
    })
}
