//! # TWAP Chunk Sizing
//!
//! For a position with collateral `C` at leverage `L`, moving to leverage
//! `L'` at constant price needs a trade of `|L' − L| · C / L` collateral
//! units: levering buys that much collateral with fresh debt, delevering
//! sells it to repay debt. The trade is cut to the applicable cap and the
//! remainder is left for later chunks.
//!
//! ## Example Flow
//! ```text
//! C = 500,000   L = 1.0   target = 2.0   cap = 100,000
//! notional = (2.0 - 1.0) * 500,000 / 1.0 = 500,000
//! chunk    = min(500,000, 100,000)        = 100,000
//! chunk < notional, so the sequence target stays at 2.0
//! ```

use candid::{CandidType, Deserialize, Nat};
use serde::Serialize;
use crate::infrastructure::{Result, WAD};
use crate::infrastructure::math::{abs_diff, apply_bps_premium, checked_sub, div_wad, is_zero, max_nat, min_nat, mul_wad, multiply_and_divide};
use crate::types::{LeverageBands, SwapDirection};

/// One sized chunk and the adjustment it was cut from
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub direction: SwapDirection,
    pub new_leverage: Nat,
    pub total_notional: Nat,
    pub chunk: Nat,
    /// `new_leverage` when more chunks are needed, zero otherwise
    pub twap_target_ratio: Nat,
}

impl ChunkPlan {
    pub fn is_partial(&self) -> bool {
        self.chunk < self.total_notional
    }
}

/// Leverage a normal rebalance aims for:
/// `target·s + current·(1 − s)`, clamped to `[min, max]`
pub fn recenter(current: &Nat, bands: &LeverageBands, speed: &Nat) -> Result<Nat> {
    let one = Nat::from(WAD);
    let rest = checked_sub(&one, speed, "recenter weight")?;
    let blended = mul_wad(&bands.target, speed)? + mul_wad(current, &rest)?;
    Ok(min_nat(&max_nat(&blended, &bands.min), &bands.max))
}

/// Collateral units to trade to move from `current` to `new` leverage
pub fn notional(current: &Nat, new: &Nat, collateral: &Nat) -> Result<Nat> {
    multiply_and_divide(&abs_diff(new, current), collateral, current)
}

/// Size the next chunk toward `new`, or `None` when already there
pub fn plan_chunk(current: &Nat, new: &Nat, collateral: &Nat, cap: &Nat) -> Result<Option<ChunkPlan>> {
    let total = notional(current, new, collateral)?;
    if is_zero(&total) {
        return Ok(None);
    }

    let direction = if new > current { SwapDirection::Lever } else { SwapDirection::Delever };
    let chunk = min_nat(&total, cap);
    let twap_target_ratio = if chunk < total { new.clone() } else { Nat::from(0u64) };

    Ok(Some(ChunkPlan {
        direction,
        new_leverage: new.clone(),
        total_notional: total,
        chunk,
        twap_target_ratio,
    }))
}

/// Size the next chunk of a full unwind
///
/// The debt is converted to collateral at `price` and grossed up by the
/// slippage tolerance so the final chunk's proceeds cover the whole debt.
/// A chunk never exceeds the collateral actually held.
pub fn plan_unwind(
    collateral: &Nat,
    debt: &Nat,
    price: &Nat,
    slippage_bps: u32,
    cap: &Nat,
) -> Result<Option<ChunkPlan>> {
    if is_zero(debt) {
        return Ok(None);
    }

    let debt_in_collateral = div_wad(debt, price)?;
    let grossed = apply_bps_premium(&debt_in_collateral, slippage_bps)?;
    let total = min_nat(&grossed, collateral);
    if is_zero(&total) {
        return Ok(None);
    }

    Ok(Some(ChunkPlan {
        direction: SwapDirection::Delever,
        new_leverage: Nat::from(WAD),
        chunk: min_nat(&total, cap),
        total_notional: total,
        twap_target_ratio: Nat::from(WAD),
    }))
}
