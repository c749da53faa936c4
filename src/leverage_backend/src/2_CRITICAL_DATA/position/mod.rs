//! Position snapshot and leverage math
//!
//! Leverage accounting always uses the TWAP price; the spot price is carried
//! only to price new swap intents. Formulas (price = debt units per
//! collateral unit, WAD):
//!
//! ```text
//! collateral_value = C × P
//! equity           = collateral_value − D        (must stay > 0)
//! leverage         = collateral_value / equity   (1.0 when D = 0)
//! real_assets      = C − D / P                   (collateral units)
//! ```

use candid::{CandidType, Deserialize, Nat};
use serde::Serialize;
use crate::infrastructure::{Result, LeverageError, CalculationError, MarketDataError, NANOS_PER_SECOND};
use crate::infrastructure::math::{checked_sub, div_wad, is_zero, mul_wad, wad};
use crate::types::{PositionBalances, PriceReading};
use crate::_3_MARKET_VENUES::{LendingMarket, PriceOracle, Venues};

/// Balances and both prices, read together
#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub balances: PositionBalances,
    pub spot: PriceReading,
    pub twap: PriceReading,
}

impl PositionSnapshot {
    pub fn collateral(&self) -> &Nat {
        &self.balances.collateral
    }

    pub fn debt(&self) -> &Nat {
        &self.balances.debt
    }

    pub fn leverage(&self) -> Result<Nat> {
        leverage_ratio(&self.balances, &self.twap.price)
    }

    pub fn real_assets(&self) -> Result<Nat> {
        real_assets(&self.balances, &self.twap.price)
    }
}

/// Collateral value in debt units
pub fn collateral_value(balances: &PositionBalances, price: &Nat) -> Result<Nat> {
    mul_wad(&balances.collateral, price)
}

pub fn leverage_ratio(balances: &PositionBalances, price: &Nat) -> Result<Nat> {
    if is_zero(&balances.debt) {
        return Ok(wad());
    }

    let value = collateral_value(balances, price)?;
    if value <= balances.debt {
        crate::log!("🚨 CRITICAL: position insolvent (value {}, debt {})", value, balances.debt);
        return Err(LeverageError::Calculation(CalculationError::Insolvent {
            collateral_value: value.to_string(),
            debt: balances.debt.to_string(),
        }));
    }

    let equity = checked_sub(&value, &balances.debt, "equity")?;
    div_wad(&value, &equity)
}

/// Net position in collateral units
pub fn real_assets(balances: &PositionBalances, price: &Nat) -> Result<Nat> {
    let debt_in_collateral = div_wad(&balances.debt, price)?;
    checked_sub(&balances.collateral, &debt_in_collateral, "real assets")
}

/// Fail closed on a stale or non-positive reading
pub fn check_reading(reading: &PriceReading, source_name: &str, now: u64, max_age_nanos: u64) -> Result<()> {
    if is_zero(&reading.price) {
        return Err(LeverageError::MarketData(MarketDataError::NonPositivePrice {
            source_name: source_name.to_string(),
        }));
    }

    let age = now.saturating_sub(reading.timestamp);
    if age > max_age_nanos {
        crate::log!("⚠️ {} price is {}s old (max {}s)", source_name, age / NANOS_PER_SECOND, max_age_nanos / NANOS_PER_SECOND);
        return Err(LeverageError::MarketData(MarketDataError::StalePrice {
            source_name: source_name.to_string(),
            age_seconds: age / NANOS_PER_SECOND,
            max_age_seconds: max_age_nanos / NANOS_PER_SECOND,
        }));
    }

    Ok(())
}

/// Read and validate the TWAP alone
pub async fn read_twap<V: Venues>(venues: &V, now: u64, max_age_nanos: u64) -> Result<PriceReading> {
    let twap = venues.twap_oracle().read().await?;
    check_reading(&twap, "twap_oracle", now, max_age_nanos)?;
    Ok(twap)
}

/// Read balances and both prices in parallel and validate the prices
pub async fn take_snapshot<V: Venues>(venues: &V, now: u64, max_age_nanos: u64) -> Result<PositionSnapshot> {
    let (balances, spot, twap) = futures::join!(
        venues.lending().position(),
        venues.spot_oracle().read(),
        venues.twap_oracle().read()
    );

    let (balances, spot, twap) = (balances?, spot?, twap?);
    check_reading(&spot, "spot_oracle", now, max_age_nanos)?;
    check_reading(&twap, "twap_oracle", now, max_age_nanos)?;

    Ok(PositionSnapshot { balances, spot, twap })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::WAD;

    fn balances(collateral: u64, debt: u64) -> PositionBalances {
        PositionBalances { collateral: Nat::from(collateral), debt: Nat::from(debt) }
    }

    #[test]
    fn test_unlevered_position_is_one() {
        assert_eq!(leverage_ratio(&balances(1_000, 0), &Nat::from(WAD)).unwrap(), wad());
        assert_eq!(leverage_ratio(&balances(0, 0), &Nat::from(WAD)).unwrap(), wad());
    }

    #[test]
    fn test_leverage_two_at_price_one_and_a_half() {
        // value 300,000, debt 150,000, equity 150,000
        let price = Nat::from(WAD * 3 / 2);
        let leverage = leverage_ratio(&balances(200_000, 150_000), &price).unwrap();
        assert_eq!(leverage, Nat::from(2 * WAD));
    }

    #[test]
    fn test_insolvent_position_errors() {
        let result = leverage_ratio(&balances(100, 100), &Nat::from(WAD));
        assert!(matches!(result, Err(LeverageError::Calculation(CalculationError::Insolvent { .. }))));
    }

    #[test]
    fn test_real_assets() {
        let price = Nat::from(2 * WAD);
        assert_eq!(real_assets(&balances(1_000, 800), &price).unwrap(), Nat::from(600u64));
    }

    #[test]
    fn test_stale_reading_rejected() {
        let reading = PriceReading { price: Nat::from(WAD), timestamp: 1_000 };
        assert!(check_reading(&reading, "spot_oracle", 1_500, 500).is_ok());
        let result = check_reading(&reading, "spot_oracle", 1_501, 500);
        assert!(matches!(result, Err(LeverageError::MarketData(MarketDataError::StalePrice { .. }))));
    }

    #[test]
    fn test_zero_price_rejected() {
        let reading = PriceReading { price: Nat::from(0u64), timestamp: 10 };
        let result = check_reading(&reading, "twap_oracle", 10, 500);
        assert!(matches!(result, Err(LeverageError::MarketData(MarketDataError::NonPositivePrice { .. }))));
    }
}
