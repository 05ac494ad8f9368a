//! Conversion between human-facing decimal quantities and integer base units.
//!
//! Token amounts on the ledger are integers in the token's smallest unit
//! (`decimal × 10^decimals`). Conversion is exact integer arithmetic on the
//! decimal's mantissa; when the input has more fractional digits than the
//! token supports, the dropped digits are rounded half away from zero.

use alloy_primitives::U256;
use rust_decimal::Decimal;

use crate::{Error, Result};

/// Largest precision whose scale factor still fits in 256 bits.
pub const MAX_DECIMALS: u8 = 77;

/// Precision of the native asset (and of wrapped ether).
pub const ETHER_DECIMALS: u8 = 18;

/// Largest fractional precision a `Decimal` can carry.
const DECIMAL_MAX_SCALE: u32 = 28;

/// Largest mantissa a `Decimal` can carry (96 bits).
const DECIMAL_MAX_MANTISSA: u128 = (1u128 << 96) - 1;

fn pow10(exp: u32) -> Result<U256> {
    U256::from(10u8)
        .checked_pow(U256::from(exp))
        .ok_or_else(|| Error::invalid_amount(format!("10^{} exceeds 256 bits", exp)))
}

/// Convert a decimal amount into base units for a token with `decimals`.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256> {
    if amount < Decimal::ZERO {
        return Err(Error::invalid_amount(format!("{} is negative", amount)));
    }
    if decimals > MAX_DECIMALS {
        return Err(Error::invalid_amount(format!(
            "{} decimals exceeds the maximum of {}",
            decimals, MAX_DECIMALS
        )));
    }

    let scale = amount.scale();
    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    let decimals = u32::from(decimals);

    if decimals >= scale {
        let factor = pow10(decimals - scale)?;
        mantissa.checked_mul(factor).ok_or_else(|| {
            Error::invalid_amount(format!("{} overflows 256-bit base units", amount))
        })
    } else {
        let divisor = pow10(scale - decimals)?;
        let quotient = mantissa / divisor;
        let remainder = mantissa % divisor;
        // Half away from zero; amounts are non-negative so "away" means up.
        if remainder * U256::from(2u8) >= divisor {
            Ok(quotient + U256::from(1u8))
        } else {
            Ok(quotient)
        }
    }
}

/// Convert a floating point amount (e.g. user input) into base units.
///
/// The float is first rendered with its shortest round-trip representation,
/// so `0.2` converts as the decimal `0.2` rather than its binary expansion.
pub fn to_base_units_f64(amount: f64, decimals: u8) -> Result<U256> {
    if !amount.is_finite() {
        return Err(Error::invalid_amount(format!("{} is not finite", amount)));
    }
    if amount < 0.0 {
        return Err(Error::invalid_amount(format!("{} is negative", amount)));
    }
    let decimal: Decimal = amount
        .to_string()
        .parse()
        .map_err(|e| Error::invalid_amount(format!("{} is not representable: {}", amount, e)))?;
    to_base_units(decimal, decimals)
}

/// Convert base units back into a normalized decimal amount.
pub fn from_base_units(amount: U256, decimals: u8) -> Result<Decimal> {
    if decimals > MAX_DECIMALS {
        return Err(Error::invalid_amount(format!(
            "{} decimals exceeds the maximum of {}",
            decimals, MAX_DECIMALS
        )));
    }

    let ten = U256::from(10u8);
    let mut mantissa = amount;
    let mut scale = u32::from(decimals);
    while scale > DECIMAL_MAX_SCALE {
        if mantissa % ten != U256::ZERO {
            return Err(Error::invalid_amount(format!(
                "{} base units need more than {} fractional digits",
                amount, DECIMAL_MAX_SCALE
            )));
        }
        mantissa /= ten;
        scale -= 1;
    }

    if mantissa > U256::from(DECIMAL_MAX_MANTISSA) {
        return Err(Error::invalid_amount(format!(
            "{} base units exceed decimal range",
            amount
        )));
    }

    let decimal = Decimal::try_from_i128_with_scale(mantissa.to::<u128>() as i128, scale)
        .map_err(|e| Error::invalid_amount(e.to_string()))?;
    Ok(decimal.normalize())
}
