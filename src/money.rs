use std::str::FromStr;

use rust_decimal::{ Decimal, RoundingStrategy };

use crate::error::{ AppError, Result };

/// Decimal places kept for every ledger amount.
pub const AMOUNT_SCALE: u32 = 8;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Parse a user-supplied amount. Rejects garbage, negatives and zero.
pub fn parse_input_amount(raw: &str) -> Result<Decimal> {
    let amount = Decimal::from_str(raw.trim()).map_err(|_|
        AppError::InvalidInput(format!("Invalid amount: {}", raw))
    )?;
    ensure_positive(amount)?;
    Ok(amount)
}

pub fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(AppError::InvalidInput(format!("Amount must be greater than zero, got {}", amount)));
    }
    Ok(())
}

/// Parse a value read back from the database.
pub fn parse_stored(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e|
        AppError::Internal(format!("Corrupt stored amount {:?}: {}", raw, e))
    )
}

/// Nullable columns read as zero, matching how the accrual scheduler treats
/// a missing rate or deposit.
pub fn parse_stored_or_zero(raw: Option<&str>) -> Result<Decimal> {
    match raw {
        Some(value) if !value.trim().is_empty() => parse_stored(value),
        _ => Ok(Decimal::ZERO),
    }
}

/// True when `amount` needs no more than [`AMOUNT_SCALE`] decimal places.
pub fn fits_ledger_scale(amount: Decimal) -> bool {
    amount.normalize().scale() <= AMOUNT_SCALE
}

pub fn to_stored(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Truncate to [`AMOUNT_SCALE`] places. Truncation never pays out more than
/// was earned.
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero)
}
