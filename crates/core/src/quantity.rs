//! Decimal quantity helpers.
//!
//! Quantities are exact decimals. `Decimal` cannot hold NaN or infinity, so the
//! only place a non-finite value can appear is when converting from a float at
//! the boundary.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::error::{DomainError, DomainResult};

/// Require `qty > 0`.
pub fn ensure_positive(qty: Decimal, field: &str) -> DomainResult<Decimal> {
    if qty <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{field} must be positive (got {qty})"
        )));
    }
    Ok(qty)
}

/// Require `qty >= 0`.
pub fn ensure_non_negative(qty: Decimal, field: &str) -> DomainResult<Decimal> {
    if qty < Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{field} must not be negative (got {qty})"
        )));
    }
    Ok(qty)
}

/// Convert a float received at the boundary, rejecting NaN and infinities.
pub fn quantity_from_f64(value: f64, field: &str) -> DomainResult<Decimal> {
    if !value.is_finite() {
        return Err(DomainError::validation(format!("{field} must be finite")));
    }
    Decimal::from_f64(value)
        .map(|d| d.normalize())
        .ok_or_else(|| DomainError::validation(format!("{field} is out of range")))
}

/// Round up to a whole unit (97.5 -> 98, 98 -> 98).
pub fn ceil_whole(qty: Decimal) -> Decimal {
    qty.ceil()
}
