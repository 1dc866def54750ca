//! Weighted-average (AVCO) unit cost calculation.

use rust_decimal::Decimal;

use mealledger_core::{DomainError, DomainResult, add_amount, div_amount, mul_amount, round_cost};

/// Blend an existing `(stock, average cost)` position with an incoming
/// `(quantity, unit price)` receipt.
///
/// `(old_stock × old_average_cost + incoming_quantity × incoming_unit_price)
///  / (old_stock + incoming_quantity)`
///
/// When the combined quantity is zero the incoming price is returned as-is.
/// Values too large for a `Decimal` are rejected as a validation error. The
/// result is rounded to [`mealledger_core::COST_SCALE`] places.
pub fn weighted_average_cost(
    old_stock: Decimal,
    old_average_cost: Decimal,
    incoming_quantity: Decimal,
    incoming_unit_price: Decimal,
) -> DomainResult<Decimal> {
    if old_stock < Decimal::ZERO {
        return Err(DomainError::validation("existing stock cannot be negative"));
    }
    if old_average_cost < Decimal::ZERO {
        return Err(DomainError::validation("existing average cost cannot be negative"));
    }
    if incoming_quantity <= Decimal::ZERO {
        return Err(DomainError::validation("incoming quantity must be positive"));
    }
    if incoming_unit_price < Decimal::ZERO {
        return Err(DomainError::validation("incoming unit price cannot be negative"));
    }

    let combined_quantity = add_amount(old_stock, incoming_quantity)?;
    if combined_quantity.is_zero() {
        return Ok(incoming_unit_price);
    }

    let existing_value = mul_amount(old_stock, old_average_cost)?;
    let incoming_value = mul_amount(incoming_quantity, incoming_unit_price)?;

    Ok(round_cost(div_amount(
        add_amount(existing_value, incoming_value)?,
        combined_quantity,
    )?))
}
