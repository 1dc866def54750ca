//! Fixed-point rounding rules for quantities, costs and percentages.
//!
//! All ledger arithmetic is done in `rust_decimal::Decimal`; binary floating
//! point never touches a stock or cost figure.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Decimal places kept on unit costs (average cost, cost at use).
pub const COST_SCALE: u32 = 4;

/// Decimal places kept on percentage shares in cost breakdowns.
pub const PERCENT_SCALE: u32 = 2;

/// Round a unit cost to [`COST_SCALE`] places, midpoint away from zero.
pub fn round_cost(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Round a percentage to [`PERCENT_SCALE`] places, midpoint away from zero.
pub fn round_percent(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(PERCENT_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

fn out_of_range() -> DomainError {
    DomainError::validation("amount out of range")
}

/// `a × b`, failing instead of overflowing.
pub fn mul_amount(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_mul(b).ok_or_else(out_of_range)
}

pub fn add_amount(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_add(b).ok_or_else(out_of_range)
}

/// `a / b`. A zero divisor is also out of range.
pub fn div_amount(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_div(b).ok_or_else(out_of_range)
}

pub fn sum_amounts(values: impl IntoIterator<Item = Decimal>) -> DomainResult<Decimal> {
    values.into_iter().try_fold(Decimal::ZERO, add_amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cost_rounding_keeps_four_places() {
        assert_eq!(round_cost(dec!(10.00005)), dec!(10.0001));
        assert_eq!(round_cost(dec!(12000.0000)), dec!(12000));
        assert_eq!(round_cost(dec!(3.33333333)), dec!(3.3333));
    }

    #[test]
    fn overflow_is_an_error() {
        let huge = dec!(1000000000000000);
        assert_eq!(mul_amount(dec!(12.5), dec!(4)).unwrap(), dec!(50));
        assert!(matches!(
            mul_amount(huge, dec!(100000000000000)),
            Err(DomainError::Validation(_))
        ));
        assert!(add_amount(Decimal::MAX, Decimal::ONE).is_err());
        assert!(div_amount(Decimal::ONE, Decimal::ZERO).is_err());
        assert_eq!(sum_amounts([dec!(1.5), dec!(2.5)]).unwrap(), dec!(4));
        assert!(sum_amounts([Decimal::MAX, Decimal::MAX]).is_err());
    }

    #[test]
    fn percent_rounding_keeps_two_places() {
        assert_eq!(round_percent(dec!(66.6666)), dec!(66.67));
        assert_eq!(round_percent(dec!(33.335)), dec!(33.34));
    }
}
