//! Decimal helpers shared by the regional formulas.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds an amount to cents, half away from zero.
///
/// Applied once, to the final amount of a calculation. Intermediate values
/// keep full precision.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use vehicle_tax_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(295.024)), dec!(295.02));
/// assert_eq!(round_half_up(dec!(295.025)), dec!(295.03));
/// ```
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Amounts never go negative: reductions and adjustments stop at zero.
pub fn floor_at_zero(value: Decimal) -> Decimal {
    if value.is_sign_negative() {
        Decimal::ZERO
    } else {
        value
    }
}

/// `base` raised to a small non-negative integer power by repeated
/// multiplication, so no precision is lost to floating point. `None` when the
/// result does not fit in a [`Decimal`].
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use vehicle_tax_core::calculations::common::powi;
///
/// assert_eq!(powi(dec!(0.5), 6), Some(dec!(0.015625)));
/// assert_eq!(powi(dec!(3), 0), Some(dec!(1)));
/// assert_eq!(powi(dec!(20000), 6), None);
/// ```
pub fn powi(base: Decimal, exponent: u32) -> Option<Decimal> {
    (0..exponent).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(base))
}
