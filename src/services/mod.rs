pub mod delivery;
pub mod geocoding;
pub mod loyalty;
pub mod orders;
pub mod pricing;
pub mod promocodes;

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a money amount to 2 decimal places, half-up.
pub(crate) fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::round2;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_up() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(1.004)), dec!(1.00));
        assert_eq!(round2(dec!(-1.005)), dec!(-1.01));
    }
}
