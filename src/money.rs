//! Penny-exact money allocation.
//!
//! `MoneyAllocator::allocate` splits a total amount into `n` shares that sum
//! back to the total exactly, each rounded to the currency's minor unit (2
//! decimal places), differing by at most one minor unit. The split is a
//! pure function of `(total, n)`: identical inputs always produce identical
//! outputs, so callers control tie-breaking purely through the order they
//! hand member ids in.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::ops::Mul;

/// Stable, deterministic splitter for monetary amounts.
pub struct MoneyAllocator;

impl MoneyAllocator {
    /// Split `total` into `n` shares summing exactly to `total`.
    ///
    /// `base = floor(total*100 / n) / 100`; the remaining
    /// `total*100 - base*100*n` cents (an integer in `[0, n)`) are added one
    /// cent at a time to the front of the returned vector. Panics if `n` is
    /// zero — callers must not allocate to an empty participant set.
    pub fn allocate(total: Decimal, n: usize) -> Vec<Decimal> {
        assert!(n > 0, "cannot allocate to zero shares");

        let total_cents = to_cents(total);
        let n_i = n as i64;
        let base_cents = total_cents.div_euclid(n_i);
        let remainder = (total_cents - base_cents * n_i) as usize;

        (0..n)
            .map(|i| {
                let cents = if i < remainder {
                    base_cents + 1
                } else {
                    base_cents
                };
                from_cents(cents)
            })
            .collect()
    }

    /// `amount × (1 + pct/100)`, rounded to 2 decimals only here — callers
    /// must not round intermediate values before allocation.
    pub fn apply_service_fee(amount: Decimal, pct: Decimal) -> Decimal {
        let hundred = Decimal::from(100);
        let factor = Decimal::ONE + pct / hundred;
        amount.mul(factor).round_dp(2)
    }
}

fn to_cents(amount: Decimal) -> i64 {
    (amount * Decimal::from(100))
        .round_dp(0)
        .to_i64()
        .expect("amount out of range for penny allocation")
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::from(cents) / Decimal::from(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn allocate_one_dollar_three_ways() {
        let shares = MoneyAllocator::allocate(dec!(1.00), 3);
        assert_eq!(shares, vec![dec!(0.34), dec!(0.33), dec!(0.33)]);
    }

    #[test]
    fn allocate_evenly() {
        let shares = MoneyAllocator::allocate(dec!(100), 4);
        assert_eq!(shares, vec![dec!(25), dec!(25), dec!(25), dec!(25)]);
    }

    #[test]
    fn allocate_sums_to_total() {
        let total = dec!(300.01);
        let shares = MoneyAllocator::allocate(total, 7);
        let sum: Decimal = shares.iter().sum();
        assert_eq!(sum, total.round_dp(2));
    }

    #[test]
    fn allocate_single_share() {
        let shares = MoneyAllocator::allocate(dec!(42.17), 1);
        assert_eq!(shares, vec![dec!(42.17)]);
    }

    #[test]
    fn shares_differ_by_at_most_one_cent() {
        let shares = MoneyAllocator::allocate(dec!(10.07), 6);
        let max = shares.iter().max().unwrap();
        let min = shares.iter().min().unwrap();
        assert!(max - min <= dec!(0.01));
    }

    #[test]
    fn service_fee_applies_and_rounds() {
        let fee = MoneyAllocator::apply_service_fee(dec!(100), dec!(15));
        assert_eq!(fee, dec!(115.00));
    }

    #[test]
    fn service_fee_zero_is_identity() {
        let fee = MoneyAllocator::apply_service_fee(dec!(59.99), dec!(0));
        assert_eq!(fee, dec!(59.99));
    }
}
