use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// A signed currency amount with exact decimal arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::from(cents) / Decimal::from(100))
    }

    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::from(100)).round().to_i64().unwrap_or_default()
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// The outflow portion of a signed amount: `max(0, -self)`.
    pub fn outflow(self) -> Self {
        if self.is_negative() {
            -self
        } else {
            Money::zero()
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_round_trip() {
        assert_eq!(Money::from_cents(4523).to_cents(), 4523);
        assert_eq!(Money::from_cents(-1599).to_cents(), -1599);
    }

    #[test]
    fn outflow_is_zero_for_inflows() {
        assert_eq!(Money::from_cents(1432).outflow(), Money::zero());
        assert_eq!(Money::zero().outflow(), Money::zero());
        assert_eq!(Money::from_cents(-4523).outflow(), Money::from_cents(4523));
    }

    #[test]
    fn sum_is_exact() {
        let total: Money = [Money::from_cents(4523), Money::from_cents(1599)].iter().sum();
        assert_eq!(total, Money::from_cents(6122));
    }

    #[test]
    fn zero_is_neither_positive_nor_negative() {
        assert!(!Money::zero().is_negative());
        assert!(!Money::zero().is_positive());
    }

    #[test]
    fn display_has_two_places() {
        assert_eq!(Money::from_cents(550).to_string(), "$5.50");
    }

    #[test]
    fn serializes_as_number() {
        let json = serde_json::to_string(&Money::from_cents(4523)).unwrap();
        assert_eq!(json, "45.23");
    }
}
