use serde::{Deserialize, Serialize};

/// Money amount in the smallest unit of the platform currency.
///
/// The platform currency has no fractional unit, so prices, totals and loyalty
/// points all share the same integer scale (one point is worth one unit).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a money amount.
    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the raw amount.
    pub fn amount(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * i64::from(quantity))
    }

    /// Subtracts `other`, clamping the result at zero.
    pub fn saturating_sub_to_zero(&self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiply_and_sum() {
        let lines = [Money::new(8).multiply(2), Money::new(7).multiply(1)];
        let total: Money = lines.into_iter().sum();
        assert_eq!(total, Money::new(23));
    }

    #[test]
    fn test_saturating_sub_never_goes_negative() {
        assert_eq!(
            Money::new(23).saturating_sub_to_zero(Money::new(5)),
            Money::new(18)
        );
        assert_eq!(
            Money::new(10).saturating_sub_to_zero(Money::new(50)),
            Money::zero()
        );
    }

    #[test]
    fn test_arithmetic_operators() {
        let mut m = Money::new(100);
        m += Money::new(50);
        assert_eq!(m.amount(), 150);
        assert_eq!((m - Money::new(30)).amount(), 120);
        assert!(Money::new(-1).is_negative());
        assert!(Money::zero().is_zero());
    }

    #[test]
    fn test_serializes_as_plain_number() {
        let json = serde_json::to_string(&Money::new(8000)).unwrap();
        assert_eq!(json, "8000");
    }
}
