use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

// ============================================================================
// Money - Naira amounts in minor units (kobo)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    /// `None` when `major` does not fit in minor units.
    pub fn checked_from_major(major: i64) -> Option<Self> {
        major.checked_mul(100).map(Self)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn times(self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Inclusive range check used for fee limits.
    pub fn within(self, min: Money, max: Money) -> bool {
        self >= min && self <= max
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_and_minor_units() {
        assert_eq!(Money::from_major(500).minor(), 50_000);
        assert_eq!(Money::from_minor(12_345).to_string(), "123.45");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
    }

    #[test]
    fn test_checked_from_major_rejects_overflow() {
        assert_eq!(Money::checked_from_major(500), Some(Money::from_major(500)));
        assert_eq!(Money::checked_from_major(184_467_440_737_095_517), None);
        assert_eq!(Money::checked_from_major(i64::MIN), None);
    }

    #[test]
    fn test_arithmetic() {
        let total: Money = vec![Money::from_major(1), Money::from_major(2)].into_iter().sum();
        assert_eq!(total, Money::from_major(3));
        assert_eq!(Money::from_major(50).times(3), Money::from_major(150));
        assert_eq!(Money::from_major(5) - Money::from_major(2), Money::from_major(3));
    }

    #[test]
    fn test_within_is_inclusive() {
        let max = Money::from_major(10_000);
        assert!(Money::ZERO.within(Money::ZERO, max));
        assert!(max.within(Money::ZERO, max));
        assert!(!Money::from_minor(1_000_001).within(Money::ZERO, max));
        assert!(!Money::from_minor(-1).within(Money::ZERO, max));
    }
}
