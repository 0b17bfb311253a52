//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  In a debt ledger that must conserve every unit:                        │
//! │    150,000 allocated across three records must sum to 150,000 -        │
//! │    not 149,999.99999                                                    │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Minor Units                                      │
//! │    All amounts are i64 counts of the smallest currency unit.           │
//! │    The database, the wire format and all arithmetic use minor units;   │
//! │    only a display layer would ever format them.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit ("minor units").
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for returns and corrections
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is strictly positive.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is strictly negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Checked addition; `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Checked subtraction; `None` on overflow.
    #[inline]
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Checked multiplication by a quantity; `None` on overflow.
    #[inline]
    pub fn checked_mul(&self, quantity: i64) -> Option<Money> {
        self.0.checked_mul(quantity).map(Money)
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }
}

// =============================================================================
// Operator Implementations
// =============================================================================
//
// Plain operators are provided for readability in settlement math.
// Paths that can plausibly overflow (line totals from untrusted wire
// payloads) use the checked_* variants instead.

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Mul<i64> for Money {
    type Output = Money;

    fn mul(self, rhs: i64) -> Money {
        Money(self.0 * rhs)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_minor_roundtrip() {
        let price = Money::from_minor(150_000);
        assert_eq!(price.minor(), 150_000);
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_minor(50_000);
        let b = Money::from_minor(30_000);
        assert_eq!((a + b).minor(), 80_000);
        assert_eq!((a - b).minor(), 20_000);
        assert_eq!((a * 3).minor(), 150_000);
        assert_eq!((-a).minor(), -50_000);
    }

    #[test]
    fn test_min_and_predicates() {
        let a = Money::from_minor(50_000);
        let b = Money::from_minor(30_000);
        assert_eq!(a.min(b), b);
        assert!(a.is_positive());
        assert!(Money::zero().is_zero());
        assert!((-a).is_negative());
        assert_eq!((-a).abs(), a);
    }

    #[test]
    fn test_checked_overflow() {
        let max = Money::from_minor(i64::MAX);
        assert!(max.checked_add(Money::from_minor(1)).is_none());
        assert!(max.checked_mul(2).is_none());
        assert_eq!(
            Money::from_minor(100).checked_mul(3),
            Some(Money::from_minor(300))
        );
    }

    #[test]
    fn test_serde_transparent() {
        let amount = Money::from_minor(1_234);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "1234");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }
}
