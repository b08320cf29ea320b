//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Integer Cents, Rounded Once
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every amount is an i64 count of cents.                                 │
//! │                                                                         │
//! │  Tax is the only place a fraction of a cent can appear:                │
//! │    4998 cents × 13.00% = 649.74 cents  →  650 cents                    │
//! │                                                                         │
//! │  The fraction is carried as a scaled integer (×10000) until the very   │
//! │  end and rounded ONCE, half away from zero:                            │
//! │    0.5 → 1,  1.5 → 2,  2.5 → 3,  -0.5 → -1                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ironbox_core::money::Money;
//!
//! let price = Money::from_cents(2499); // $24.99
//! let line = price * 2i64;             // $49.98
//! assert_eq!(line.to_string(), "$49.98");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

/// Scale of a basis-point product: `cents × bps` is in units of 1/10000 cent.
pub const BPS_SCALE: i128 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed so that refund sales, refund payments and negative line totals
/// can be stored as-is.
///
/// ```text
/// Product.price_cents ──► SaleLineItem.unit_price ──► line_total
///                                                         │
/// Totals.subtotal ◄───────────────────────────────────────┘
///      │
///      ▼
/// subtotal − discount + tax = total ──► Payment.amount
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use ironbox_core::money::Money;
    ///
    /// let price = Money::from_cents(1699); // $16.99
    /// assert_eq!(price.cents(), 1699);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from dollars and cents.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -$5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-dollar portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Returns the larger of two amounts.
    #[inline]
    pub fn max(self, other: Money) -> Money {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use ironbox_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(699); // Hex Nuts M8
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 2097);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Unrounded tax on this amount, in 1/10000 of a cent.
    ///
    /// Summing these across lines and rounding the sum once with
    /// [`round_scaled`] avoids per-line rounding drift.
    #[inline]
    pub fn scaled_tax(&self, rate: TaxRate) -> i128 {
        self.0 as i128 * rate.bps() as i128
    }

    /// Tax on this amount, rounded half away from zero.
    ///
    /// ## Example
    /// ```rust
    /// use ironbox_core::money::Money;
    /// use ironbox_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_cents(4998);
    /// // 4998 × 13% = 649.74 → 650
    /// assert_eq!(subtotal.calculate_tax(TaxRate::from_bps(1300)).cents(), 650);
    ///
    /// // 1000 × 8.25% = 82.5 → 83
    /// assert_eq!(Money::from_cents(1000).calculate_tax(TaxRate::from_bps(825)).cents(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        round_scaled(self.scaled_tax(rate))
    }
}

/// Rounds a value in 1/10000 cent to whole cents, half away from zero.
///
/// ```text
///   6_497_400  →  650    (649.74)
///     825_000  →   83    (82.5)
///    -825_000  →  -83    (-82.5)
///     824_999  →   82
/// ```
pub fn round_scaled(scaled: i128) -> Money {
    let half = BPS_SCALE / 2;
    let cents = if scaled >= 0 {
        (scaled + half) / BPS_SCALE
    } else {
        -((-scaled + half) / BPS_SCALE)
    };
    Money::from_cents(cents as i64)
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug/receipt formatting. UI layers apply their own currency symbol.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Negation flips a sale amount into its refund counterpart.
impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
