//! # Pricing & Totals Engine
//!
//! Pure computation of line totals, subtotal, tax and total for a sale.
//!
//! ## Two Tax Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  global discount == 0                                                   │
//! │    tax = round( Σ line_total × line.tax_rate )      (snapshot rates)    │
//! │                                                                         │
//! │  global discount  > 0                                                   │
//! │    tax = round( (subtotal − discount) × current_rate )                 │
//! │                                                                         │
//! │  total = subtotal − discount + tax                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two paths can differ by a cent or more for the same basket; callers
//! rely on that difference, so it is kept exactly.
//!
//! Nothing here reads configuration: the current tax rate is a parameter.

use serde::{Deserialize, Serialize};

use crate::money::{round_scaled, Money};
use crate::types::TaxRate;

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// One line as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInput {
    pub quantity: i64,
    pub unit_price: Money,
    pub per_unit_discount: Money,
    pub tax_rate: TaxRate,
}

/// Result for a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotal {
    pub line_total: Money,
    /// The raw total was negative and has been clamped to zero. A per-unit
    /// discount larger than the unit price indicates bad upstream data.
    pub clamped: bool,
}

/// Totals for a whole basket.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    /// Per-line results, same order as the input.
    pub lines: Vec<LineTotal>,
    pub subtotal: Money,
    /// Discount actually applied (never above the subtotal).
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    /// Number of lines whose total was clamped at zero.
    pub clamped_lines: usize,
    /// The requested discount exceeded the subtotal and was capped.
    pub discount_capped: bool,
}

impl Totals {
    /// Checks `total == subtotal − discount + tax`.
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal - self.discount + self.tax
    }
}

// =============================================================================
// Computation
// =============================================================================

/// `unit_price × qty − per_unit_discount × qty`, clamped at zero.
///
/// ```rust
/// use ironbox_core::money::Money;
/// use ironbox_core::pricing::{line_total, LineInput};
/// use ironbox_core::types::TaxRate;
///
/// let line = LineInput {
///     quantity: 3,
///     unit_price: Money::from_cents(699),
///     per_unit_discount: Money::from_cents(100),
///     tax_rate: TaxRate::from_bps(1300),
/// };
/// let result = line_total(&line);
/// assert_eq!(result.line_total.cents(), 1797);
/// assert!(!result.clamped);
/// ```
pub fn line_total(line: &LineInput) -> LineTotal {
    let raw = line.unit_price.multiply_quantity(line.quantity)
        - line.per_unit_discount.multiply_quantity(line.quantity);

    if raw.is_negative() {
        LineTotal {
            line_total: Money::zero(),
            clamped: true,
        }
    } else {
        LineTotal {
            line_total: raw,
            clamped: false,
        }
    }
}

/// Computes every total for a basket.
///
/// `discount` is the single global discount; `current_rate` is the
/// configured tax rate, used only when a global discount is present.
pub fn compute_totals(lines: &[LineInput], discount: Money, current_rate: TaxRate) -> Totals {
    let line_totals: Vec<LineTotal> = lines.iter().map(line_total).collect();
    let clamped_lines = line_totals.iter().filter(|l| l.clamped).count();
    let subtotal: Money = line_totals.iter().map(|l| l.line_total).sum();

    let requested = discount.max(Money::zero());
    let applied = requested.min(subtotal);
    let discount_capped = applied != requested;

    let tax = if applied.is_zero() {
        let scaled: i128 = line_totals
            .iter()
            .zip(lines)
            .map(|(total, input)| total.line_total.scaled_tax(input.tax_rate))
            .sum();
        round_scaled(scaled)
    } else {
        round_scaled((subtotal - applied).scaled_tax(current_rate))
    };

    Totals {
        lines: line_totals,
        subtotal,
        discount: applied,
        tax,
        total: subtotal - applied + tax,
        clamped_lines,
        discount_capped,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i64, price: i64, discount: i64, bps: u32) -> LineInput {
        LineInput {
            quantity,
            unit_price: Money::from_cents(price),
            per_unit_discount: Money::from_cents(discount),
            tax_rate: TaxRate::from_bps(bps),
        }
    }

    #[test]
    fn test_two_hammers_at_thirteen_percent() {
        let totals = compute_totals(&[line(2, 2499, 0, 1300)], Money::zero(), TaxRate::from_bps(1300));

        assert_eq!(totals.subtotal.cents(), 4998);
        assert_eq!(totals.tax.cents(), 650);
        assert_eq!(totals.total.cents(), 5648);
        assert!(totals.is_consistent());
    }

    #[test]
    fn test_single_line_refund_amount() {
        let totals = compute_totals(&[line(1, 2499, 0, 1300)], Money::zero(), TaxRate::from_bps(1300));
        assert_eq!(totals.tax.cents(), 325);
        assert_eq!(totals.total.cents(), 2824);
    }

    #[test]
    fn test_tax_rounded_once_not_per_line() {
        // Each line alone: 105 × 5% = 5.25 → 5. Summed: 15.75 → 16.
        let lines = [line(1, 105, 0, 500), line(1, 105, 0, 500), line(1, 105, 0, 500)];
        let totals = compute_totals(&lines, Money::zero(), TaxRate::from_bps(500));
        assert_eq!(totals.tax.cents(), 16);
    }

    #[test]
    fn test_mixed_snapshot_rates_without_discount() {
        // 1000 × 13% + 1000 × 5% = 130 + 50
        let lines = [line(1, 1000, 0, 1300), line(1, 1000, 0, 500)];
        let totals = compute_totals(&lines, Money::zero(), TaxRate::from_bps(2000));
        assert_eq!(totals.tax.cents(), 180);
    }

    #[test]
    fn test_global_discount_uses_current_rate() {
        // Snapshot rates are ignored once a global discount is applied.
        let lines = [line(1, 1000, 0, 1300), line(1, 1000, 0, 500)];
        let totals = compute_totals(&lines, Money::from_cents(500), TaxRate::from_bps(1300));

        assert_eq!(totals.subtotal.cents(), 2000);
        assert_eq!(totals.discount.cents(), 500);
        // (2000 − 500) × 13% = 195
        assert_eq!(totals.tax.cents(), 195);
        assert_eq!(totals.total.cents(), 1695);
        assert!(totals.is_consistent());
    }

    #[test]
    fn test_line_discount_and_global_discount_paths_differ() {
        // $10.00 off via a per-unit discount versus the same $10.00 as a
        // global discount, with a current rate different from the snapshot.
        let per_line = compute_totals(&[line(1, 5000, 1000, 1300)], Money::zero(), TaxRate::from_bps(825));
        let global = compute_totals(&[line(1, 5000, 0, 1300)], Money::from_cents(1000), TaxRate::from_bps(825));

        assert_eq!(per_line.subtotal.cents(), 4000);
        assert_eq!(per_line.tax.cents(), 520);
        assert_eq!(global.tax.cents(), 330);
        assert_ne!(per_line.total, global.total);
    }

    #[test]
    fn test_negative_line_is_clamped_and_flagged() {
        let totals = compute_totals(
            &[line(2, 500, 700, 1300), line(1, 1000, 0, 1300)],
            Money::zero(),
            TaxRate::from_bps(1300),
        );

        assert!(totals.lines[0].clamped);
        assert_eq!(totals.lines[0].line_total, Money::zero());
        assert_eq!(totals.clamped_lines, 1);
        assert_eq!(totals.subtotal.cents(), 1000);
    }

    #[test]
    fn test_discount_capped_at_subtotal() {
        let totals = compute_totals(&[line(1, 1000, 0, 1300)], Money::from_cents(5000), TaxRate::from_bps(1300));

        assert!(totals.discount_capped);
        assert_eq!(totals.discount.cents(), 1000);
        assert_eq!(totals.tax, Money::zero());
        assert_eq!(totals.total, Money::zero());
    }

    #[test]
    fn test_empty_basket() {
        let totals = compute_totals(&[], Money::zero(), TaxRate::from_bps(1300));
        assert_eq!(totals.total, Money::zero());
        assert!(totals.lines.is_empty());
    }
}
