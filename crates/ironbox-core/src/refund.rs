//! # Refund Allocation
//!
//! Maps a refund request (`product_id × quantity`) onto the lines of the
//! original sale, honouring what earlier refunds already returned.
//!
//! ```text
//! original sale          already refunded     request            allocation
//! ─────────────          ────────────────     ───────            ──────────
//! line A: HAM001 × 2     A: 1                 HAM001 × 2  ──►    A: 1, B: 1
//! line B: HAM001 × 3     B: 0                 NUT003 × 1  ──►    C: 1
//! line C: NUT003 × 5     C: 0
//! ```
//!
//! Lines of the same product are filled in sale order. Nothing here touches
//! storage; a rejected plan means no ledger mutation happens.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

/// One entry of a refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct RefundLine {
    pub product_id: String,
    pub quantity: i64,
}

impl RefundLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        RefundLine {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A line of the original sale and how much of it is already refunded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundableLine {
    pub item_id: String,
    pub product_id: String,
    pub sold: i64,
    pub refunded: i64,
}

impl RefundableLine {
    #[inline]
    pub fn remaining(&self) -> i64 {
        (self.sold - self.refunded).max(0)
    }
}

/// Units to take back from one original line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundAllocation {
    pub item_id: String,
    pub product_id: String,
    pub quantity: i64,
}

/// Plans a refund against `lines` (in original sale order).
///
/// Duplicate products in `requests` are summed. Fails with
/// `ProductNotInSale` for a product the sale never had, and with
/// `RefundExceedsOriginal` when the total asked for a product is above
/// what is still refundable across its lines.
pub fn plan_refund(
    lines: &[RefundableLine],
    requests: &[RefundLine],
) -> CoreResult<Vec<RefundAllocation>> {
    if requests.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        }
        .into());
    }

    // Sum per product, keeping first-seen order.
    let mut wanted: Vec<(&str, i64)> = Vec::new();
    for request in requests {
        if request.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        match wanted.iter_mut().find(|(id, _)| *id == request.product_id) {
            Some((_, qty)) => *qty += request.quantity,
            None => wanted.push((request.product_id.as_str(), request.quantity)),
        }
    }

    let mut allocations = Vec::new();
    for (product_id, requested) in wanted {
        let candidates: Vec<&RefundableLine> =
            lines.iter().filter(|l| l.product_id == product_id).collect();

        if candidates.is_empty() {
            return Err(CoreError::ProductNotInSale(product_id.to_string()));
        }

        let refundable: i64 = candidates.iter().map(|l| l.remaining()).sum();
        if requested > refundable {
            return Err(CoreError::RefundExceedsOriginal {
                product_id: product_id.to_string(),
                requested,
                refundable,
            });
        }

        let mut left = requested;
        for line in candidates {
            if left == 0 {
                break;
            }
            let take = left.min(line.remaining());
            if take > 0 {
                allocations.push(RefundAllocation {
                    item_id: line.item_id.clone(),
                    product_id: line.product_id.clone(),
                    quantity: take,
                });
                left -= take;
            }
        }
    }

    Ok(allocations)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(item_id: &str, product_id: &str, sold: i64, refunded: i64) -> RefundableLine {
        RefundableLine {
            item_id: item_id.to_string(),
            product_id: product_id.to_string(),
            sold,
            refunded,
        }
    }

    #[test]
    fn test_allocates_across_lines_in_order() {
        let lines = [
            line("a", "ham", 2, 1),
            line("b", "ham", 3, 0),
            line("c", "nut", 5, 0),
        ];

        let plan = plan_refund(&lines, &[RefundLine::new("ham", 2), RefundLine::new("nut", 1)]).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!((plan[0].item_id.as_str(), plan[0].quantity), ("a", 1));
        assert_eq!((plan[1].item_id.as_str(), plan[1].quantity), ("b", 1));
        assert_eq!((plan[2].item_id.as_str(), plan[2].quantity), ("c", 1));
    }

    #[test]
    fn test_cumulative_bound_enforced() {
        let lines = [line("a", "ham", 2, 2)];
        let err = plan_refund(&lines, &[RefundLine::new("ham", 1)]).unwrap_err();

        assert!(matches!(
            err,
            CoreError::RefundExceedsOriginal {
                requested: 1,
                refundable: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_requests_are_summed() {
        let lines = [line("a", "ham", 2, 0)];
        let err = plan_refund(&lines, &[RefundLine::new("ham", 1), RefundLine::new("ham", 2)]).unwrap_err();
        assert!(matches!(err, CoreError::RefundExceedsOriginal { requested: 3, .. }));

        let plan = plan_refund(&lines, &[RefundLine::new("ham", 1), RefundLine::new("ham", 1)]).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].quantity, 2);
    }

    #[test]
    fn test_unknown_product_rejected() {
        let lines = [line("a", "ham", 2, 0)];
        let err = plan_refund(&lines, &[RefundLine::new("drill", 1)]).unwrap_err();
        assert!(matches!(err, CoreError::ProductNotInSale(_)));
    }

    #[test]
    fn test_invalid_requests() {
        let lines = [line("a", "ham", 2, 0)];
        assert!(matches!(plan_refund(&lines, &[]), Err(CoreError::Validation(_))));
        assert!(matches!(
            plan_refund(&lines, &[RefundLine::new("ham", 0)]),
            Err(CoreError::Validation(_))
        ));
    }
}
