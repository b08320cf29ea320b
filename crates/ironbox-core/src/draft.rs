//! # Sale Draft
//!
//! The in-progress cart of one cashier session. Nothing here is durable:
//! a draft becomes a Sale only when the transaction manager commits it.
//!
//! ## Draft Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Sale Draft Operations                                │
//! │                                                                         │
//! │  Register action          Draft method             State change         │
//! │  ───────────────          ────────────             ────────────         │
//! │                                                                         │
//! │  Scan / pick product ───► add_item() ────────────► merge or push line  │
//! │                                                                         │
//! │  Remove / decrement ────► remove_item() ─────────► pop or decrement    │
//! │                                                                         │
//! │  Global discount ───────► apply_discount() ──────► replace discount    │
//! │                                                                         │
//! │  Show cart ─────────────► view() ────────────────► (read only)         │
//! │                                                                         │
//! │  Every mutation ends with a full recompute through `pricing`.          │
//! │  A mutation that fails leaves the draft untouched.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::pricing::{compute_totals, LineInput, Totals};
use crate::types::{Product, TaxRate};
use crate::validation::{validate_non_negative, validate_quantity};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Line Item
// =============================================================================

/// A line in a draft.
///
/// SKU, name, unit price and tax rate are frozen when the line is created,
/// so a catalog change mid-sale does not alter what the cashier quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleLineItem {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub per_unit_discount: Money,
    pub tax_rate: TaxRate,
    /// Filled in by the last recompute.
    pub line_total: Money,
}

impl SaleLineItem {
    fn from_product(product: &Product, quantity: i64, unit_price: Money, discount: Money) -> Self {
        SaleLineItem {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            quantity,
            unit_price,
            per_unit_discount: discount,
            tax_rate: product.tax_rate(),
            line_total: Money::zero(),
        }
    }

    pub fn pricing_input(&self) -> LineInput {
        LineInput {
            quantity: self.quantity,
            unit_price: self.unit_price,
            per_unit_discount: self.per_unit_discount,
            tax_rate: self.tax_rate,
        }
    }
}

// =============================================================================
// Sale Draft
// =============================================================================

/// A single-owner working cart.
#[derive(Debug, Clone)]
pub struct SaleDraft {
    draft_id: String,
    client_id: Option<String>,
    actor_id: String,
    lines: Vec<SaleLineItem>,
    discount: Money,
    /// Configured rate handed in by the register; used by the global-discount path.
    current_tax_rate: TaxRate,
    totals: Totals,
    created_at: DateTime<Utc>,
}

impl SaleDraft {
    /// Creates an empty draft.
    pub fn new(
        draft_id: impl Into<String>,
        actor_id: impl Into<String>,
        client_id: Option<String>,
        current_tax_rate: TaxRate,
    ) -> Self {
        SaleDraft {
            draft_id: draft_id.into(),
            client_id,
            actor_id: actor_id.into(),
            lines: Vec::new(),
            discount: Money::zero(),
            current_tax_rate,
            totals: Totals::default(),
            created_at: Utc::now(),
        }
    }

    pub fn draft_id(&self) -> &str {
        &self.draft_id
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn lines(&self) -> &[SaleLineItem] {
        &self.lines
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn current_tax_rate(&self) -> TaxRate {
        self.current_tax_rate
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Units of `product_id` across every line of this draft.
    pub fn quantity_of(&self, product_id: &str) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .sum()
    }

    /// Adds `quantity` units of `product`.
    ///
    /// `unit_price` overrides the catalog price; `discount` is per unit.
    /// The line merges into an existing one only when both the product and
    /// the unit price match exactly; the existing line keeps its discount.
    ///
    /// Stock is checked against the product's current on-hand quantity,
    /// counting units of the same product already in this draft. Other
    /// drafts are not reserved against.
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: i64,
        unit_price: Option<Money>,
        discount: Option<Money>,
    ) -> CoreResult<()> {
        validate_quantity(quantity)?;

        if !product.is_active {
            return Err(CoreError::ProductInactive {
                sku: product.sku.clone(),
            });
        }

        let unit_price = unit_price.unwrap_or_else(|| product.price());
        let discount = discount.unwrap_or_default();
        validate_non_negative("unit_price", unit_price.cents())?;
        validate_non_negative("discount", discount.cents())?;

        let requested = self.quantity_of(&product.id) + quantity;
        if !product.can_sell(requested) {
            return Err(CoreError::InsufficientStock {
                sku: product.sku.clone(),
                available: product.quantity,
                requested,
            });
        }

        let existing = self
            .lines
            .iter()
            .position(|l| l.product_id == product.id && l.unit_price == unit_price);

        match existing {
            Some(index) => {
                let merged = self.lines[index].quantity + quantity;
                if merged > MAX_ITEM_QUANTITY {
                    return Err(CoreError::QuantityTooLarge {
                        requested: merged,
                        max: MAX_ITEM_QUANTITY,
                    });
                }
                self.lines[index].quantity = merged;
            }
            None => {
                if self.lines.len() >= MAX_CART_ITEMS {
                    return Err(CoreError::CartTooLarge {
                        max: MAX_CART_ITEMS,
                    });
                }
                self.lines.push(SaleLineItem::from_product(
                    product, quantity, unit_price, discount,
                ));
            }
        }

        self.recompute();
        Ok(())
    }

    /// Removes units of `product_id` from its first line.
    ///
    /// `None`, or a quantity at least the line's, drops the whole line.
    pub fn remove_item(&mut self, product_id: &str, quantity: Option<i64>) -> CoreResult<()> {
        if let Some(qty) = quantity {
            if qty <= 0 {
                return Err(ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                }
                .into());
            }
        }

        let index = self
            .lines
            .iter()
            .position(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::ItemNotInDraft(product_id.to_string()))?;

        match quantity {
            Some(qty) if qty < self.lines[index].quantity => {
                self.lines[index].quantity -= qty;
            }
            _ => {
                self.lines.remove(index);
            }
        }

        self.recompute();
        Ok(())
    }

    /// Sets the global discount, replacing any previous one.
    pub fn apply_discount(&mut self, amount: Money) -> CoreResult<()> {
        validate_non_negative("discount", amount.cents())?;

        if amount > self.totals.subtotal {
            return Err(CoreError::DiscountExceedsSubtotal {
                discount: amount,
                subtotal: self.totals.subtotal,
            });
        }

        self.discount = amount;
        self.recompute();
        Ok(())
    }

    /// Full recompute of every line and total. No incremental arithmetic.
    fn recompute(&mut self) {
        let inputs: Vec<LineInput> = self.lines.iter().map(SaleLineItem::pricing_input).collect();
        let totals = compute_totals(&inputs, self.discount, self.current_tax_rate);

        for (line, result) in self.lines.iter_mut().zip(&totals.lines) {
            line.line_total = result.line_total;
        }
        self.totals = totals;
    }

    /// Read-only projection for the UI.
    pub fn view(&self) -> DraftView {
        DraftView {
            draft_id: self.draft_id.clone(),
            client_id: self.client_id.clone(),
            actor_id: self.actor_id.clone(),
            lines: self
                .lines
                .iter()
                .map(|l| DraftLineView {
                    product_id: l.product_id.clone(),
                    sku: l.sku.clone(),
                    name: l.name.clone(),
                    quantity: l.quantity,
                    unit_price_cents: l.unit_price.cents(),
                    discount_cents: l.per_unit_discount.cents(),
                    tax_rate_bps: l.tax_rate.bps(),
                    line_total_cents: l.line_total.cents(),
                })
                .collect(),
            totals: DraftTotals::from(self),
            created_at: self.created_at,
        }
    }
}

// =============================================================================
// Views
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DraftLineView {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    pub tax_rate_bps: u32,
    pub line_total_cents: i64,
}

/// Totals summary for the register display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DraftTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub clamped_lines: usize,
}

impl From<&SaleDraft> for DraftTotals {
    fn from(draft: &SaleDraft) -> Self {
        DraftTotals {
            item_count: draft.lines.len(),
            total_quantity: draft.lines.iter().map(|l| l.quantity).sum(),
            subtotal_cents: draft.totals.subtotal.cents(),
            discount_cents: draft.totals.discount.cents(),
            tax_cents: draft.totals.tax.cents(),
            total_cents: draft.totals.total.cents(),
            clamped_lines: draft.totals.clamped_lines,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DraftView {
    pub draft_id: String,
    pub client_id: Option<String>,
    pub actor_id: String,
    pub lines: Vec<DraftLineView>,
    pub totals: DraftTotals,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product(id: &str, price_cents: i64, quantity: i64) -> Product {
        Product {
            id: id.to_string(),
            sku: format!("SKU-{}", id),
            barcode: None,
            name: format!("Product {}", id),
            description: None,
            cost_cents: price_cents / 2,
            price_cents,
            tax_rate_bps: 1300,
            quantity,
            opening_stock: quantity,
            min_stock_level: 10,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn new_draft() -> SaleDraft {
        SaleDraft::new("draft-1", "cashier-1", None, TaxRate::from_bps(1300))
    }

    #[test]
    fn test_add_item_computes_totals() {
        let mut draft = new_draft();
        let hammer = test_product("1", 2499, 30);

        draft.add_item(&hammer, 2, None, None).unwrap();

        let totals = draft.totals();
        assert_eq!(totals.subtotal.cents(), 4998);
        assert_eq!(totals.tax.cents(), 650);
        assert_eq!(totals.total.cents(), 5648);
        assert_eq!(draft.lines()[0].line_total.cents(), 4998);
    }

    #[test]
    fn test_same_price_merges_different_price_appends() {
        let mut draft = new_draft();
        let hammer = test_product("1", 2499, 30);

        draft.add_item(&hammer, 2, None, None).unwrap();
        draft.add_item(&hammer, 3, None, None).unwrap();
        assert_eq!(draft.lines().len(), 1);
        assert_eq!(draft.lines()[0].quantity, 5);

        draft
            .add_item(&hammer, 1, Some(Money::from_cents(1999)), None)
            .unwrap();
        assert_eq!(draft.lines().len(), 2);
        assert_eq!(draft.quantity_of("1"), 6);
    }

    #[test]
    fn test_out_of_stock_leaves_draft_unchanged() {
        let mut draft = new_draft();
        let empty = test_product("1", 2499, 0);

        let err = draft.add_item(&empty, 1, None, None).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { available: 0, .. }));
        assert!(draft.is_empty());
        assert_eq!(draft.totals().total, Money::zero());
    }

    #[test]
    fn test_stock_check_counts_units_already_in_draft() {
        let mut draft = new_draft();
        let hammer = test_product("1", 2499, 3);

        draft.add_item(&hammer, 2, None, None).unwrap();
        let err = draft.add_item(&hammer, 2, None, None).unwrap_err();

        assert!(matches!(err, CoreError::InsufficientStock { requested: 4, .. }));
        assert_eq!(draft.quantity_of("1"), 2);
    }

    #[test]
    fn test_inactive_product_rejected() {
        let mut draft = new_draft();
        let mut hammer = test_product("1", 2499, 30);
        hammer.is_active = false;

        let err = draft.add_item(&hammer, 1, None, None).unwrap_err();
        assert!(matches!(err, CoreError::ProductInactive { .. }));
    }

    #[test]
    fn test_price_snapshot_survives_catalog_change() {
        let mut draft = new_draft();
        let mut hammer = test_product("1", 2499, 30);
        draft.add_item(&hammer, 1, None, None).unwrap();

        hammer.price_cents = 2999;
        hammer.tax_rate_bps = 500;

        assert_eq!(draft.lines()[0].unit_price.cents(), 2499);
        assert_eq!(draft.lines()[0].tax_rate.bps(), 1300);
    }

    #[test]
    fn test_remove_item_decrements_or_drops() {
        let mut draft = new_draft();
        let hammer = test_product("1", 2499, 30);
        draft.add_item(&hammer, 5, None, None).unwrap();

        draft.remove_item("1", Some(2)).unwrap();
        assert_eq!(draft.lines()[0].quantity, 3);
        assert_eq!(draft.totals().subtotal.cents(), 7497);

        draft.remove_item("1", Some(10)).unwrap();
        assert!(draft.is_empty());
        assert_eq!(draft.totals().total, Money::zero());

        let err = draft.remove_item("1", None).unwrap_err();
        assert!(matches!(err, CoreError::ItemNotInDraft(_)));
    }

    #[test]
    fn test_apply_discount_replaces() {
        let mut draft = new_draft();
        let hammer = test_product("1", 2499, 30);
        draft.add_item(&hammer, 2, None, None).unwrap();

        draft.apply_discount(Money::from_cents(500)).unwrap();
        draft.apply_discount(Money::from_cents(998)).unwrap();

        let totals = draft.totals();
        assert_eq!(totals.discount.cents(), 998);
        // (4998 − 998) × 13% = 520
        assert_eq!(totals.tax.cents(), 520);
        assert_eq!(totals.total.cents(), 4520);
    }

    #[test]
    fn test_discount_validation() {
        let mut draft = new_draft();
        let hammer = test_product("1", 2499, 30);
        draft.add_item(&hammer, 1, None, None).unwrap();

        assert!(matches!(
            draft.apply_discount(Money::from_cents(-1)),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            draft.apply_discount(Money::from_cents(2500)),
            Err(CoreError::DiscountExceedsSubtotal { .. })
        ));
        assert_eq!(draft.discount(), Money::zero());
    }

    #[test]
    fn test_quantity_limits() {
        let mut draft = new_draft();
        let bolts = test_product("1", 10, 5000);

        assert!(matches!(
            draft.add_item(&bolts, 1000, None, None),
            Err(CoreError::Validation(_))
        ));

        draft.add_item(&bolts, 999, None, None).unwrap();
        assert!(matches!(
            draft.add_item(&bolts, 1, None, None),
            Err(CoreError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn test_cart_line_limit() {
        let mut draft = new_draft();
        let bolts = test_product("1", 1000, 500);

        for i in 0..MAX_CART_ITEMS as i64 {
            draft
                .add_item(&bolts, 1, Some(Money::from_cents(1000 + i)), None)
                .unwrap();
        }

        let err = draft
            .add_item(&bolts, 1, Some(Money::from_cents(5)), None)
            .unwrap_err();
        assert!(matches!(err, CoreError::CartTooLarge { .. }));
    }

    #[test]
    fn test_view_projection() {
        let mut draft = new_draft();
        let hammer = test_product("1", 2499, 30);
        draft.add_item(&hammer, 2, None, None).unwrap();

        let view = draft.view();
        assert_eq!(view.draft_id, "draft-1");
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.totals.total_cents, 5648);
        assert_eq!(view.totals.total_quantity, 2);
    }
}
