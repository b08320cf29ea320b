//! # Domain Types
//!
//! Core domain types used throughout Ironbox POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  sku (business) │   │  sale_number    │   │  sale_id (FK)   │       │
//! │  │  quantity       │   │  payment_status │   │  method         │       │
//! │  │  opening_stock  │   │  total_cents    │   │  amount_cents   │       │
//! │  └────────┬────────┘   └────────┬────────┘   └─────────────────┘       │
//! │           │                     │                                       │
//! │  ┌────────▼────────┐   ┌────────▼────────┐   ┌─────────────────┐       │
//! │  │ StockMovement   │   │    SaleItem     │   │     Client      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  movement_type  │   │  snapshots      │   │  customer_code  │       │
//! │  │  quantity_delta │   │  refund_of_item │   │  is_active      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, sale_number, customer_code) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 1300 bps = 13%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage, e.g. `13.0` from configuration.
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
///
/// Master data is owned elsewhere; this crate only reads it, and the Stock
/// Ledger is the only writer of `quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    /// Stock Keeping Unit - business identifier.
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// Unit cost in cents.
    pub cost_cents: i64,
    /// Unit selling price in cents.
    pub price_cents: i64,
    /// Tax rate in basis points (1300 = 13%).
    pub tax_rate_bps: u32,
    /// Current on-hand quantity.
    pub quantity: i64,
    /// Quantity the product was created with. Movement deltas are applied on top.
    pub opening_stock: i64,
    /// Low-stock threshold.
    pub min_stock_level: i64,
    /// Archived products have `is_active = false`.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// Checks the on-hand quantity covers `quantity` units.
    #[inline]
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.quantity >= quantity
    }

    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock_level
    }
}

/// Data needed to register a new product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct NewProduct {
    pub sku: String,
    #[serde(default)]
    pub barcode: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cost_cents: i64,
    pub price_cents: i64,
    pub tax_rate_bps: u32,
    #[serde(default)]
    pub opening_stock: i64,
    pub min_stock_level: i64,
}

/// Explicit product update request.
///
/// Every field is optional; `None` leaves the column as is. On-hand quantity
/// is deliberately absent: stock only changes through the Stock Ledger.
/// Unknown fields are rejected when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct ProductUpdate {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cost_cents: Option<i64>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub tax_rate_bps: Option<u32>,
    #[serde(default)]
    pub min_stock_level: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ProductUpdate::default()
    }
}

// =============================================================================
// Client
// =============================================================================

/// A customer that sales can be attributed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Client {
    pub id: String,
    /// `C{YYYYMM}{seq:04}`, unique.
    pub customer_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Explicit client update request. The customer code never changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct ClientUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl ClientUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ClientUpdate::default()
    }
}

// =============================================================================
// Stock Movements
// =============================================================================

/// Direction of a stock movement.
///
/// `In` deltas are positive, `Out` deltas negative. `Adjustment` may carry
/// either sign and is the only kind allowed to bypass the insufficient-stock
/// check (it still cannot drive stock below zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

impl MovementType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
        }
    }
}

/// What caused a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Sale,
    Refund,
    Adjustment,
    Purchase,
}

/// One immutable row of the stock movement log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub movement_type: MovementType,
    /// Signed change applied to the product's on-hand quantity.
    pub quantity_delta: i64,
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub actor_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment Method / Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    DebitCard,
    /// Customer store credit.
    StoreCredit,
    /// Money returned to the customer. Only refund sales use it.
    Refund,
}

/// Payment progress of a committed sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Completed,
    Refunded,
}

impl PaymentStatus {
    /// Derives the status from the amount tendered against the sale total.
    ///
    /// ```rust
    /// use ironbox_core::money::Money;
    /// use ironbox_core::types::PaymentStatus;
    ///
    /// let total = Money::from_cents(5648);
    /// assert_eq!(PaymentStatus::from_tender(Money::from_cents(6000), total), PaymentStatus::Completed);
    /// assert_eq!(PaymentStatus::from_tender(Money::from_cents(3000), total), PaymentStatus::Partial);
    /// assert_eq!(PaymentStatus::from_tender(Money::zero(), total), PaymentStatus::Pending);
    /// ```
    pub fn from_tender(tendered: Money, total: Money) -> Self {
        if tendered >= total {
            PaymentStatus::Completed
        } else if tendered.is_positive() {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale (or refund sale) header.
///
/// `amount_paid_cents` and `amount_due_cents` are derived from the payments
/// table when the row is read; they are not stored on the sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// `YYYYMMDD-NNNN`, or `RF-...` for refunds.
    pub sale_number: String,
    pub client_id: Option<String>,
    pub actor_id: String,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub amount_paid_cents: i64,
    pub amount_due_cents: i64,
    pub notes: Option<String>,
    /// Set on refund sales only.
    pub refund_of_sale_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn amount_due(&self) -> Money {
        Money::from_cents(self.amount_due_cents)
    }

    #[inline]
    pub fn is_refund(&self) -> bool {
        self.refund_of_sale_id.is_some()
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A line of a committed sale.
///
/// Name, SKU, price and tax rate are frozen at the moment the line was added
/// to the draft. Refund lines carry negative quantities and totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Discount per unit, in cents.
    pub discount_cents: i64,
    pub tax_rate_bps: u32,
    pub line_total_cents: i64,
    /// Original line this refund line reverses.
    pub refund_of_item_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A payment towards a sale. A sale can have several (split tender).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub method: PaymentMethod,
    /// Amount applied to the sale, in cents.
    pub amount_cents: i64,
    /// Amount the customer handed over.
    pub tendered_cents: Option<i64>,
    /// Change returned to the customer.
    pub change_cents: Option<i64>,
    /// External reference (card auth code, etc.).
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Refund State
// =============================================================================

/// How much of an original sale has been refunded so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RefundState {
    None,
    Partial,
    Full,
}

impl RefundState {
    /// Derives the state from units sold and units refunded across all lines.
    pub fn from_quantities(sold: i64, refunded: i64) -> Self {
        if refunded <= 0 {
            RefundState::None
        } else if refunded >= sold {
            RefundState::Full
        } else {
            RefundState::Partial
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(1300);
        assert_eq!(rate.bps(), 1300);
        assert!((rate.percentage() - 13.0).abs() < 0.001);
    }

    #[test]
    fn test_tax_rate_from_percentage() {
        assert_eq!(TaxRate::from_percentage(13.0).bps(), 1300);
        assert_eq!(TaxRate::from_percentage(8.25).bps(), 825);
    }

    #[test]
    fn test_payment_status_from_tender() {
        let total = Money::from_cents(5648);
        assert_eq!(
            PaymentStatus::from_tender(Money::from_cents(5648), total),
            PaymentStatus::Completed
        );
        assert_eq!(
            PaymentStatus::from_tender(Money::from_cents(1), total),
            PaymentStatus::Partial
        );
        assert_eq!(
            PaymentStatus::from_tender(Money::zero(), total),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn test_refund_state() {
        assert_eq!(RefundState::from_quantities(2, 0), RefundState::None);
        assert_eq!(RefundState::from_quantities(2, 1), RefundState::Partial);
        assert_eq!(RefundState::from_quantities(2, 2), RefundState::Full);
    }

    #[test]
    fn test_product_update_rejects_unknown_fields() {
        let ok: ProductUpdate = serde_json::from_str(r#"{"price_cents": 2599}"#).unwrap();
        assert_eq!(ok.price_cents, Some(2599));
        assert!(!ok.is_empty());

        let err = serde_json::from_str::<ProductUpdate>(r#"{"quantity": 500}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_client_update_rejects_unknown_fields() {
        let err = serde_json::from_str::<ClientUpdate>(r#"{"customer_code": "C2026100001"}"#);
        assert!(err.is_err());
        assert!(ClientUpdate::default().is_empty());
    }

    #[test]
    fn test_movement_type_str() {
        assert_eq!(MovementType::In.as_str(), "in");
        assert_eq!(MovementType::Adjustment.as_str(), "adjustment");
    }
}
